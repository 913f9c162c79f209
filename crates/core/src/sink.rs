// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::RegisterFile;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Forwards UART bytes from the hardware model to an output stream.
///
/// Every byte is flushed as soon as it is written. An optional capture
/// buffer keeps a copy for assertions and artifacts.
pub struct UartSink<W: Write> {
    out: W,
    capture: Option<Arc<Mutex<Vec<u8>>>>,
    forwarded: u64,
}

impl<W: Write> UartSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            capture: None,
            forwarded: 0,
        }
    }

    pub fn set_capture(&mut self, capture: Option<Arc<Mutex<Vec<u8>>>>) {
        self.capture = capture;
    }

    /// Only bytes that reached the stream are captured.
    pub fn forward(&mut self, byte: u8) -> io::Result<()> {
        self.out.write_all(&[byte])?;
        self.out.flush()?;
        self.forwarded += 1;
        if let Some(capture) = &self.capture {
            if let Ok(mut guard) = capture.lock() {
                guard.push(byte);
            }
        }
        Ok(())
    }

    /// Emit `REGDUMP <index> <hex>` for every register, index-ordered.
    pub fn write_regdump(&mut self, regs: &RegisterFile) -> io::Result<()> {
        for (i, value) in regs.iter().enumerate() {
            writeln!(self.out, "REGDUMP {} {:x}", i, value)?;
        }
        self.out.flush()
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> std::fmt::Debug for UartSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UartSink")
            .field("forwarded", &self.forwarded)
            .field("capture", &self.capture.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::UartSink;
    use crate::NUM_REGS;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_forward_preserves_order() {
        let mut sink = UartSink::new(Vec::new());
        let capture = Arc::new(Mutex::new(Vec::new()));
        sink.set_capture(Some(capture.clone()));

        for b in b"Hi!" {
            sink.forward(*b).unwrap();
        }

        assert_eq!(sink.get_ref().as_slice(), b"Hi!");
        assert_eq!(capture.lock().unwrap().as_slice(), b"Hi!");
        assert_eq!(sink.bytes_forwarded(), 3);
    }

    #[test]
    fn test_regdump_format() {
        let mut sink = UartSink::new(Vec::new());
        let mut regs = [0u32; NUM_REGS];
        regs[1] = 0xDEAD_BEEF;
        regs[15] = 0x10;
        sink.write_regdump(&regs).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), NUM_REGS);
        assert_eq!(lines[0], "REGDUMP 0 0");
        assert_eq!(lines[1], "REGDUMP 1 deadbeef");
        assert_eq!(lines[15], "REGDUMP 15 10");
    }

    #[test]
    fn test_write_failure_propagates() {
        let mut sink = UartSink::new(BrokenPipe);
        let err = sink.forward(b'x').unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(sink.bytes_forwarded(), 0);
    }

    #[test]
    fn test_failed_byte_is_not_captured() {
        let mut sink = UartSink::new(BrokenPipe);
        let capture = Arc::new(Mutex::new(Vec::new()));
        sink.set_capture(Some(capture.clone()));

        assert!(sink.forward(b'x').is_err());
        assert!(capture.lock().unwrap().is_empty());
    }
}
