// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Caps the number of bytes forwarded to `inner`. Writes past the cap are
/// accepted and dropped so a long trace never fails the run.
pub struct SizeLimitedWriter<W: Write> {
    inner: W,
    bytes_written: Arc<AtomicU64>,
    max_bytes: u64,
}

impl<W: Write> SizeLimitedWriter<W> {
    pub fn new(inner: W, max_bytes: u64) -> Self {
        Self {
            inner,
            bytes_written: Arc::new(AtomicU64::new(0)),
            max_bytes,
        }
    }

    /// Shared counter, readable after the writer has been moved into a sink.
    pub fn bytes_written_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_written)
    }
}

impl<W: Write> Write for SizeLimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let current = self.bytes_written.load(Ordering::Relaxed);
        if current >= self.max_bytes {
            return Ok(buf.len());
        }

        let remaining = self.max_bytes - current;
        let to_write = buf.len().min(remaining as usize);

        let written = self.inner.write(&buf[..to_write])?;
        self.bytes_written
            .fetch_add(written as u64, Ordering::Relaxed);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
