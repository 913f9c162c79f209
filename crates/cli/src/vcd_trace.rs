// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::size_limited_writer::SizeLimitedWriter;
use lockstep_core::{CosimError, CosimObserver, RunOutcome, SimTime, TickSignals};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

/// Dumps the hardware model's top-level signals, one VCD timestamp per tick.
pub struct VcdObserver {
    state: Mutex<VcdState>,
    ids: VcdIds,
    bytes_written: Arc<AtomicU64>,
    max_bytes: Option<u64>,
}

struct VcdIds {
    clk: IdCode,
    commit_valid: IdCode,
    commit_instr: IdCode,
    uart_tx_ready: IdCode,
    uart_tx_data: IdCode,
}

struct VcdState {
    writer: Writer<SizeLimitedWriter<BufWriter<File>>>,
    /// Last dumped values; only changes are written.
    last: TickSignals,
}

impl VcdObserver {
    pub fn new(path: &Path, max_bytes: Option<u64>) -> anyhow::Result<Self> {
        let file = File::create(path)?;
        let limited = SizeLimitedWriter::new(BufWriter::new(file), max_bytes.unwrap_or(u64::MAX));
        let bytes_written = limited.bytes_written_handle();
        let mut writer = Writer::new(limited);

        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("tb_soc")?;
        let clk = writer.add_wire(1, "clk")?;

        writer.add_module("dut")?;
        let commit_valid = writer.add_wire(1, "commit_valid")?;
        let commit_instr = writer.add_wire(32, "commit_instr")?;
        let uart_tx_ready = writer.add_wire(1, "uart_tx_ready")?;
        let uart_tx_data = writer.add_wire(8, "uart_tx_data")?;
        writer.upscope()?; // dut

        writer.upscope()?; // tb_soc
        writer.enddefinitions()?;

        writer.timestamp(0)?;
        writer.change_scalar(clk, Value::V0)?;
        writer.change_scalar(commit_valid, Value::V0)?;
        writer.change_vector(commit_instr, u64_to_vec(0, 32))?;
        writer.change_scalar(uart_tx_ready, Value::V0)?;
        writer.change_vector(uart_tx_data, u64_to_vec(0, 8))?;

        Ok(Self {
            state: Mutex::new(VcdState {
                writer,
                last: TickSignals::default(),
            }),
            ids: VcdIds {
                clk,
                commit_valid,
                commit_instr,
                uart_tx_ready,
                uart_tx_data,
            },
            bytes_written,
            max_bytes,
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Terminate the last sample so viewers show its full width.
    fn close(&self, last: SimTime) {
        if let Ok(mut state) = self.state.lock() {
            if let Err(e) = state.writer.timestamp(last + 1) {
                warn!("VCD write failed at time {}: {}", last + 1, e);
            }
        }
        if let Some(max) = self.max_bytes {
            if self.bytes_written() >= max {
                warn!("VCD trace truncated at {} bytes", max);
            }
        }
    }

    fn dump(&self, state: &mut VcdState, time: SimTime, s: &TickSignals) -> std::io::Result<()> {
        let last = state.last;
        let w = &mut state.writer;
        w.timestamp(time)?;
        if s.clock != last.clock {
            w.change_scalar(self.ids.clk, bool::from(s.clock))?;
        }
        if s.commit.valid != last.commit.valid {
            w.change_scalar(self.ids.commit_valid, s.commit.valid)?;
        }
        if s.commit.instr != last.commit.instr {
            w.change_vector(self.ids.commit_instr, u64_to_vec(s.commit.instr as u64, 32))?;
        }
        if s.uart_tx_ready != last.uart_tx_ready {
            w.change_scalar(self.ids.uart_tx_ready, s.uart_tx_ready)?;
        }
        if s.uart_tx_data != last.uart_tx_data {
            w.change_vector(self.ids.uart_tx_data, u64_to_vec(s.uart_tx_data as u64, 8))?;
        }
        state.last = *s;
        Ok(())
    }
}

// MSB first
fn u64_to_vec(val: u64, width: u32) -> Vec<Value> {
    (0..width)
        .rev()
        .map(|i| if (val >> i) & 1 == 1 { Value::V1 } else { Value::V0 })
        .collect()
}

impl std::fmt::Debug for VcdObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VcdObserver({} bytes)", self.bytes_written())
    }
}

impl CosimObserver for VcdObserver {
    fn on_tick(&self, time: SimTime, signals: &TickSignals) {
        if let Ok(mut state) = self.state.lock() {
            if let Err(e) = self.dump(&mut state, time, signals) {
                warn!("VCD write failed at time {}: {}", time, e);
            }
        }
    }

    fn on_run_stop(&self, outcome: &RunOutcome) {
        self.close(outcome.sim_time());
    }

    fn on_run_failed(&self, time: SimTime, _error: &CosimError) {
        self.close(time);
    }
}
