// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod checker;
pub mod clock;
pub mod controller;
pub mod decoder;
pub mod iss;
pub mod memory;
pub mod metrics;
pub mod signals;
pub mod sink;
pub mod snapshot;
pub mod soc;


pub use checker::{CheckOutcome, DivergenceChecker, DivergenceRecord};
pub use clock::{ClockDriver, SimTime};
pub use controller::{RunController, RunOutcome, RunState};
pub use signals::{ClockLevel, CommitEvent, TickSignals};
pub use sink::UartSink;

/// Number of architectural registers compared on every commit.
pub const NUM_REGS: usize = 16;

/// Time budget used when nothing else is configured.
pub const DEFAULT_MAX_TIME: SimTime = 200_000;

/// Architectural register file view shared by both models.
pub type RegisterFile = [u32; NUM_REGS];

#[derive(Debug, thiserror::Error)]
pub enum CosimError {
    #[error("output stream failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type CosimResult<T> = Result<T, CosimError>;

/// Cycle-level hardware model driven by the run controller.
///
/// Signal accessors reflect the state after the most recent `eval()`.
pub trait HardwareModel {
    fn set_clock(&mut self, level: ClockLevel);
    fn eval(&mut self);

    fn uart_tx_ready(&self) -> bool;
    fn uart_tx_data(&self) -> u8;
    fn commit_valid(&self) -> bool;
    fn commit_instr(&self) -> u32;

    fn regfile(&self) -> RegisterFile;
    /// Dump-only view, read at timeout termination.
    fn regfile_dbg(&self) -> RegisterFile;

    /// External "simulation finished" condition.
    fn got_finish(&self) -> bool;
}

/// Instruction-set reference model. `step` applies exactly one instruction.
pub trait ReferenceModel {
    fn step(&mut self, instr: u32);
    fn regs(&self) -> RegisterFile;
}

impl<H: HardwareModel + ?Sized> HardwareModel for Box<H> {
    fn set_clock(&mut self, level: ClockLevel) {
        (**self).set_clock(level)
    }

    fn eval(&mut self) {
        (**self).eval()
    }

    fn uart_tx_ready(&self) -> bool {
        (**self).uart_tx_ready()
    }

    fn uart_tx_data(&self) -> u8 {
        (**self).uart_tx_data()
    }

    fn commit_valid(&self) -> bool {
        (**self).commit_valid()
    }

    fn commit_instr(&self) -> u32 {
        (**self).commit_instr()
    }

    fn regfile(&self) -> RegisterFile {
        (**self).regfile()
    }

    fn regfile_dbg(&self) -> RegisterFile {
        (**self).regfile_dbg()
    }

    fn got_finish(&self) -> bool {
        (**self).got_finish()
    }
}

impl<R: ReferenceModel + ?Sized> ReferenceModel for Box<R> {
    fn step(&mut self, instr: u32) {
        (**self).step(instr)
    }

    fn regs(&self) -> RegisterFile {
        (**self).regs()
    }
}

/// Trait for observing co-simulation events in a modular way.
pub trait CosimObserver: std::fmt::Debug + Send + Sync {
    fn on_run_start(&self) {}
    fn on_tick(&self, _time: SimTime, _signals: &TickSignals) {}
    fn on_commit(&self, _time: SimTime, _instr: u32) {}
    fn on_uart_byte(&self, _time: SimTime, _byte: u8) {}
    fn on_divergence(&self, _record: &DivergenceRecord) {}
    fn on_run_stop(&self, _outcome: &RunOutcome) {}
    /// The run ended on a fatal output error instead of an outcome.
    fn on_run_failed(&self, _time: SimTime, _error: &CosimError) {}
}
