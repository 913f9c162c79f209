// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::checker::{CheckOutcome, DivergenceChecker, DivergenceRecord};
use crate::clock::{ClockDriver, SimTime};
use crate::signals::TickSignals;
use crate::sink::UartSink;
use crate::{CosimError, CosimObserver, CosimResult, HardwareModel, ReferenceModel, RegisterFile};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    FinishedNatural,
    FinishedTimeout,
    FinishedDivergent,
    /// The output stream failed; the run cannot be resumed.
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

/// Terminal result of a lockstep run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The hardware model raised its finish signal.
    Finished { sim_time: SimTime },
    /// The time budget ran out. Carries the debug register view that was dumped.
    Timeout {
        sim_time: SimTime,
        regdump: RegisterFile,
    },
    Divergence(DivergenceRecord),
}

impl RunOutcome {
    pub fn sim_time(&self) -> SimTime {
        match self {
            RunOutcome::Finished { sim_time } | RunOutcome::Timeout { sim_time, .. } => *sim_time,
            RunOutcome::Divergence(record) => record.sim_time,
        }
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, RunOutcome::Divergence(_))
    }

    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Finished { .. } => RunState::FinishedNatural,
            RunOutcome::Timeout { .. } => RunState::FinishedTimeout,
            RunOutcome::Divergence(_) => RunState::FinishedDivergent,
        }
    }
}

/// Fatal error latched by the controller and replayed on every later call.
#[derive(Debug, Clone)]
struct RunFailure {
    sim_time: SimTime,
    kind: io::ErrorKind,
    message: String,
}

impl RunFailure {
    fn new(sim_time: SimTime, err: &CosimError) -> Self {
        match err {
            CosimError::Io(e) => Self {
                sim_time,
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }

    fn to_error(&self) -> CosimError {
        CosimError::Io(io::Error::new(self.kind, self.message.clone()))
    }
}

/// Drives the hardware model tick by tick and cross-checks every commit
/// against the reference model.
pub struct RunController<H: HardwareModel, R: ReferenceModel, W: Write> {
    hw: H,
    reference: R,
    clock: ClockDriver,
    checker: DivergenceChecker,
    sink: UartSink<W>,
    observers: Vec<Arc<dyn CosimObserver>>,
    started: bool,
    outcome: Option<RunOutcome>,
    failure: Option<RunFailure>,
}

impl<H: HardwareModel, R: ReferenceModel, W: Write> RunController<H, R, W> {
    pub fn new(hw: H, reference: R, sink: UartSink<W>, max_time: SimTime) -> Self {
        Self {
            hw,
            reference,
            clock: ClockDriver::new(max_time),
            checker: DivergenceChecker::new(),
            sink,
            observers: Vec::new(),
            started: false,
            outcome: None,
            failure: None,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn CosimObserver>) {
        self.observers.push(observer);
    }

    /// Run until one of the terminal transitions is taken.
    pub fn run(&mut self) -> CosimResult<RunOutcome> {
        info!(
            "Running lockstep co-simulation (max_time={})",
            self.clock.max_time()
        );
        loop {
            if let Some(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }

    /// Execute a single loop iteration. Returns the outcome once terminal;
    /// after that no further ticks are processed. An output failure is
    /// terminal too and is returned again by every later call.
    pub fn step(&mut self) -> CosimResult<Option<RunOutcome>> {
        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }
        if let Some(outcome) = &self.outcome {
            return Ok(Some(outcome.clone()));
        }
        if !self.started {
            self.started = true;
            for observer in &self.observers {
                observer.on_run_start();
            }
        }

        match self.tick() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let time = self.clock.time();
                error!("Output stream failed at time {}: {}", time, e);
                for observer in &self.observers {
                    observer.on_run_failed(time, &e);
                }
                self.failure = Some(RunFailure::new(time, &e));
                Err(e)
            }
        }
    }

    fn tick(&mut self) -> CosimResult<Option<RunOutcome>> {
        if self.hw.got_finish() {
            info!("Hardware model finished at time {}", self.clock.time());
            return Ok(Some(self.finish(RunOutcome::Finished {
                sim_time: self.clock.time(),
            })));
        }

        let time = self.clock.advance();
        self.hw.set_clock(self.clock.level());
        self.hw.eval();

        let signals = TickSignals::sample(self.clock.level(), &self.hw);
        for observer in &self.observers {
            observer.on_tick(time, &signals);
        }

        if let Some(byte) = signals.uart_byte() {
            self.sink.forward(byte)?;
            for observer in &self.observers {
                observer.on_uart_byte(time, byte);
            }
        }

        if signals.commit.valid {
            for observer in &self.observers {
                observer.on_commit(time, signals.commit.instr);
            }
            let hw_regs = self.hw.regfile();
            if let CheckOutcome::Diverged(record) =
                self.checker
                    .on_tick(signals.commit, &hw_regs, &mut self.reference, time)
            {
                error!("{}", record);
                for observer in &self.observers {
                    observer.on_divergence(&record);
                }
                return Ok(Some(self.finish(RunOutcome::Divergence(record))));
            }
        }

        if self.clock.expired() {
            let regdump = self.hw.regfile_dbg();
            self.sink.write_regdump(&regdump)?;
            info!(
                "Time budget {} exhausted at time {}",
                self.clock.max_time(),
                time
            );
            return Ok(Some(self.finish(RunOutcome::Timeout {
                sim_time: time,
                regdump,
            })));
        }

        Ok(None)
    }

    fn finish(&mut self, outcome: RunOutcome) -> RunOutcome {
        for observer in &self.observers {
            observer.on_run_stop(&outcome);
        }
        self.outcome = Some(outcome.clone());
        outcome
    }

    pub fn state(&self) -> RunState {
        if self.failure.is_some() {
            return RunState::Failed;
        }
        self.outcome
            .as_ref()
            .map(RunOutcome::state)
            .unwrap_or(RunState::Running)
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Time of the tick whose output failed, if the run failed.
    pub fn failed_at(&self) -> Option<SimTime> {
        self.failure.as_ref().map(|f| f.sim_time)
    }

    pub fn sim_time(&self) -> SimTime {
        self.clock.time()
    }

    pub fn commits(&self) -> u64 {
        self.checker.commits()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn reference(&self) -> &R {
        &self.reference
    }

    pub fn sink(&self) -> &UartSink<W> {
        &self.sink
    }

    pub fn into_parts(self) -> (H, R, UartSink<W>) {
        (self.hw, self.reference, self.sink)
    }
}
