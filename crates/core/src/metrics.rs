// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::SimTime;
use crate::controller::RunOutcome;
use crate::signals::TickSignals;
use crate::CosimObserver;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct RunMetrics {
    tick_count: AtomicU64,
    commit_count: AtomicU64,
    uart_byte_count: AtomicU64,
    diverged: AtomicBool,
    start_time: Mutex<Instant>,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            commit_count: AtomicU64::new(0),
            uart_byte_count: AtomicU64::new(0),
            diverged: AtomicBool::new(false),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.tick_count.store(0, Ordering::SeqCst);
        self.commit_count.store(0, Ordering::SeqCst);
        self.uart_byte_count.store(0, Ordering::SeqCst);
        self.diverged.store(false, Ordering::SeqCst);
        if let Ok(mut t) = self.start_time.lock() {
            *t = Instant::now();
        }
    }

    pub fn get_ticks(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn get_commits(&self) -> u64 {
        self.commit_count.load(Ordering::SeqCst)
    }

    pub fn get_uart_bytes(&self) -> u64 {
        self.uart_byte_count.load(Ordering::SeqCst)
    }

    pub fn diverged(&self) -> bool {
        self.diverged.load(Ordering::SeqCst)
    }

    /// Simulated ticks per wall-clock second.
    pub fn get_tick_rate(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_ticks() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl CosimObserver for RunMetrics {
    fn on_run_start(&self) {
        self.reset();
    }

    fn on_tick(&self, _time: SimTime, _signals: &TickSignals) {
        self.tick_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_commit(&self, _time: SimTime, _instr: u32) {
        self.commit_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_uart_byte(&self, _time: SimTime, _byte: u8) {
        self.uart_byte_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_run_stop(&self, outcome: &RunOutcome) {
        if outcome.is_divergence() {
            self.diverged.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::DivergenceRecord;

    #[test]
    fn test_counters() {
        let metrics = RunMetrics::new();
        metrics.on_run_start();
        metrics.on_tick(1, &TickSignals::default());
        metrics.on_tick(2, &TickSignals::default());
        metrics.on_commit(2, 0);
        metrics.on_uart_byte(2, b'a');

        assert_eq!(metrics.get_ticks(), 2);
        assert_eq!(metrics.get_commits(), 1);
        assert_eq!(metrics.get_uart_bytes(), 1);
        assert!(!metrics.diverged());

        metrics.on_run_stop(&RunOutcome::Divergence(DivergenceRecord {
            register: 0,
            hw_value: 1,
            ref_value: 2,
            sim_time: 2,
            instr: 0,
        }));
        assert!(metrics.diverged());

        metrics.on_run_start();
        assert_eq!(metrics.get_ticks(), 0);
        assert!(!metrics.diverged());
    }
}
