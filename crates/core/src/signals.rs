// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::HardwareModel;

/// Level of the clock input driven into the hardware model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockLevel {
    #[default]
    Low,
    High,
}

impl ClockLevel {
    /// Even time is low, odd time is high.
    pub fn from_parity(time: u64) -> Self {
        Self::from(time & 1 == 1)
    }
}

impl From<bool> for ClockLevel {
    fn from(b: bool) -> Self {
        if b {
            ClockLevel::High
        } else {
            ClockLevel::Low
        }
    }
}

impl From<ClockLevel> for bool {
    fn from(level: ClockLevel) -> Self {
        match level {
            ClockLevel::High => true,
            ClockLevel::Low => false,
        }
    }
}

/// Retirement event as sampled in a single tick. Not valid past that tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitEvent {
    pub valid: bool,
    pub instr: u32,
}

impl CommitEvent {
    pub fn new(valid: bool, instr: u32) -> Self {
        Self { valid, instr }
    }

    pub fn idle() -> Self {
        Self::default()
    }
}

/// Output signals of the hardware model captured after one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSignals {
    pub clock: ClockLevel,
    pub uart_tx_ready: bool,
    pub uart_tx_data: u8,
    pub commit: CommitEvent,
}

impl TickSignals {
    pub fn sample<H: HardwareModel + ?Sized>(clock: ClockLevel, hw: &H) -> Self {
        Self {
            clock,
            uart_tx_ready: hw.uart_tx_ready(),
            uart_tx_data: hw.uart_tx_data(),
            commit: CommitEvent::new(hw.commit_valid(), hw.commit_instr()),
        }
    }

    /// The UART byte if the ready flag is asserted this tick.
    pub fn uart_byte(&self) -> Option<u8> {
        self.uart_tx_ready.then_some(self.uart_tx_data)
    }
}
