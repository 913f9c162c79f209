// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::ClockLevel;

/// Half-clock-edge tick counter.
pub type SimTime = u64;

/// Owns simulation time and the clock bit for a single run.
#[derive(Debug, Clone)]
pub struct ClockDriver {
    time: SimTime,
    level: ClockLevel,
    max_time: SimTime,
}

impl ClockDriver {
    pub fn new(max_time: SimTime) -> Self {
        Self {
            time: 0,
            level: ClockLevel::Low,
            max_time,
        }
    }

    /// Move to the next tick. The clock follows the parity of the new time.
    pub fn advance(&mut self) -> SimTime {
        self.time += 1;
        self.level = ClockLevel::from_parity(self.time);
        self.time
    }

    pub fn expired(&self) -> bool {
        self.time > self.max_time
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn level(&self) -> ClockLevel {
        self.level
    }

    pub fn max_time(&self) -> SimTime {
        self.max_time
    }
}
