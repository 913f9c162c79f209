// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::SimTime;
use crate::signals::CommitEvent;
use crate::{ReferenceModel, RegisterFile};
use serde::{Deserialize, Serialize};

/// First architectural mismatch observed in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceRecord {
    pub register: usize,
    pub hw_value: u32,
    pub ref_value: u32,
    pub sim_time: SimTime,
    /// Instruction whose commit exposed the mismatch.
    pub instr: u32,
}

impl std::fmt::Display for DivergenceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Regfile mismatch at r{}: hw={:#x} ref={:#x} (time={}, instr={:#010x})",
            self.register, self.hw_value, self.ref_value, self.sim_time, self.instr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No commit this tick, the reference model was not touched.
    Idle,
    Match,
    Diverged(DivergenceRecord),
}

/// Lowest index whose values differ, if any.
pub fn first_mismatch(hw: &RegisterFile, reference: &RegisterFile) -> Option<usize> {
    hw.iter().zip(reference.iter()).position(|(h, r)| h != r)
}

/// Steps the reference model on each commit and compares register files.
#[derive(Debug, Default)]
pub struct DivergenceChecker {
    commits: u64,
}

impl DivergenceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits consumed by the reference model so far.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    pub fn on_tick<R: ReferenceModel + ?Sized>(
        &mut self,
        commit: CommitEvent,
        hw_regs: &RegisterFile,
        reference: &mut R,
        sim_time: SimTime,
    ) -> CheckOutcome {
        if !commit.valid {
            return CheckOutcome::Idle;
        }

        reference.step(commit.instr);
        self.commits += 1;

        let ref_regs = reference.regs();
        match first_mismatch(hw_regs, &ref_regs) {
            Some(register) => CheckOutcome::Diverged(DivergenceRecord {
                register,
                hw_value: hw_regs[register],
                ref_value: ref_regs[register],
                sim_time,
                instr: commit.instr,
            }),
            None => {
                tracing::debug!(
                    "Commit #{} instr={:#010x} matched at time {}",
                    self.commits,
                    commit.instr,
                    sim_time
                );
                CheckOutcome::Match
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NUM_REGS;

    #[derive(Debug, Default)]
    struct CountingRef {
        regs: RegisterFile,
        steps: Vec<u32>,
    }

    impl ReferenceModel for CountingRef {
        fn step(&mut self, instr: u32) {
            self.steps.push(instr);
            self.regs[1] = self.regs[1].wrapping_add(1);
        }

        fn regs(&self) -> RegisterFile {
            self.regs
        }
    }

    #[test]
    fn test_idle_tick_does_not_step() {
        let mut checker = DivergenceChecker::new();
        let mut reference = CountingRef::default();
        let hw = [0xFFFF_FFFF; NUM_REGS];

        let out = checker.on_tick(CommitEvent::new(false, 0x1234), &hw, &mut reference, 5);
        assert_eq!(out, CheckOutcome::Idle);
        assert!(reference.steps.is_empty());
        assert_eq!(checker.commits(), 0);
    }

    #[test]
    fn test_matching_commit() {
        let mut checker = DivergenceChecker::new();
        let mut reference = CountingRef::default();
        let mut hw = [0; NUM_REGS];
        hw[1] = 1;

        let out = checker.on_tick(CommitEvent::new(true, 0xAB), &hw, &mut reference, 3);
        assert_eq!(out, CheckOutcome::Match);
        assert_eq!(reference.steps, vec![0xAB]);
        assert_eq!(checker.commits(), 1);
    }

    #[test]
    fn test_lowest_index_wins() {
        let mut checker = DivergenceChecker::new();
        let mut reference = CountingRef::default();
        let mut hw = [0; NUM_REGS];
        hw[1] = 1;
        hw[7] = 0x5;
        hw[12] = 0x77;

        let out = checker.on_tick(CommitEvent::new(true, 0x42), &hw, &mut reference, 42);
        assert_eq!(
            out,
            CheckOutcome::Diverged(DivergenceRecord {
                register: 7,
                hw_value: 0x5,
                ref_value: 0,
                sim_time: 42,
                instr: 0x42,
            })
        );
    }

    #[test]
    fn test_consecutive_commits_are_not_coalesced() {
        let mut checker = DivergenceChecker::new();
        let mut reference = CountingRef::default();
        let mut hw = [0; NUM_REGS];

        for (time, n) in [(10, 1), (11, 2), (12, 3)] {
            hw[1] = n;
            let out = checker.on_tick(CommitEvent::new(true, n), &hw, &mut reference, time);
            assert_eq!(out, CheckOutcome::Match);
        }
        assert_eq!(reference.steps, vec![1, 2, 3]);
        assert_eq!(checker.commits(), 3);
    }

    #[test]
    fn test_record_display() {
        let rec = DivergenceRecord {
            register: 7,
            hw_value: 0x5,
            ref_value: 0x9,
            sim_time: 42,
            instr: 0x0440_0000,
        };
        let text = rec.to_string();
        assert!(text.contains("r7"));
        assert!(text.contains("hw=0x5"));
        assert!(text.contains("ref=0x9"));
        assert!(text.contains("time=42"));
    }
}
