// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Random-program regression: straight-line ALU code run in lockstep, with
//! the final register files compared once more after the run.

use clap::Parser;
use lockstep_core::decoder::{encode_j, op, IMM14_MASK};
use lockstep_core::iss::Z32Iss;
use lockstep_core::memory::ProgramImage;
use lockstep_core::soc::{Fault, Z32Soc};
use lockstep_core::{
    HardwareModel, ReferenceModel, RunController, RunOutcome, SimTime, UartSink, DEFAULT_MAX_TIME,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use crate::{EXIT_DIVERGENCE, EXIT_PASS, EXIT_RUNTIME_ERROR};

/// Register, immediate and shift opcodes plus a few unassigned ones that
/// retire as NOPs.
const OPCODES: &[u8] = &[
    op::NOP,
    op::ADD,
    op::SUB,
    op::AND,
    op::OR,
    op::XOR,
    op::NOT,
    op::SHL,
    op::SHR,
    op::SAR,
    op::ADDI,
    op::ANDI,
    op::ORI,
    op::XORI,
    op::LUI,
    0x27,
    0x28,
    0x2A,
    0x31,
];

#[derive(Parser, Debug)]
pub struct RegressArgs {
    /// RNG seed; a random one is chosen and logged when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Instructions per program (HALT is appended)
    #[arg(long, default_value_t = 128)]
    count: usize,

    /// Number of programs, seeded seed, seed+1, ...
    #[arg(long, default_value_t = 1)]
    iterations: u64,

    /// Simulation time budget per program
    #[arg(long, default_value_t = DEFAULT_MAX_TIME)]
    max_time: SimTime,

    /// Write the (first) generated program as a hex file
    #[arg(long)]
    emit: Option<PathBuf>,

    /// Inject a hardware fault into every program (repeatable)
    #[arg(long = "inject-fault")]
    inject_fault: Vec<Fault>,
}

/// One random instruction: random registers, an 8-bit signed immediate.
pub fn random_instr(rng: &mut StdRng) -> u32 {
    let opcode = *OPCODES.choose(rng).unwrap_or(&op::NOP) as u32;
    let rd: u32 = rng.gen_range(0..16);
    let rs1: u32 = rng.gen_range(0..16);
    let rs2: u32 = rng.gen_range(0..16);
    let imm = (rng.gen_range(-128i32..128) as u32) & IMM14_MASK;
    (opcode << 26) | (rd << 22) | (rs1 << 18) | (rs2 << 14) | imm
}

pub fn random_program(seed: u64, count: usize) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut words: Vec<u32> = (0..count).map(|_| random_instr(&mut rng)).collect();
    words.push(encode_j(op::HALT, 0));
    words
}

pub fn run_regress(args: RegressArgs) -> ExitCode {
    let base_seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!(
        "Regression: seed={} count={} iterations={}",
        base_seed, args.count, args.iterations
    );
    let mut failures = 0u64;
    for i in 0..args.iterations {
        let seed = base_seed.wrapping_add(i);
        let words = random_program(seed, args.count);
        if i == 0 {
            if let Some(path) = &args.emit {
                if let Err(e) = lockstep_loader::write_hex(path, &words) {
                    error!("{:#}", e);
                    return ExitCode::from(EXIT_RUNTIME_ERROR);
                }
            }
        }

        let image = ProgramImage::from_words(words);
        let hw = Z32Soc::new(&image).with_faults(args.inject_fault.clone());
        let mut controller = RunController::new(
            hw,
            Z32Iss::with_image(&image),
            UartSink::new(std::io::stdout()),
            args.max_time,
        );

        let outcome = match controller.run() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        };

        let hw_regs = controller.hardware().regfile();
        let ref_regs = controller.reference().regs();
        let mismatched = print_register_table(&hw_regs, &ref_regs);

        match outcome {
            RunOutcome::Divergence(record) => {
                error!("seed {}: {}", seed, record);
                failures += 1;
            }
            RunOutcome::Timeout { sim_time, .. } => {
                info!("seed {}: time budget exhausted at {}", seed, sim_time);
            }
            RunOutcome::Finished { sim_time } if mismatched == 0 => {
                info!(
                    "seed {}: {} commits matched, finished at {}",
                    seed,
                    controller.commits(),
                    sim_time
                );
            }
            RunOutcome::Finished { .. } => {
                error!("seed {}: {} register(s) differ after finish", seed, mismatched);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        error!("{} of {} program(s) diverged", failures, args.iterations);
        ExitCode::from(EXIT_DIVERGENCE)
    } else {
        ExitCode::from(EXIT_PASS)
    }
}

fn print_register_table(hw: &[u32], reference: &[u32]) -> usize {
    let mut mismatched = 0;
    for (i, (h, r)) in hw.iter().zip(reference).enumerate() {
        if h != r {
            mismatched += 1;
            println!("Mismatch R{}: HW={:08X}, ISS={:08X}", i, h, r);
        } else {
            println!("R{}: {:08X}", i, h);
        }
    }
    mismatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::decoder::{decode_z32, Instruction};

    #[test]
    fn test_program_is_deterministic() {
        assert_eq!(random_program(7, 32), random_program(7, 32));
        assert_ne!(random_program(7, 32), random_program(8, 32));
    }

    #[test]
    fn test_program_shape() {
        let words = random_program(1, 64);
        assert_eq!(words.len(), 65);
        assert_eq!(decode_z32(words[64]), Instruction::Halt);
        for w in &words[..64] {
            assert!(OPCODES.contains(&((w >> 26) as u8)));
        }
    }

    #[test]
    fn test_random_programs_match_in_lockstep() {
        for seed in 0..4 {
            let image = ProgramImage::from_words(random_program(seed, 64));
            let mut controller = RunController::new(
                Z32Soc::new(&image),
                Z32Iss::with_image(&image),
                UartSink::new(Vec::new()),
                DEFAULT_MAX_TIME,
            );
            let outcome = controller.run().unwrap();
            assert!(
                matches!(outcome, RunOutcome::Finished { .. }),
                "seed {} ended with {:?}",
                seed,
                outcome
            );
            assert_eq!(controller.commits(), 65);
        }
    }
}
