// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Behavioral model of the Z32 SoC: a multicycle core with a memory-mapped
//! UART transmit register, exposing the same signals as the RTL top level.

use crate::decoder::{decode_z32, Instruction, LINK_REG};
use crate::memory::{ProgramImage, WordMemory, UART_TX_ADDR};
use crate::signals::ClockLevel;
use crate::snapshot::SocSnapshot;
use crate::{HardwareModel, RegisterFile};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Types of faults that can be injected into the hardware model.
///
/// `commit` is the 1-based index of the committed instruction whose
/// writeback is disturbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// Flip a bit in a register after the instruction writes back.
    RegisterBitFlip { commit: u64, register: u8, bit: u8 },
    /// Suppress the register write of the instruction.
    DropWriteback { commit: u64 },
}

impl Fault {
    pub fn commit(&self) -> u64 {
        match self {
            Fault::RegisterBitFlip { commit, .. } | Fault::DropWriteback { commit } => *commit,
        }
    }
}

impl FromStr for Fault {
    type Err = String;

    /// `flip@<commit>:r<reg>:<bit>` or `drop@<commit>`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        let (kind, rest) = v
            .split_once('@')
            .ok_or_else(|| format!("invalid fault '{}': expected <kind>@<commit>", value))?;
        let mut parts = rest.split(':');
        let commit = parts
            .next()
            .and_then(|c| c.parse::<u64>().ok())
            .filter(|c| *c > 0)
            .ok_or_else(|| format!("invalid fault '{}': commit must be a positive integer", value))?;

        match kind {
            "flip" => {
                let register = parts
                    .next()
                    .and_then(|r| r.strip_prefix('r'))
                    .and_then(|r| r.parse::<u8>().ok())
                    .filter(|r| *r < 16)
                    .ok_or_else(|| format!("invalid fault '{}': expected register r0..r15", value))?;
                let bit = parts
                    .next()
                    .and_then(|b| b.parse::<u8>().ok())
                    .filter(|b| *b < 32)
                    .ok_or_else(|| format!("invalid fault '{}': expected bit 0..31", value))?;
                Ok(Fault::RegisterBitFlip {
                    commit,
                    register,
                    bit,
                })
            }
            "drop" => Ok(Fault::DropWriteback { commit }),
            _ => Err(format!(
                "unsupported fault kind '{}'; supported: flip, drop",
                kind
            )),
        }
    }
}

/// Control FSM state. One transition per rising clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Fetch,
    Decode,
    Execute,
    Writeback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sar,
}

fn alu(op: AluOp, a: u32, b: u32) -> u32 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Not => !a,
        AluOp::Shl => a << (b & 31),
        AluOp::Shr => a >> (b & 31),
        AluOp::Sar => ((a as i32) >> (b & 31)) as u32,
    }
}

/// Result latched by EXECUTE and applied at WRITEBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Pending {
    #[default]
    None,
    Reg { rd: u8, value: u32 },
    Store { addr: u32, value: u32 },
    Uart(u8),
}

#[derive(Debug, Default)]
pub struct Z32Soc {
    clk: ClockLevel,
    prev_clk: ClockLevel,

    pc: u32,
    ir: u32,
    stage: Stage,
    decoded: Option<Instruction>,
    pending: Pending,
    next_pc: u32,
    halting: bool,

    regs: RegisterFile,
    mem: WordMemory,

    // Outputs, valid for the evaluation that produced them
    commit_valid: bool,
    commit_instr: u32,
    uart_tx_ready: bool,
    uart_tx_data: u8,
    finished: bool,

    commits: u64,
    faults: Vec<Fault>,
}

impl Z32Soc {
    pub fn new(image: &ProgramImage) -> Self {
        let mut soc = Self::default();
        soc.mem.load_image(image);
        soc
    }

    pub fn with_faults(mut self, faults: Vec<Fault>) -> Self {
        self.faults = faults;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    fn reg(&self, n: u8) -> u32 {
        self.regs[n as usize]
    }

    fn execute(&mut self, inst: Instruction) -> Pending {
        let pc4 = self.pc.wrapping_add(4);
        self.next_pc = pc4;

        let r = |rd: u8, op: AluOp, a: u32, b: u32| Pending::Reg {
            rd,
            value: alu(op, a, b),
        };

        match inst {
            Instruction::Add { rd, rs1, rs2 } => r(rd, AluOp::Add, self.reg(rs1), self.reg(rs2)),
            Instruction::Sub { rd, rs1, rs2 } => r(rd, AluOp::Sub, self.reg(rs1), self.reg(rs2)),
            Instruction::And { rd, rs1, rs2 } => r(rd, AluOp::And, self.reg(rs1), self.reg(rs2)),
            Instruction::Or { rd, rs1, rs2 } => r(rd, AluOp::Or, self.reg(rs1), self.reg(rs2)),
            Instruction::Xor { rd, rs1, rs2 } => r(rd, AluOp::Xor, self.reg(rs1), self.reg(rs2)),
            Instruction::Not { rd, rs1 } => r(rd, AluOp::Not, self.reg(rs1), 0),
            Instruction::Shl { rd, rs1, rs2 } => r(rd, AluOp::Shl, self.reg(rs1), self.reg(rs2)),
            Instruction::Shr { rd, rs1, rs2 } => r(rd, AluOp::Shr, self.reg(rs1), self.reg(rs2)),
            Instruction::Sar { rd, rs1, rs2 } => r(rd, AluOp::Sar, self.reg(rs1), self.reg(rs2)),
            Instruction::Addi { rd, rs1, imm } => r(rd, AluOp::Add, self.reg(rs1), imm as u32),
            Instruction::Andi { rd, rs1, imm } => r(rd, AluOp::And, self.reg(rs1), imm),
            Instruction::Ori { rd, rs1, imm } => r(rd, AluOp::Or, self.reg(rs1), imm),
            Instruction::Xori { rd, rs1, imm } => r(rd, AluOp::Xor, self.reg(rs1), imm),
            Instruction::Lui { rd, imm } => Pending::Reg { rd, value: imm },
            Instruction::Ld { rd, rs1, imm } => {
                let addr = alu(AluOp::Add, self.reg(rs1), imm as u32);
                let value = if addr == UART_TX_ADDR {
                    0
                } else {
                    self.mem.read(addr)
                };
                Pending::Reg { rd, value }
            }
            Instruction::St { rs, rs1, imm } => {
                let addr = alu(AluOp::Add, self.reg(rs1), imm as u32);
                if addr == UART_TX_ADDR {
                    Pending::Uart((self.reg(rs) & 0xFF) as u8)
                } else {
                    Pending::Store {
                        addr,
                        value: self.reg(rs),
                    }
                }
            }
            Instruction::Beq { rs1, rs2, offset } => {
                if self.reg(rs1) == self.reg(rs2) {
                    self.next_pc = pc4.wrapping_add((offset << 2) as u32);
                }
                Pending::None
            }
            Instruction::Bne { rs1, rs2, offset } => {
                if self.reg(rs1) != self.reg(rs2) {
                    self.next_pc = pc4.wrapping_add((offset << 2) as u32);
                }
                Pending::None
            }
            Instruction::Jal { target } => {
                self.next_pc = target << 2;
                Pending::Reg {
                    rd: LINK_REG,
                    value: pc4,
                }
            }
            Instruction::Halt => {
                self.halting = true;
                self.next_pc = self.pc;
                Pending::None
            }
            Instruction::Nop | Instruction::Unknown(_) => Pending::None,
        }
    }

    fn writeback(&mut self) {
        self.commits += 1;
        let commit = self.commits;
        let mut pending = std::mem::take(&mut self.pending);

        let dropped = self
            .faults
            .iter()
            .any(|f| matches!(f, Fault::DropWriteback { commit: c } if *c == commit));
        if dropped && matches!(pending, Pending::Reg { .. }) {
            tracing::debug!("Fault: dropping writeback of commit #{}", commit);
            pending = Pending::None;
        }

        match pending {
            Pending::None => {}
            Pending::Reg { rd, value } => self.regs[rd as usize] = value,
            Pending::Store { addr, value } => self.mem.write(addr, value),
            Pending::Uart(byte) => {
                self.uart_tx_ready = true;
                self.uart_tx_data = byte;
            }
        }

        for fault in &self.faults {
            if let Fault::RegisterBitFlip {
                commit: c,
                register,
                bit,
            } = fault
            {
                if *c == commit {
                    tracing::debug!(
                        "Fault: flipping bit {} of r{} at commit #{}",
                        bit,
                        register,
                        commit
                    );
                    self.regs[*register as usize] ^= 1u32 << *bit;
                }
            }
        }

        self.commit_valid = true;
        self.commit_instr = self.ir;
        self.pc = self.next_pc;
        if self.halting {
            self.finished = true;
        }
    }

    fn rising_edge(&mut self) {
        self.stage = match self.stage {
            Stage::Fetch => {
                self.ir = self.mem.read(self.pc);
                Stage::Decode
            }
            Stage::Decode => {
                self.decoded = Some(decode_z32(self.ir));
                Stage::Execute
            }
            Stage::Execute => {
                let inst = self.decoded.take().unwrap_or(Instruction::Nop);
                self.pending = self.execute(inst);
                Stage::Writeback
            }
            Stage::Writeback => {
                self.writeback();
                Stage::Fetch
            }
        };
    }

    pub fn snapshot(&self) -> SocSnapshot {
        SocSnapshot {
            registers: self.regs.to_vec(),
            pc: self.pc,
            stage: format!("{:?}", self.stage).to_ascii_lowercase(),
            commits: self.commits,
            finished: self.finished,
        }
    }
}

impl HardwareModel for Z32Soc {
    fn set_clock(&mut self, level: ClockLevel) {
        self.clk = level;
    }

    fn eval(&mut self) {
        let rising = self.prev_clk == ClockLevel::Low && self.clk == ClockLevel::High;
        self.prev_clk = self.clk;

        self.commit_valid = false;
        self.uart_tx_ready = false;

        if rising && !self.finished {
            self.rising_edge();
        }
    }

    fn uart_tx_ready(&self) -> bool {
        self.uart_tx_ready
    }

    fn uart_tx_data(&self) -> u8 {
        self.uart_tx_data
    }

    fn commit_valid(&self) -> bool {
        self.commit_valid
    }

    fn commit_instr(&self) -> u32 {
        self.commit_instr
    }

    fn regfile(&self) -> RegisterFile {
        self.regs
    }

    fn regfile_dbg(&self) -> RegisterFile {
        self.regs
    }

    fn got_finish(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{encode_i, encode_j, encode_r, op};

    fn clock_cycle(soc: &mut Z32Soc) {
        soc.set_clock(ClockLevel::High);
        soc.eval();
        soc.set_clock(ClockLevel::Low);
        soc.eval();
    }

    #[test]
    fn test_commit_after_four_rising_edges() {
        let image = ProgramImage::from_words(vec![encode_i(op::ADDI, 1, 0, 7)]);
        let mut soc = Z32Soc::new(&image);

        for _ in 0..3 {
            soc.set_clock(ClockLevel::High);
            soc.eval();
            assert!(!soc.commit_valid());
            soc.set_clock(ClockLevel::Low);
            soc.eval();
        }
        soc.set_clock(ClockLevel::High);
        soc.eval();
        assert!(soc.commit_valid());
        assert_eq!(soc.commit_instr(), encode_i(op::ADDI, 1, 0, 7));
        assert_eq!(soc.regfile()[1], 7);

        // Pulse lasts one evaluation
        soc.set_clock(ClockLevel::Low);
        soc.eval();
        assert!(!soc.commit_valid());
    }

    #[test]
    fn test_uart_store_pulses_ready() {
        let image = ProgramImage::from_words(vec![
            encode_i(op::LUI, 1, 0, (UART_TX_ADDR >> 14) as i32),
            encode_i(op::ADDI, 2, 0, b'A' as i32),
            encode_i(op::ST, 2, 1, 0),
        ]);
        let mut soc = Z32Soc::new(&image);
        let mut seen = Vec::new();
        for _ in 0..12 {
            soc.set_clock(ClockLevel::High);
            soc.eval();
            if soc.uart_tx_ready() {
                seen.push(soc.uart_tx_data());
            }
            soc.set_clock(ClockLevel::Low);
            soc.eval();
            assert!(!soc.uart_tx_ready());
        }
        assert_eq!(seen, vec![b'A']);
    }

    #[test]
    fn test_halt_raises_finish() {
        let image = ProgramImage::from_words(vec![encode_j(op::HALT, 0)]);
        let mut soc = Z32Soc::new(&image);
        for _ in 0..4 {
            clock_cycle(&mut soc);
        }
        assert!(soc.got_finish());
        assert_eq!(soc.commits(), 1);

        for _ in 0..8 {
            clock_cycle(&mut soc);
        }
        assert_eq!(soc.commits(), 1);
    }

    #[test]
    fn test_bit_flip_fault() {
        let image = ProgramImage::from_words(vec![
            encode_i(op::ADDI, 1, 0, 1),
            encode_r(op::ADD, 2, 1, 1),
        ]);
        let mut soc = Z32Soc::new(&image).with_faults(vec![Fault::RegisterBitFlip {
            commit: 2,
            register: 2,
            bit: 4,
        }]);
        for _ in 0..8 {
            clock_cycle(&mut soc);
        }
        assert_eq!(soc.regfile()[1], 1);
        assert_eq!(soc.regfile()[2], 2 ^ 0x10);
    }

    #[test]
    fn test_drop_writeback_fault() {
        let image = ProgramImage::from_words(vec![encode_i(op::ADDI, 3, 0, 9)]);
        let mut soc =
            Z32Soc::new(&image).with_faults(vec![Fault::DropWriteback { commit: 1 }]);
        for _ in 0..4 {
            clock_cycle(&mut soc);
        }
        assert_eq!(soc.commits(), 1);
        assert_eq!(soc.regfile()[3], 0);
    }

    #[test]
    fn test_parse_faults() {
        assert_eq!(
            "flip@3:r7:2".parse::<Fault>().unwrap(),
            Fault::RegisterBitFlip {
                commit: 3,
                register: 7,
                bit: 2
            }
        );
        assert_eq!(
            "DROP@10".parse::<Fault>().unwrap(),
            Fault::DropWriteback { commit: 10 }
        );
        assert!("flip@0:r1:1".parse::<Fault>().is_err());
        assert!("flip@1:r16:1".parse::<Fault>().is_err());
        assert!("zap@1".parse::<Fault>().is_err());
    }
}
