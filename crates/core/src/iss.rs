// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::decoder::{decode_z32, Instruction, LINK_REG};
use crate::memory::{ProgramImage, WordMemory, UART_TX_ADDR};
use crate::snapshot::IssSnapshot;
use crate::{ReferenceModel, RegisterFile, NUM_REGS};

bitflags::bitflags! {
    /// Condition flags. Updated by ALU instructions, never compared.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const Z = 1 << 0;
        const N = 1 << 1;
        const C = 1 << 2;
        /// Even parity of the result.
        const P = 1 << 3;
    }
}

impl Flags {
    fn from_result(value: u32, carry: bool) -> Self {
        let mut flags = Flags::empty();
        flags.set(Flags::Z, value == 0);
        flags.set(Flags::N, value & 0x8000_0000 != 0);
        flags.set(Flags::C, carry);
        flags.set(Flags::P, value.count_ones() % 2 == 0);
        flags
    }
}

/// Z32 instruction-set simulator used as the golden model.
#[derive(Debug, Clone, Default)]
pub struct Z32Iss {
    pub regs: RegisterFile,
    pub pc: u32,
    pub flags: Flags,
    pub halted: bool,
    pub mem: WordMemory,
    pub retired: u64,
}

impl Z32Iss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: &ProgramImage) -> Self {
        let mut iss = Self::new();
        iss.mem.load_image(image);
        iss
    }

    fn alu(&mut self, rd: u8, value: u32, carry: bool) {
        self.regs[rd as usize] = value;
        self.flags = Flags::from_result(value, carry);
    }

    fn reg(&self, n: u8) -> u32 {
        self.regs[n as usize]
    }

    /// Apply one instruction to the architectural state.
    pub fn execute(&mut self, inst: u32) {
        let instruction = decode_z32(inst);
        tracing::trace!("ISS PC={:#x}, Op={:#010x}, Instr={:?}", self.pc, inst, instruction);

        let mut next_pc = self.pc.wrapping_add(4);

        match instruction {
            Instruction::Nop => {}
            Instruction::Add { rd, rs1, rs2 } => {
                let (v, c) = self.reg(rs1).overflowing_add(self.reg(rs2));
                self.alu(rd, v, c);
            }
            Instruction::Sub { rd, rs1, rs2 } => {
                let (v, c) = self.reg(rs1).overflowing_sub(self.reg(rs2));
                self.alu(rd, v, c);
            }
            Instruction::And { rd, rs1, rs2 } => {
                self.alu(rd, self.reg(rs1) & self.reg(rs2), false);
            }
            Instruction::Or { rd, rs1, rs2 } => {
                self.alu(rd, self.reg(rs1) | self.reg(rs2), false);
            }
            Instruction::Xor { rd, rs1, rs2 } => {
                self.alu(rd, self.reg(rs1) ^ self.reg(rs2), false);
            }
            Instruction::Not { rd, rs1 } => {
                self.alu(rd, !self.reg(rs1), false);
            }
            Instruction::Shl { rd, rs1, rs2 } => {
                self.alu(rd, self.reg(rs1) << (self.reg(rs2) & 31), false);
            }
            Instruction::Shr { rd, rs1, rs2 } => {
                self.alu(rd, self.reg(rs1) >> (self.reg(rs2) & 31), false);
            }
            Instruction::Sar { rd, rs1, rs2 } => {
                let v = ((self.reg(rs1) as i32) >> (self.reg(rs2) & 31)) as u32;
                self.alu(rd, v, false);
            }
            Instruction::Addi { rd, rs1, imm } => {
                let (v, c) = self.reg(rs1).overflowing_add(imm as u32);
                self.alu(rd, v, c);
            }
            Instruction::Andi { rd, rs1, imm } => {
                self.alu(rd, self.reg(rs1) & imm, false);
            }
            Instruction::Ori { rd, rs1, imm } => {
                self.alu(rd, self.reg(rs1) | imm, false);
            }
            Instruction::Xori { rd, rs1, imm } => {
                self.alu(rd, self.reg(rs1) ^ imm, false);
            }
            Instruction::Lui { rd, imm } => {
                self.regs[rd as usize] = imm;
            }
            Instruction::Ld { rd, rs1, imm } => {
                let addr = self.reg(rs1).wrapping_add(imm as u32);
                self.regs[rd as usize] = if addr == UART_TX_ADDR {
                    0
                } else {
                    self.mem.read(addr)
                };
            }
            Instruction::St { rs, rs1, imm } => {
                let addr = self.reg(rs1).wrapping_add(imm as u32);
                if addr != UART_TX_ADDR {
                    self.mem.write(addr, self.reg(rs));
                }
            }
            Instruction::Beq { rs1, rs2, offset } => {
                if self.reg(rs1) == self.reg(rs2) {
                    next_pc = next_pc.wrapping_add((offset as u32).wrapping_mul(4));
                }
            }
            Instruction::Bne { rs1, rs2, offset } => {
                if self.reg(rs1) != self.reg(rs2) {
                    next_pc = next_pc.wrapping_add((offset as u32).wrapping_mul(4));
                }
            }
            Instruction::Jal { target } => {
                self.regs[LINK_REG as usize] = self.pc.wrapping_add(4);
                next_pc = target << 2;
            }
            Instruction::Halt => {
                self.halted = true;
                next_pc = self.pc;
            }
            Instruction::Unknown(raw) => {
                tracing::debug!("ISS treating unknown opcode {:#04x} as NOP", raw >> 26);
            }
        }

        self.pc = next_pc;
        self.retired += 1;
    }

    pub fn snapshot(&self) -> IssSnapshot {
        IssSnapshot {
            registers: self.regs.to_vec(),
            pc: self.pc,
            flags: self.flags.bits(),
            halted: self.halted,
            retired: self.retired,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &IssSnapshot) {
        for (i, value) in snapshot.registers.iter().take(NUM_REGS).enumerate() {
            self.regs[i] = *value;
        }
        self.pc = snapshot.pc;
        self.flags = Flags::from_bits_truncate(snapshot.flags);
        self.halted = snapshot.halted;
        self.retired = snapshot.retired;
    }
}

impl ReferenceModel for Z32Iss {
    fn step(&mut self, instr: u32) {
        self.execute(instr);
    }

    fn regs(&self) -> RegisterFile {
        self.regs
    }
}
