// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Z32 instruction encoding.
//!
//! ```text
//! R/I-type:  op[31:26] rd[25:22] rs1[21:18] rs2[17:14] imm18[17:0]
//! J-type:    op[31:26] target[25:0]
//! ```
//! Branches share the low 14 bits of imm18 with `rs2` in bits 17:14.

pub mod op {
    pub const NOP: u8 = 0x00;
    pub const ADD: u8 = 0x01;
    pub const SUB: u8 = 0x02;
    pub const AND: u8 = 0x03;
    pub const OR: u8 = 0x04;
    pub const XOR: u8 = 0x05;
    pub const NOT: u8 = 0x06;
    pub const SHL: u8 = 0x07;
    pub const SHR: u8 = 0x08;
    pub const SAR: u8 = 0x09;
    pub const ADDI: u8 = 0x0A;
    pub const ANDI: u8 = 0x0B;
    pub const ORI: u8 = 0x0C;
    pub const XORI: u8 = 0x0D;
    pub const LUI: u8 = 0x0E;
    pub const LD: u8 = 0x10;
    pub const ST: u8 = 0x11;
    pub const BEQ: u8 = 0x18;
    pub const BNE: u8 = 0x19;
    pub const JAL: u8 = 0x1C;
    pub const HALT: u8 = 0x3F;
}

pub const IMM18_MASK: u32 = (1 << 18) - 1;
pub const IMM14_MASK: u32 = (1 << 14) - 1;
pub const TARGET_MASK: u32 = (1 << 26) - 1;

/// Register written by JAL.
pub const LINK_REG: u8 = 15;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Instruction {
    Nop,
    Add { rd: u8, rs1: u8, rs2: u8 },
    Sub { rd: u8, rs1: u8, rs2: u8 },
    And { rd: u8, rs1: u8, rs2: u8 },
    Or { rd: u8, rs1: u8, rs2: u8 },
    Xor { rd: u8, rs1: u8, rs2: u8 },
    Not { rd: u8, rs1: u8 },
    Shl { rd: u8, rs1: u8, rs2: u8 },
    Shr { rd: u8, rs1: u8, rs2: u8 },
    Sar { rd: u8, rs1: u8, rs2: u8 },
    Addi { rd: u8, rs1: u8, imm: i32 }, // sign-extended
    Andi { rd: u8, rs1: u8, imm: u32 }, // zero-extended
    Ori { rd: u8, rs1: u8, imm: u32 },
    Xori { rd: u8, rs1: u8, imm: u32 },
    Lui { rd: u8, imm: u32 },           // already shifted into bits 31:14
    Ld { rd: u8, rs1: u8, imm: i32 },   // LD rd, [rs1+imm]
    St { rs: u8, rs1: u8, imm: i32 },   // ST [rs1+imm], rs (rs lives in the rd field)
    Beq { rs1: u8, rs2: u8, offset: i32 }, // offset in words from pc+4
    Bne { rs1: u8, rs2: u8, offset: i32 },
    Jal { target: u32 },                // word address
    Halt,
    Unknown(u32),
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

pub fn decode_z32(inst: u32) -> Instruction {
    let opcode = (inst >> 26) as u8;
    let rd = ((inst >> 22) & 0xF) as u8;
    let rs1 = ((inst >> 18) & 0xF) as u8;
    let rs2 = ((inst >> 14) & 0xF) as u8;
    let imm18 = inst & IMM18_MASK;

    match opcode {
        op::NOP => Instruction::Nop,
        op::ADD => Instruction::Add { rd, rs1, rs2 },
        op::SUB => Instruction::Sub { rd, rs1, rs2 },
        op::AND => Instruction::And { rd, rs1, rs2 },
        op::OR => Instruction::Or { rd, rs1, rs2 },
        op::XOR => Instruction::Xor { rd, rs1, rs2 },
        op::NOT => Instruction::Not { rd, rs1 },
        op::SHL => Instruction::Shl { rd, rs1, rs2 },
        op::SHR => Instruction::Shr { rd, rs1, rs2 },
        op::SAR => Instruction::Sar { rd, rs1, rs2 },
        op::ADDI => Instruction::Addi {
            rd,
            rs1,
            imm: sign_extend(imm18, 18),
        },
        op::ANDI => Instruction::Andi { rd, rs1, imm: imm18 },
        op::ORI => Instruction::Ori { rd, rs1, imm: imm18 },
        op::XORI => Instruction::Xori { rd, rs1, imm: imm18 },
        op::LUI => Instruction::Lui {
            rd,
            imm: imm18 << 14,
        },
        op::LD => Instruction::Ld {
            rd,
            rs1,
            imm: sign_extend(imm18, 18),
        },
        op::ST => Instruction::St {
            rs: rd,
            rs1,
            imm: sign_extend(imm18, 18),
        },
        op::BEQ => Instruction::Beq {
            rs1,
            rs2,
            offset: sign_extend(inst & IMM14_MASK, 14),
        },
        op::BNE => Instruction::Bne {
            rs1,
            rs2,
            offset: sign_extend(inst & IMM14_MASK, 14),
        },
        op::JAL => Instruction::Jal {
            target: inst & TARGET_MASK,
        },
        op::HALT => Instruction::Halt,
        _ => Instruction::Unknown(inst),
    }
}

pub fn encode_r(opcode: u8, rd: u8, rs1: u8, rs2: u8) -> u32 {
    ((opcode as u32) << 26)
        | (((rd & 0xF) as u32) << 22)
        | (((rs1 & 0xF) as u32) << 18)
        | (((rs2 & 0xF) as u32) << 14)
}

pub fn encode_i(opcode: u8, rd: u8, rs1: u8, imm: i32) -> u32 {
    encode_r(opcode, rd, rs1, 0) | (imm as u32 & IMM18_MASK)
}

pub fn encode_b(opcode: u8, rs1: u8, rs2: u8, offset: i32) -> u32 {
    encode_r(opcode, 0, rs1, rs2) | (offset as u32 & IMM14_MASK)
}

pub fn encode_j(opcode: u8, target: u32) -> u32 {
    ((opcode as u32) << 26) | (target & TARGET_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_add() {
        // ADD r3, r1, r2
        let inst = encode_r(op::ADD, 3, 1, 2);
        assert_eq!(inst, 0x04C4_8000);
        assert_eq!(
            decode_z32(inst),
            Instruction::Add {
                rd: 3,
                rs1: 1,
                rs2: 2
            }
        );
    }

    #[test]
    fn test_decode_addi_negative() {
        let inst = encode_i(op::ADDI, 1, 2, -3);
        assert_eq!(
            decode_z32(inst),
            Instruction::Addi {
                rd: 1,
                rs1: 2,
                imm: -3
            }
        );
    }

    #[test]
    fn test_logical_immediates_zero_extend() {
        let inst = encode_i(op::ORI, 1, 0, -1);
        assert_eq!(
            decode_z32(inst),
            Instruction::Ori {
                rd: 1,
                rs1: 0,
                imm: IMM18_MASK
            }
        );
    }

    #[test]
    fn test_decode_lui() {
        let inst = encode_i(op::LUI, 4, 0, 0x10);
        assert_eq!(
            decode_z32(inst),
            Instruction::Lui {
                rd: 4,
                imm: 0x0004_0000
            }
        );
    }

    #[test]
    fn test_branch_keeps_rs2() {
        let inst = encode_b(op::BNE, 1, 9, -2);
        assert_eq!(
            decode_z32(inst),
            Instruction::Bne {
                rs1: 1,
                rs2: 9,
                offset: -2
            }
        );
    }

    #[test]
    fn test_store_source_in_rd_field() {
        let inst = encode_i(op::ST, 5, 1, 8);
        assert_eq!(
            decode_z32(inst),
            Instruction::St {
                rs: 5,
                rs1: 1,
                imm: 8
            }
        );
    }

    #[test]
    fn test_jal_and_halt() {
        assert_eq!(
            decode_z32(encode_j(op::JAL, 0x40)),
            Instruction::Jal { target: 0x40 }
        );
        assert_eq!(decode_z32(0xFC00_0000), Instruction::Halt);
        assert_eq!(decode_z32(0), Instruction::Nop);
    }

    #[test]
    fn test_unknown_opcode() {
        let inst = 0x27 << 26;
        assert_eq!(decode_z32(inst), Instruction::Unknown(inst));
    }
}
