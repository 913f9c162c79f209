// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IssSnapshot {
    pub registers: Vec<u32>,
    pub pc: u32,
    pub flags: u8,
    pub halted: bool,
    pub retired: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SocSnapshot {
    pub registers: Vec<u32>,
    pub pc: u32,
    pub stage: String,
    pub commits: u64,
    pub finished: bool,
}

/// State of both models at the end of a run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CosimSnapshot {
    pub sim_time: u64,
    pub hardware: SocSnapshot,
    pub reference: IssSnapshot,
}

/// Render a register file as `0x`-prefixed hex strings, index-ordered.
pub fn hex_registers(regs: &[u32]) -> Vec<String> {
    regs.iter().map(|v| format!("{:#010x}", v)).collect()
}
