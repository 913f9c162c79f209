// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Words of data memory (and ROM) in the Z32 address map.
pub const MEM_WORDS: usize = 65536;

/// Byte address of the memory-mapped UART transmit register.
pub const UART_TX_ADDR: u32 = 0x0004_0000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    /// Word address of the first entry.
    pub start_word: u32,
    pub words: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramImage {
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single segment at word address 0.
    pub fn from_words(words: Vec<u32>) -> Self {
        let mut image = Self::new();
        image.add_segment(0, words);
        image
    }

    pub fn add_segment(&mut self, start_word: u32, words: Vec<u32>) {
        self.segments.push(Segment { start_word, words });
    }

    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|s| s.words.len()).sum()
    }
}

/// Flat word-addressed memory shared by the ROM and data accesses.
#[derive(Clone)]
pub struct WordMemory {
    data: Vec<u32>,
}

impl Default for WordMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WordMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WordMemory({} words)", self.data.len())
    }
}

impl WordMemory {
    pub fn new() -> Self {
        Self {
            data: vec![0; MEM_WORDS],
        }
    }

    /// Index for a byte address. Addresses wrap at the end of memory.
    fn index(addr: u32) -> usize {
        ((addr >> 2) as usize) & (MEM_WORDS - 1)
    }

    pub fn read(&self, addr: u32) -> u32 {
        self.data[Self::index(addr)]
    }

    pub fn write(&mut self, addr: u32, value: u32) {
        self.data[Self::index(addr)] = value;
    }

    /// Returns false if the segment does not fit.
    pub fn load_from_segment(&mut self, segment: &Segment) -> bool {
        let start = segment.start_word as usize;
        let end = match start.checked_add(segment.words.len()) {
            Some(end) if end <= self.data.len() => end,
            _ => return false,
        };
        self.data[start..end].copy_from_slice(&segment.words);
        true
    }

    pub fn load_image(&mut self, image: &ProgramImage) {
        for segment in &image.segments {
            if !self.load_from_segment(segment) {
                tracing::warn!(
                    "Failed to load segment at word {:#x} ({} words) - outside of memory",
                    segment.start_word,
                    segment.words.len()
                );
            }
        }
    }
}
