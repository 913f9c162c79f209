// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use lockstep_core::decoder::{encode_b, encode_i, encode_j, encode_r, op};
use lockstep_core::memory::{ProgramImage, MEM_WORDS};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load a ROM image, assembling it first when the file has a `.z32` extension.
pub fn load_program(path: &Path) -> Result<ProgramImage> {
    let is_source = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("z32"))
        .unwrap_or(false);
    if is_source {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read assembly source: {:?}", path))?;
        let words =
            assemble(&source).with_context(|| format!("Failed to assemble {:?}", path))?;
        info!("Assembled {} words from {:?}", words.len(), path);
        Ok(ProgramImage::from_words(words))
    } else {
        load_hex(path)
    }
}

pub fn load_hex(path: &Path) -> Result<ProgramImage> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read hex file: {:?}", path))?;
    let image = parse_hex(&text).with_context(|| format!("Failed to parse hex file: {:?}", path))?;
    info!(
        "Loaded {} words in {} segment(s) from {:?}",
        image.word_count(),
        image.segments.len(),
        path
    );
    Ok(image)
}

/// Parse a `$readmemh`-style image: one word per line, `@addr` sets the word
/// address of the following data.
pub fn parse_hex(text: &str) -> Result<ProgramImage> {
    let mut image = ProgramImage::new();
    let mut start = 0u32;
    let mut words: Vec<u32> = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = strip_comment(raw, &["//", "#"]).trim();
        if line.is_empty() {
            continue;
        }
        for token in line.split_whitespace() {
            if let Some(addr) = token.strip_prefix('@') {
                let addr = u32::from_str_radix(addr, 16)
                    .with_context(|| format!("line {}: bad address '{}'", lineno + 1, token))?;
                if !words.is_empty() {
                    let next = start as u64 + words.len() as u64;
                    image.add_segment(start, std::mem::take(&mut words));
                    if (addr as u64) < next {
                        warn!("line {}: address {:#x} overlaps previous data", lineno + 1, addr);
                    }
                }
                start = addr;
                continue;
            }
            let word = u32::from_str_radix(token.trim_start_matches("0x"), 16)
                .with_context(|| format!("line {}: bad hex word '{}'", lineno + 1, token))?;
            words.push(word);
        }
    }
    if !words.is_empty() {
        image.add_segment(start, words);
    }

    for segment in &image.segments {
        if segment.start_word as u64 + segment.words.len() as u64 > MEM_WORDS as u64 {
            bail!(
                "segment at word {:#x} ({} words) does not fit in {} words of memory",
                segment.start_word,
                segment.words.len(),
                MEM_WORDS
            );
        }
    }
    if image.segments.is_empty() {
        warn!("Hex image contains no data");
    }
    Ok(image)
}

/// Render words in the format `parse_hex` reads back.
pub fn format_hex(words: &[u32]) -> String {
    let mut out = String::with_capacity(words.len() * 9);
    for word in words {
        let _ = writeln!(out, "{:08x}", word);
    }
    out
}

pub fn write_hex(path: &Path, words: &[u32]) -> Result<()> {
    fs::write(path, format_hex(words))
        .with_context(|| format!("Failed to write hex file: {:?}", path))
}

fn strip_comment<'a>(line: &'a str, markers: &[&str]) -> &'a str {
    let cut = markers
        .iter()
        .filter_map(|m| line.find(m))
        .min()
        .unwrap_or(line.len());
    &line[..cut]
}

/// Assemble Z32 source into instruction words, one per statement.
///
/// Two passes: the first collects `label:` definitions, the second encodes.
/// Branch labels become word offsets relative to the next instruction, `JAL`
/// labels become absolute word targets.
pub fn assemble(source: &str) -> Result<Vec<u32>> {
    let mut labels: HashMap<String, u32> = HashMap::new();
    let mut statements: Vec<(usize, &str)> = Vec::new();

    for (lineno, raw) in source.lines().enumerate() {
        let mut line = strip_comment(raw, &[";"]).trim();
        while let Some((label, rest)) = split_label(line) {
            if labels
                .insert(label.to_string(), statements.len() as u32)
                .is_some()
            {
                bail!("line {}: duplicate label '{}'", lineno + 1, label);
            }
            line = rest.trim();
        }
        if !line.is_empty() {
            statements.push((lineno + 1, line));
        }
    }

    let mut words = Vec::with_capacity(statements.len());
    for (index, (lineno, line)) in statements.iter().enumerate() {
        let word = assemble_statement(line, index as u32, &labels)
            .with_context(|| format!("line {}: '{}'", lineno, line))?;
        debug!("{:04x}: {:08x}  {}", index * 4, word, line);
        words.push(word);
    }
    Ok(words)
}

fn split_label(line: &str) -> Option<(&str, &str)> {
    let (head, rest) = line.split_once(':')?;
    let head = head.trim();
    let is_ident = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !head.starts_with(|c: char| c.is_ascii_digit());
    is_ident.then_some((head, rest))
}

fn assemble_statement(line: &str, index: u32, labels: &HashMap<String, u32>) -> Result<u32> {
    let (mnemonic, rest) = match line.find(char::is_whitespace) {
        Some(pos) => (&line[..pos], line[pos..].trim()),
        None => (line, ""),
    };
    let mnemonic = mnemonic.to_ascii_uppercase();
    let args = split_operands(rest);
    let argc = |n: usize| -> Result<()> {
        if args.len() != n {
            bail!("{} expects {} operand(s), got {}", mnemonic, n, args.len());
        }
        Ok(())
    };

    let word = match mnemonic.as_str() {
        "NOP" => {
            argc(0)?;
            encode_j(op::NOP, 0)
        }
        "HALT" => {
            argc(0)?;
            encode_j(op::HALT, 0)
        }
        "ADD" | "SUB" | "AND" | "OR" | "XOR" | "SHL" | "SHR" | "SAR" => {
            argc(3)?;
            let opcode = match mnemonic.as_str() {
                "ADD" => op::ADD,
                "SUB" => op::SUB,
                "AND" => op::AND,
                "OR" => op::OR,
                "XOR" => op::XOR,
                "SHL" => op::SHL,
                "SHR" => op::SHR,
                _ => op::SAR,
            };
            encode_r(
                opcode,
                parse_reg(&args[0])?,
                parse_reg(&args[1])?,
                parse_reg(&args[2])?,
            )
        }
        "NOT" => {
            argc(2)?;
            encode_r(op::NOT, parse_reg(&args[0])?, parse_reg(&args[1])?, 0)
        }
        "ADDI" | "ANDI" | "ORI" | "XORI" => {
            argc(3)?;
            let opcode = match mnemonic.as_str() {
                "ADDI" => op::ADDI,
                "ANDI" => op::ANDI,
                "ORI" => op::ORI,
                _ => op::XORI,
            };
            let imm = parse_imm(&args[2])?;
            check_range(imm, -(1 << 17), (1 << 18) - 1, "immediate")?;
            encode_i(opcode, parse_reg(&args[0])?, parse_reg(&args[1])?, imm)
        }
        "LUI" => {
            // Both `LUI rd, imm` and `LUI rd, rs1, imm` are accepted.
            let (rd, imm) = match args.len() {
                2 => (parse_reg(&args[0])?, parse_imm(&args[1])?),
                3 => (parse_reg(&args[0])?, parse_imm(&args[2])?),
                n => bail!("LUI expects 2 or 3 operands, got {}", n),
            };
            check_range(imm, 0, (1 << 18) - 1, "upper immediate")?;
            encode_i(op::LUI, rd, 0, imm)
        }
        "LD" => {
            argc(2)?;
            let (base, offset) = parse_mem(&args[1])?;
            encode_i(op::LD, parse_reg(&args[0])?, base, offset)
        }
        "ST" => {
            argc(2)?;
            let (base, offset) = parse_mem(&args[0])?;
            encode_i(op::ST, parse_reg(&args[1])?, base, offset)
        }
        "BEQ" | "BNE" => {
            argc(3)?;
            let opcode = if mnemonic == "BEQ" { op::BEQ } else { op::BNE };
            let offset = match labels.get(args[2].as_str()) {
                Some(&target) => target as i32 - (index as i32 + 1),
                None => parse_imm(&args[2])?,
            };
            check_range(offset, -(1 << 13), (1 << 13) - 1, "branch offset")?;
            encode_b(opcode, parse_reg(&args[0])?, parse_reg(&args[1])?, offset)
        }
        "JAL" => {
            argc(1)?;
            let target = match labels.get(args[0].as_str()) {
                Some(&target) => target as i32,
                None => parse_imm(&args[0])?,
            };
            check_range(target, 0, (1 << 26) - 1, "jump target")?;
            encode_j(op::JAL, target as u32)
        }
        other => bail!("unknown mnemonic '{}'", other),
    };
    Ok(word)
}

/// Split on top-level commas; a quoted character may itself be a comma.
fn split_operands(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for c in text.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            ',' if !in_quote => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() || !out.is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

fn parse_reg(token: &str) -> Result<u8> {
    let t = token.trim().to_ascii_lowercase();
    t.strip_prefix('r')
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| *n < 16)
        .ok_or_else(|| anyhow!("expected register r0..r15, got '{}'", token))
}

fn parse_imm(token: &str) -> Result<i32> {
    let t = token.trim();
    let bytes = t.as_bytes();
    if bytes.len() == 3 && bytes[0] == b'\'' && bytes[2] == b'\'' {
        return Ok(bytes[1] as i32);
    }
    let (negative, digits) = match t.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        digits.parse::<i64>()
    }
    .map_err(|_| anyhow!("expected immediate or label, got '{}'", token))?;
    let value = if negative { -value } else { value };
    i32::try_from(value).map_err(|_| anyhow!("immediate '{}' out of range", token))
}

/// `[rN]`, `[rN+imm]` or `[rN-imm]`.
fn parse_mem(token: &str) -> Result<(u8, i32)> {
    let inner = token
        .trim()
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| anyhow!("expected memory operand [rN+imm], got '{}'", token))?;
    let inner: String = inner.chars().filter(|c| !c.is_whitespace()).collect();
    let (base, offset) = match inner.find(['+', '-']) {
        Some(pos) => (&inner[..pos], parse_imm(&inner[pos..])?),
        None => (inner.as_str(), 0),
    };
    check_range(offset, -(1 << 17), (1 << 17) - 1, "memory offset")?;
    Ok((parse_reg(base)?, offset))
}

fn check_range(value: i32, min: i32, max: i32, what: &str) -> Result<()> {
    if value < min || value > max {
        bail!("{} {} out of range [{}, {}]", what, value, min, max);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::decoder::{decode_z32, Instruction};

    #[test]
    fn test_parse_hex_with_comments_and_addresses() {
        let text = "\
// boot
0000000a
# second
0x0000000b

@10
deadbeef  cafef00d
";
        let image = parse_hex(text).unwrap();
        assert_eq!(image.segments.len(), 2);
        assert_eq!(image.segments[0].start_word, 0);
        assert_eq!(image.segments[0].words, vec![0xa, 0xb]);
        assert_eq!(image.segments[1].start_word, 0x10);
        assert_eq!(image.segments[1].words, vec![0xDEAD_BEEF, 0xCAFE_F00D]);
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        let err = parse_hex("00000001\nzz\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
        assert!(parse_hex("@ffff\n1\n2\n").is_err());
    }

    #[test]
    fn test_parse_hex_segment_at_top_of_address_space() {
        let err = parse_hex("@ffffffff\n1\n@0\n2\n").unwrap_err();
        assert!(format!("{:#}", err).contains("does not fit"));
    }

    #[test]
    fn test_format_hex_reads_back() {
        let text = format_hex(&[1, 0xFFFF_FFFF]);
        assert_eq!(text, "00000001\nffffffff\n");
        assert_eq!(
            parse_hex(&text).unwrap(),
            ProgramImage::from_words(vec![1, 0xFFFF_FFFF])
        );
    }

    #[test]
    fn test_assemble_basic_forms() {
        let words = assemble(
            "
            ADD r3, r1, r2      ; sum
            addi r1, r0, -1
            LUI r4, 0x10
            LD r5, [r4+8]
            ST [r4], r5
            ADDI r6, r0, 'A'
            NOT r7, r6
            HALT
            ",
        )
        .unwrap();
        assert_eq!(words.len(), 8);
        assert_eq!(words[0], 0x04C4_8000);
        assert_eq!(
            decode_z32(words[1]),
            Instruction::Addi {
                rd: 1,
                rs1: 0,
                imm: -1
            }
        );
        assert_eq!(
            decode_z32(words[2]),
            Instruction::Lui {
                rd: 4,
                imm: 0x10 << 14
            }
        );
        assert_eq!(
            decode_z32(words[3]),
            Instruction::Ld {
                rd: 5,
                rs1: 4,
                imm: 8
            }
        );
        assert_eq!(
            decode_z32(words[4]),
            Instruction::St {
                rs: 5,
                rs1: 4,
                imm: 0
            }
        );
        assert_eq!(
            decode_z32(words[5]),
            Instruction::Addi {
                rd: 6,
                rs1: 0,
                imm: 65
            }
        );
        assert_eq!(decode_z32(words[7]), Instruction::Halt);
    }

    #[test]
    fn test_assemble_labels() {
        let words = assemble(
            "
start:  ADDI r1, r0, 3
loop:   ADDI r1, r1, -1
        BNE r1, r0, loop
        JAL start
done:   HALT
",
        )
        .unwrap();
        assert_eq!(
            decode_z32(words[2]),
            Instruction::Bne {
                rs1: 1,
                rs2: 0,
                offset: -2
            }
        );
        assert_eq!(decode_z32(words[3]), Instruction::Jal { target: 0 });
    }

    #[test]
    fn test_assemble_errors_carry_line() {
        let err = assemble("NOP\nFOO r1\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));

        assert!(assemble("ADD r1, r2").is_err());
        assert!(assemble("ADDI r1, r0, 0x40000").is_err());
        assert!(assemble("ADD r16, r0, r0").is_err());
        assert!(assemble("a: NOP\na: NOP").is_err());
    }

    #[test]
    fn test_char_comma_immediate() {
        let words = assemble("ADDI r1, r0, ','").unwrap();
        assert_eq!(
            decode_z32(words[0]),
            Instruction::Addi {
                rd: 1,
                rs1: 0,
                imm: b',' as i32
            }
        );
    }
}
