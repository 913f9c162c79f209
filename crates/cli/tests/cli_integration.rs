// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lockstep-cli-{}", name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn lockstep(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lockstep"))
        .args(args)
        .output()
        .expect("Failed to execute lockstep")
}

#[test]
fn test_run_hex_to_natural_finish() {
    let rom = fixture("hello.hex");
    let output = lockstep(&["--rom", rom.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Hi");
}

#[test]
fn test_run_subcommand_assembles_source() {
    let rom = fixture("hello.z32");
    let output = lockstep(&["run", "--rom", rom.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Hi");
}

#[test]
fn test_timeout_dumps_registers() {
    let rom = fixture("spin.z32");
    let output = lockstep(&["--rom", rom.to_str().unwrap(), "--max-time", "2000"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 16);
    for (i, line) in lines.iter().enumerate() {
        assert!(
            line.starts_with(&format!("REGDUMP {} ", i)),
            "unexpected line {}: {}",
            i,
            line
        );
    }
    assert_eq!(lines[3], "REGDUMP 3 2a");
    assert_eq!(lines[15], "REGDUMP 15 c");
}

#[test]
fn test_zero_time_budget() {
    let rom = fixture("spin.z32");
    let output = lockstep(&["--rom", rom.to_str().unwrap(), "--max-time", "0"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 16);
    assert!(stdout.starts_with("REGDUMP 0 0\n"));
}

#[test]
fn test_injected_fault_exits_with_divergence() {
    let rom = fixture("hello.z32");
    let output = lockstep(&[
        "--rom",
        rom.to_str().unwrap(),
        "--inject-fault",
        "flip@6:r3:1",
    ]);

    assert_eq!(output.status.code(), Some(1));
    // Bytes before the divergence were already forwarded
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Hi");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("mismatch at r3"),
        "missing diagnostic in stderr: {}",
        stderr
    );
}

#[test]
fn test_bad_fault_spec_is_rejected() {
    let rom = fixture("hello.z32");
    let output = lockstep(&["--rom", rom.to_str().unwrap(), "--inject-fault", "zap@1"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_rom() {
    let output = lockstep(&[]);
    assert_eq!(output.status.code(), Some(2));

    let output = lockstep(&["--rom", "/nonexistent/lockstep/rom.hex"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_asm_writes_loadable_hex() {
    let dir = temp_dir("asm");
    let out = dir.join("hello.hex");
    let src = fixture("hello.z32");

    let output = lockstep(&["asm", src.to_str().unwrap(), "-o", out.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));

    let assembled = std::fs::read_to_string(&out).unwrap();
    let expected: Vec<String> = std::fs::read_to_string(fixture("hello.hex"))
        .unwrap()
        .lines()
        .filter(|l| !l.starts_with("//"))
        .map(str::to_string)
        .collect();
    assert_eq!(assembled.lines().collect::<Vec<_>>(), expected);
}

#[test]
fn test_asm_reports_line_of_error() {
    let dir = temp_dir("asm-error");
    let src = dir.join("bad.z32");
    std::fs::write(&src, "NOP\nADDI r1, r0\n").unwrap();

    let output = lockstep(&[
        "asm",
        src.to_str().unwrap(),
        "-o",
        dir.join("bad.hex").to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 2"));
}

#[test]
fn test_vcd_generation() {
    let dir = temp_dir("vcd");
    let vcd_path = dir.join("trace.vcd");
    let rom = fixture("hello.z32");

    let output = lockstep(&[
        "--rom",
        rom.to_str().unwrap(),
        "--vcd",
        vcd_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let content = std::fs::read_to_string(&vcd_path).expect("Failed to read VCD");
    assert!(content.contains("$timescale"), "VCD header missing");
    assert!(content.contains("$var wire 32"), "VCD signal definitions missing");
    assert!(content.contains("commit_valid"));
    assert!(content.contains("#55"));
}

#[test]
fn test_vcd_size_cap() {
    let dir = temp_dir("vcd-cap");
    let vcd_path = dir.join("trace.vcd");
    let rom = fixture("spin.z32");

    let output = lockstep(&[
        "--rom",
        rom.to_str().unwrap(),
        "--max-time",
        "20000",
        "--vcd",
        vcd_path.to_str().unwrap(),
        "--max-vcd-bytes",
        "512",
    ]);
    assert!(output.status.success());
    assert_eq!(std::fs::metadata(&vcd_path).unwrap().len(), 512);
}

#[test]
fn test_regress_is_reproducible() {
    let dir = temp_dir("regress");
    let first = dir.join("a.hex");
    let second = dir.join("b.hex");

    for path in [&first, &second] {
        let output = lockstep(&[
            "regress",
            "--seed",
            "1234",
            "--count",
            "64",
            "--emit",
            path.to_str().unwrap(),
        ]);
        assert_eq!(output.status.code(), Some(0));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.lines().count(), 16);
        assert!(stdout.starts_with("R0: "));
    }
    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        std::fs::read_to_string(&second).unwrap()
    );
}
