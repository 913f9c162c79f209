// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod junit;
mod regress;
mod size_limited_writer;
mod vcd_trace;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info};

use lockstep_config::{load_run_script, RunAssertion, StopReason};
use lockstep_core::iss::Z32Iss;
use lockstep_core::memory::ProgramImage;
use lockstep_core::metrics::RunMetrics;
use lockstep_core::snapshot::{hex_registers, CosimSnapshot};
use lockstep_core::soc::{Fault, Z32Soc};
use lockstep_core::{
    CosimResult, DivergenceRecord, HardwareModel, RegisterFile, RunController, RunOutcome,
    SimTime, UartSink, DEFAULT_MAX_TIME,
};

const EXIT_PASS: u8 = 0;
const EXIT_DIVERGENCE: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;
const EXIT_ASSERT_FAIL: u8 = 4;

const RESULT_SCHEMA_VERSION: &str = "1.0";

fn parse_size_arg(s: &str) -> Result<u64, String> {
    lockstep_config::parse_size(s).map_err(|e| format!("{:#}", e))
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Lockstep co-simulation of the Z32 SoC against its reference ISS",
    long_about = None,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    /// Enable per-commit tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a ROM in lockstep (the default when --rom is given).
    Run(RunArgs),

    /// Deterministic, CI-friendly runner mode driven by a run script (YAML).
    Test(TestArgs),

    /// Assemble Z32 source into a hex ROM image.
    Asm(AsmArgs),

    /// Random straight-line programs run in lockstep.
    Regress(regress::RegressArgs),
}

#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// ROM image: hex words, or Z32 assembly with a .z32 extension
    #[arg(short, long)]
    rom: Option<PathBuf>,

    /// Simulation time budget in ticks
    #[arg(long, default_value_t = DEFAULT_MAX_TIME)]
    max_time: SimTime,

    /// Write a VCD trace of the hardware model's signals
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Cap on the VCD trace size (e.g. 4096, 4MB)
    #[arg(long, value_parser = parse_size_arg)]
    max_vcd_bytes: Option<u64>,

    /// Inject a hardware fault: flip@<commit>:r<reg>:<bit> or drop@<commit> (repeatable)
    #[arg(long = "inject-fault")]
    inject_fault: Vec<Fault>,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the run script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Override the script's ROM
    #[arg(short, long)]
    rom: Option<PathBuf>,

    /// Override max_time (takes precedence over script)
    #[arg(long)]
    max_time: Option<SimTime>,

    /// Disable UART stdout echo (still captured for assertions/artifacts)
    #[arg(long)]
    no_uart_stdout: bool,

    /// Directory to write test artifacts (result.json, uart.log, snapshot.json, junit.xml)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional path to write a JUnit XML report for CI systems
    #[arg(long)]
    junit: Option<PathBuf>,

    /// Write a VCD trace of the hardware model's signals
    #[arg(long)]
    vcd: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct AsmArgs {
    /// Z32 assembly source
    source: PathBuf,

    /// Output hex file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    stop_reason: StopReason,
    sim_time: SimTime,
    max_time: SimTime,
    ticks: u64,
    commits: u64,
    uart_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    divergence: Option<DivergenceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regdump: Option<Vec<String>>,
    registers: Vec<String>,
    assertions: Vec<AssertionResult>,
    rom_hash: String,
    config: TestConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AssertionResult {
    assertion: RunAssertion,
    passed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct TestConfig {
    rom: PathBuf,
    script: PathBuf,
    faults: Vec<Fault>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Stdout carries the UART stream and REGDUMP lines; logs go to stderr.
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Run(args)) => run_cosim(args),
        Some(Commands::Test(args)) => run_test(args),
        Some(Commands::Asm(args)) => run_asm(args),
        Some(Commands::Regress(args)) => regress::run_regress(args),
        None => run_cosim(cli.run),
    }
}

/// Everything needed to build one lockstep run.
struct Session {
    image: ProgramImage,
    faults: Vec<Fault>,
    max_time: SimTime,
    vcd: Option<PathBuf>,
    max_vcd_bytes: Option<u64>,
}

struct SessionReport {
    result: CosimResult<RunOutcome>,
    metrics: Arc<RunMetrics>,
    snapshot: CosimSnapshot,
    hw_regs: RegisterFile,
    duration: Duration,
}

fn run_session(
    session: &Session,
    out: Box<dyn Write>,
    capture: Option<Arc<Mutex<Vec<u8>>>>,
) -> anyhow::Result<SessionReport> {
    let mut sink = UartSink::new(out);
    sink.set_capture(capture);

    if !session.faults.is_empty() {
        info!("Injecting {} fault(s): {:?}", session.faults.len(), session.faults);
    }
    let hw = Z32Soc::new(&session.image).with_faults(session.faults.clone());
    let reference = Z32Iss::with_image(&session.image);
    let mut controller = RunController::new(hw, reference, sink, session.max_time);

    let metrics = Arc::new(RunMetrics::new());
    controller.add_observer(metrics.clone());

    if let Some(vcd_path) = &session.vcd {
        info!("Writing VCD trace to {:?}", vcd_path);
        let vcd = vcd_trace::VcdObserver::new(vcd_path, session.max_vcd_bytes)?;
        controller.add_observer(Arc::new(vcd));
    }

    let start = Instant::now();
    let result = controller.run();
    let duration = start.elapsed();

    let snapshot = CosimSnapshot {
        sim_time: controller.sim_time(),
        hardware: controller.hardware().snapshot(),
        reference: controller.reference().snapshot(),
    };
    let hw_regs = controller.hardware().regfile();
    report_metrics(&metrics, duration);

    Ok(SessionReport {
        result,
        metrics,
        snapshot,
        hw_regs,
        duration,
    })
}

fn report_metrics(metrics: &RunMetrics, duration: Duration) {
    info!("Simulation Finished");
    info!("Ticks: {}", metrics.get_ticks());
    info!("Commits: {}", metrics.get_commits());
    info!("UART bytes: {}", metrics.get_uart_bytes());
    info!(
        "Wall time: {:.3}s ({:.0} ticks/s)",
        duration.as_secs_f64(),
        metrics.get_tick_rate()
    );
}

fn run_cosim(args: RunArgs) -> ExitCode {
    let Some(rom) = &args.rom else {
        error!("Missing required --rom argument");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    };

    info!("Loading ROM: {:?}", rom);
    let image = match lockstep_loader::load_program(rom) {
        Ok(image) => image,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let session = Session {
        image,
        faults: args.inject_fault.clone(),
        max_time: args.max_time,
        vcd: args.vcd.clone(),
        max_vcd_bytes: args.max_vcd_bytes,
    };

    let report = match run_session(&session, Box::new(std::io::stdout()), None) {
        Ok(report) => report,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    match report.result {
        Ok(RunOutcome::Finished { sim_time }) => {
            info!("Hardware finished cleanly at time {}", sim_time);
            ExitCode::from(EXIT_PASS)
        }
        Ok(RunOutcome::Timeout { sim_time, .. }) => {
            info!("Stopped at time {} (max_time {})", sim_time, args.max_time);
            ExitCode::from(EXIT_PASS)
        }
        Ok(RunOutcome::Divergence(_)) => ExitCode::from(EXIT_DIVERGENCE),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn run_asm(args: AsmArgs) -> ExitCode {
    let source = match std::fs::read_to_string(&args.source) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to read {:?}: {}", args.source, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let words = match lockstep_loader::assemble(&source) {
        Ok(words) => words,
        Err(e) => {
            error!("{:?}: {:#}", args.source, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Err(e) = lockstep_loader::write_hex(&args.output, &words) {
        error!("{:#}", e);
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }
    info!("Wrote {} words to {:?}", words.len(), args.output);
    ExitCode::from(EXIT_PASS)
}

fn stop_reason_of(outcome: &RunOutcome) -> StopReason {
    match outcome {
        RunOutcome::Finished { .. } => StopReason::Finished,
        RunOutcome::Timeout { .. } => StopReason::Timeout,
        RunOutcome::Divergence(_) => StopReason::Divergence,
    }
}

fn rom_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn run_test(args: TestArgs) -> ExitCode {
    let script = match load_run_script(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, None, None, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let rom_path = args
        .rom
        .clone()
        .unwrap_or_else(|| script.rom_path(&args.script));
    let max_time = args.max_time.unwrap_or(script.limits.max_time);

    let rom_bytes = match std::fs::read(&rom_path) {
        Ok(b) => b,
        Err(e) => {
            let msg = format!("Failed to read ROM {:?}: {}", rom_path, e);
            error!("{}", msg);
            write_config_error_outputs(&args, Some(&rom_path), None, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let image = match lockstep_loader::load_program(&rom_path) {
        Ok(image) => image,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, Some(&rom_path), Some(&rom_bytes), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let max_vcd_bytes = match script.max_vcd_bytes() {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, Some(&rom_path), Some(&rom_bytes), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let session = Session {
        image,
        faults: script.faults.clone(),
        max_time,
        vcd: args.vcd.clone(),
        max_vcd_bytes,
    };

    let uart_tx = Arc::new(Mutex::new(Vec::new()));
    let out: Box<dyn Write> = if args.no_uart_stdout {
        Box::new(std::io::sink())
    } else {
        Box::new(std::io::stdout())
    };
    let report = match run_session(&session, out, Some(uart_tx.clone())) {
        Ok(report) => report,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    let (stop_reason, outcome, message) = match &report.result {
        Ok(outcome) => (stop_reason_of(outcome), Some(outcome.clone()), None),
        Err(e) => {
            error!("{}", e);
            (StopReason::IoError, None, Some(e.to_string()))
        }
    };

    let uart_bytes = uart_tx.lock().map(|g| g.clone()).unwrap_or_default();
    let uart_text = String::from_utf8_lossy(&uart_bytes).to_string();

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    let mut expected_stop_reason_matched = false;

    for assertion in &script.assertions {
        let passed = match assertion {
            RunAssertion::UartContains(a) => uart_text.contains(&a.uart_contains),
            RunAssertion::ExpectedStopReason(a) => a.expected_stop_reason == stop_reason,
            RunAssertion::RegisterValue(a) => {
                report.hw_regs[a.register_value.register] == a.register_value.expected_value
            }
        };

        if matches!(assertion, RunAssertion::ExpectedStopReason(_)) && passed {
            expected_stop_reason_matched = true;
        }

        if !passed {
            all_passed = false;
            error!(
                "Assertion failed: {:?} (captured len={})",
                assertion,
                uart_text.len()
            );
        }

        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    let diverged = stop_reason == StopReason::Divergence && !expected_stop_reason_matched;
    let io_failed = stop_reason == StopReason::IoError && !expected_stop_reason_matched;
    let (status, exit) = if !all_passed {
        ("fail", EXIT_ASSERT_FAIL)
    } else if diverged {
        ("fail", EXIT_DIVERGENCE)
    } else if io_failed {
        ("error", EXIT_RUNTIME_ERROR)
    } else {
        ("pass", EXIT_PASS)
    };

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        stop_reason,
        sim_time: report.snapshot.sim_time,
        max_time,
        ticks: report.metrics.get_ticks(),
        commits: report.metrics.get_commits(),
        uart_bytes: uart_bytes.len() as u64,
        message,
        divergence: match &outcome {
            Some(RunOutcome::Divergence(record)) => Some(*record),
            _ => None,
        },
        regdump: match &outcome {
            Some(RunOutcome::Timeout { regdump, .. }) => Some(hex_registers(regdump)),
            _ => None,
        },
        registers: hex_registers(&report.hw_regs),
        assertions: assertion_results,
        rom_hash: rom_hash(&rom_bytes),
        config: TestConfig {
            rom: rom_path,
            script: args.script.clone(),
            faults: script.faults.clone(),
        },
    };

    write_outputs(&args, &result, Some(&report), &uart_bytes);
    ExitCode::from(exit)
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, value) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create {:?}: {}", path, e),
    }
}

fn write_outputs(
    args: &TestArgs,
    result: &TestResult,
    report: Option<&SessionReport>,
    uart_bytes: &[u8],
) {
    let duration = report.map(|r| r.duration).unwrap_or_default();

    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create output directory {:?}: {}", output_dir, e);
        } else {
            write_json(&output_dir.join("result.json"), result);

            if let Some(report) = report {
                write_json(&output_dir.join("snapshot.json"), &report.snapshot);
            }

            let uart_path = output_dir.join("uart.log");
            if let Err(e) = std::fs::write(&uart_path, uart_bytes) {
                error!("Failed to write uart.log: {}", e);
            }

            let junit_path = output_dir.join("junit.xml");
            if let Err(e) = junit::write_junit_xml(&junit_path, result, duration) {
                error!("Failed to write junit.xml: {}", e);
            }
        }
    }

    if let Some(junit_path) = &args.junit {
        if let Some(parent) = junit_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = junit::write_junit_xml(junit_path, result, duration) {
            error!("Failed to write JUnit report {:?}: {}", junit_path, e);
        }
    }
}

fn write_config_error_outputs(
    args: &TestArgs,
    rom_path: Option<&PathBuf>,
    rom_bytes: Option<&[u8]>,
    message: String,
) {
    if args.output_dir.is_none() && args.junit.is_none() {
        return;
    }
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        stop_reason: StopReason::ConfigError,
        sim_time: 0,
        max_time: args.max_time.unwrap_or(0),
        ticks: 0,
        commits: 0,
        uart_bytes: 0,
        message: Some(message),
        divergence: None,
        regdump: None,
        registers: vec![],
        assertions: vec![],
        rom_hash: rom_bytes.map(rom_hash).unwrap_or_default(),
        config: TestConfig {
            rom: rom_path.cloned().unwrap_or_default(),
            script: args.script.clone(),
            faults: vec![],
        },
    };
    write_outputs(args, &result, None, b"");
}
