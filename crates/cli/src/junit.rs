// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{TestResult, RESULT_SCHEMA_VERSION};
use lockstep_config::{RunAssertion, StopReason};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn assertion_short_name(assertion: &RunAssertion) -> String {
    const MAX_LEN: usize = 120;
    let s = match assertion {
        RunAssertion::UartContains(a) => format!("uart_contains: {}", a.uart_contains),
        RunAssertion::ExpectedStopReason(a) => {
            format!("expected_stop_reason: {:?}", a.expected_stop_reason)
        }
        RunAssertion::RegisterValue(a) => format!(
            "register_value: r{} == {:#x}",
            a.register_value.register, a.register_value.expected_value
        ),
    };

    if s.len() <= MAX_LEN {
        return s;
    }
    let mut truncated = s.chars().take(MAX_LEN - 1).collect::<String>();
    truncated.push('…');
    truncated
}

fn details(result: &TestResult) -> String {
    let mut d = String::new();
    let _ = writeln!(d, "result_schema_version={}", RESULT_SCHEMA_VERSION);
    let _ = writeln!(d, "stop_reason={:?}", result.stop_reason);
    if let Some(msg) = &result.message {
        let _ = writeln!(d, "message={}", msg);
    }
    if let Some(rec) = &result.divergence {
        let _ = writeln!(d, "divergence={}", rec);
    }
    let _ = writeln!(d, "sim_time={}", result.sim_time);
    let _ = writeln!(d, "max_time={}", result.max_time);
    let _ = writeln!(d, "commits={}", result.commits);
    let _ = writeln!(d, "uart_bytes={}", result.uart_bytes);
    let _ = writeln!(d, "rom_hash={}", result.rom_hash);
    let _ = writeln!(d, "rom={}", result.config.rom.display());
    let _ = writeln!(d, "script={}", result.config.script.display());
    if !result.assertions.is_empty() {
        d.push_str("assertions:\n");
        for a in &result.assertions {
            let _ = writeln!(d, "  - {:?}: {}", a.assertion, a.passed);
        }
    }
    d
}

pub fn write_junit_xml(path: &Path, result: &TestResult, duration: Duration) -> std::io::Result<()> {
    let details = details(result);
    let time_secs = duration.as_secs_f64();
    let any_assertion_failed = result.assertions.iter().any(|a| !a.passed);

    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;
    let mut testcases = String::new();

    // The "run" testcase carries divergences and errors that no assertion accounts for.
    tests += 1;
    let _ = writeln!(
        testcases,
        "  <testcase classname=\"lockstep\" name=\"run\" time=\"{:.6}\">",
        time_secs
    );
    if result.status == "error" {
        let err_type = if result.stop_reason == StopReason::ConfigError {
            "config error"
        } else {
            "runtime error"
        };
        errors += 1;
        let _ = writeln!(
            testcases,
            "    <error message=\"{}\">{}</error>",
            xml_escape(err_type),
            xml_escape(&details)
        );
    } else if result.status == "fail" && !any_assertion_failed {
        failures += 1;
        let _ = writeln!(
            testcases,
            "    <failure message=\"{}\">{}</failure>",
            xml_escape("register file divergence"),
            xml_escape(&details)
        );
    }
    testcases.push_str("  </testcase>\n");

    for (idx, a) in result.assertions.iter().enumerate() {
        tests += 1;
        let name = format!(
            "assertion {}: {}",
            idx + 1,
            assertion_short_name(&a.assertion)
        );
        let _ = writeln!(
            testcases,
            "  <testcase classname=\"lockstep\" name=\"{}\" time=\"0.000000\">",
            xml_escape(&name)
        );
        if !a.passed {
            failures += 1;
            let _ = writeln!(
                testcases,
                "    <failure message=\"assertion failed\">{}</failure>",
                xml_escape(&format!("{}\n\n{}", name, details))
            );
        }
        testcases.push_str("  </testcase>\n");
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    let _ = writeln!(
        xml,
        r#"<testsuite name="lockstep" tests="{}" failures="{}" errors="{}" time="{:.6}">"#,
        tests, failures, errors, time_secs
    );
    xml.push_str("  <properties>\n");
    let _ = writeln!(
        xml,
        "    <property name=\"result_schema_version\" value=\"{}\"/>",
        xml_escape(RESULT_SCHEMA_VERSION)
    );
    let _ = writeln!(
        xml,
        "    <property name=\"stop_reason\" value=\"{}\"/>",
        xml_escape(&format!("{:?}", result.stop_reason))
    );
    let _ = writeln!(
        xml,
        "    <property name=\"rom_hash\" value=\"{}\"/>",
        xml_escape(&result.rom_hash)
    );
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}
