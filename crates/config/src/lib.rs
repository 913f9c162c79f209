// Lockstep - Co-simulation Diff Engine
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use lockstep_core::soc::Fault;
use lockstep_core::{DEFAULT_MAX_TIME, NUM_REGS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: &str = "1.0";

fn default_max_time() -> u64 {
    DEFAULT_MAX_TIME
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunInputs {
    /// ROM image: a `.hex` word file or `.z32` assembly source.
    pub rom: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunLimits {
    #[serde(default = "default_max_time")]
    pub max_time: u64,
    /// Cap on the VCD trace size, e.g. "4MB".
    #[serde(default)]
    pub max_vcd_bytes: Option<String>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_time: DEFAULT_MAX_TIME,
            max_vcd_bytes: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Runner failed before simulation started (e.g. script parse/validation error).
    ConfigError,
    /// The hardware model raised its finish signal.
    Finished,
    /// MAX_TIME elapsed.
    Timeout,
    /// A committed instruction left the register files unequal.
    Divergence,
    /// Writing the output stream failed.
    IoError,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueDetails {
    pub register: usize,
    pub expected_value: u32,
}

/// Checked against the hardware register file once the run stops.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueAssertion {
    pub register_value: RegisterValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum RunAssertion {
    UartContains(UartContainsAssertion),
    ExpectedStopReason(StopReasonAssertion),
    RegisterValue(RegisterValueAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunScript {
    pub schema_version: String,
    pub inputs: RunInputs,
    #[serde(default)]
    pub limits: RunLimits,
    /// Faults injected into the hardware model.
    #[serde(default)]
    pub faults: Vec<Fault>,
    #[serde(default)]
    pub assertions: Vec<RunAssertion>,
}

impl RunScript {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self = serde_yaml::from_str(yaml).context("Failed to parse run script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        if self.inputs.rom.trim().is_empty() {
            anyhow::bail!("Input 'rom' path cannot be empty");
        }


        if let Some(size) = &self.limits.max_vcd_bytes {
            parse_size(size).context("Limit 'max_vcd_bytes' is invalid")?;
        }

        for fault in &self.faults {
            if fault.commit() == 0 {
                anyhow::bail!("Fault commit index must be 1 or greater: {:?}", fault);
            }
            if let Fault::RegisterBitFlip { register, bit, .. } = fault {
                if *register as usize >= NUM_REGS || *bit >= 32 {
                    anyhow::bail!("Fault targets r{} bit {}, out of range", register, bit);
                }
            }
        }

        for assertion in &self.assertions {
            if let RunAssertion::RegisterValue(a) = assertion {
                if a.register_value.register >= NUM_REGS {
                    anyhow::bail!(
                        "Assertion 'register_value' names r{}, only r0..r{} exist",
                        a.register_value.register,
                        NUM_REGS - 1
                    );
                }
            }
        }

        Ok(())
    }

    /// ROM path, taken relative to the directory holding the script.
    pub fn rom_path(&self, script_path: &Path) -> PathBuf {
        let rom = Path::new(&self.inputs.rom);
        if rom.is_absolute() {
            return rom.to_path_buf();
        }
        script_path
            .parent()
            .map(|dir| dir.join(rom))
            .unwrap_or_else(|| rom.to_path_buf())
    }

    pub fn max_vcd_bytes(&self) -> Result<Option<u64>> {
        self.limits
            .max_vcd_bytes
            .as_deref()
            .map(parse_size)
            .transpose()
    }
}

pub fn load_run_script<P: AsRef<Path>>(path: P) -> Result<RunScript> {
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to open run script at {:?}", path.as_ref()))?;
    let script = RunScript::from_yaml(&text)?;
    tracing::debug!(
        "Loaded run script {:?}: rom={}, max_time={}, {} fault(s), {} assertion(s)",
        path.as_ref(),
        script.inputs.rom,
        script.limits.max_time,
        script.faults.len(),
        script.assertions.len()
    );
    Ok(script)
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    if let Ok(bytes) = size_str.trim().parse::<u64>() {
        return Ok(bytes);
    }
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_script() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  rom: "hello.z32"
limits:
  max_time: 5000
  max_vcd_bytes: "1024"
faults:
  - register_bit_flip: { commit: 3, register: 2, bit: 0 }
  - drop_writeback: { commit: 5 }
assertions:
  - uart_contains: "Hi"
  - expected_stop_reason: divergence
  - register_value: { register: 3, expected_value: 42 }
"#;
        let script = RunScript::from_yaml(yaml).unwrap();
        assert_eq!(script.inputs.rom, "hello.z32");
        assert_eq!(script.limits.max_time, 5000);
        assert_eq!(script.max_vcd_bytes().unwrap(), Some(1024));
        assert_eq!(
            script.faults,
            vec![
                Fault::RegisterBitFlip {
                    commit: 3,
                    register: 2,
                    bit: 0
                },
                Fault::DropWriteback { commit: 5 }
            ]
        );
        assert_eq!(script.assertions.len(), 3);
        assert!(matches!(
            script.assertions[1],
            RunAssertion::ExpectedStopReason(StopReasonAssertion {
                expected_stop_reason: StopReason::Divergence
            })
        ));
    }

    #[test]
    fn test_limits_default() {
        let script = RunScript::from_yaml(
            r#"
schema_version: "1.0"
inputs:
  rom: "a.hex"
"#,
        )
        .unwrap();
        assert_eq!(script.limits.max_time, DEFAULT_MAX_TIME);
        assert_eq!(script.max_vcd_bytes().unwrap(), None);
        assert!(script.faults.is_empty());
    }

    #[test]
    fn test_invalid_version() {
        let err = RunScript::from_yaml(
            r#"
schema_version: "2.0"
inputs:
  rom: "a.hex"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_zero_max_time_is_allowed() {
        let script = RunScript::from_yaml(
            r#"
schema_version: "1.0"
inputs:
  rom: "a.hex"
limits:
  max_time: 0
"#,
        )
        .unwrap();
        assert_eq!(script.limits.max_time, 0);
    }

    #[test]
    fn test_empty_rom() {
        let err = RunScript::from_yaml(
            r#"
schema_version: "1.0"
inputs:
  rom: " "
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rom"));
    }

    #[test]
    fn test_register_assertion_range() {
        let err = RunScript::from_yaml(
            r#"
schema_version: "1.0"
inputs:
  rom: "a.hex"
assertions:
  - register_value: { register: 16, expected_value: 0 }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("r16"));
    }

    #[test]
    fn test_rom_path_relative_to_script() {
        let script = RunScript::from_yaml(
            r#"
schema_version: "1.0"
inputs:
  rom: "fw/hello.hex"
"#,
        )
        .unwrap();
        assert_eq!(
            script.rom_path(Path::new("/work/tests/run.yaml")),
            PathBuf::from("/work/tests/fw/hello.hex")
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert!(parse_size("1MB").unwrap() >= 1_000_000);
        assert!(parse_size("lots").is_err());
    }
}
