//! EEPROM configuration editing and the boot-order step.
//!
//! `rpi-eeprom-config` prints the bootloader configuration as `KEY=value`
//! lines grouped under optional `[section]` filters. The file is parsed into
//! lines, the setting is changed in place, and the result is applied back
//! with `rpi-eeprom-config --apply`.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::error::MigrateError;
use crate::firmware::BootOrder;
use crate::process::{Cmd, Host};

pub const EEPROM_CONFIG_TOOL: &str = "rpi-eeprom-config";
const BOOT_ORDER_KEY: &str = "BOOT_ORDER";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Setting { key: String, value: String },
    Section(String),
    Other(String),
}

/// Parsed EEPROM configuration, preserving comments and unknown lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepromConfig {
    lines: Vec<Line>,
}

impl EepromConfig {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.starts_with('[') && trimmed.ends_with(']') {
                    return Line::Section(trimmed.to_string());
                }
                if !trimmed.starts_with('#') {
                    if let Some((key, value)) = trimmed.split_once('=') {
                        let key = key.trim();
                        if !key.is_empty() && !key.contains(char::is_whitespace) {
                            return Line::Setting {
                                key: key.to_string(),
                                value: value.trim().to_string(),
                            };
                        }
                    }
                }
                Line::Other(raw.to_string())
            })
            .collect();
        Self { lines }
    }

    /// First value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Setting { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key` everywhere it appears, or append it to an `[all]` section.
    pub fn set(&mut self, key: &str, value: &str) {
        let mut found = false;
        for line in &mut self.lines {
            if let Line::Setting { key: k, value: v } = line {
                if k == key {
                    *v = value.to_string();
                    found = true;
                }
            }
        }
        if found {
            return;
        }

        // A trailing conditional section would otherwise scope the new setting.
        let last_section = self.lines.iter().rev().find_map(|line| match line {
            Line::Section(name) => Some(name.as_str()),
            _ => None,
        });
        if matches!(last_section, Some(name) if !name.eq_ignore_ascii_case("[all]")) {
            self.lines.push(Line::Section("[all]".to_string()));
        }
        self.lines.push(Line::Setting {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
}

impl fmt::Display for EepromConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                Line::Setting { key, value } => writeln!(f, "{}={}", key, value)?,
                Line::Section(name) => writeln!(f, "{}", name)?,
                Line::Other(raw) => writeln!(f, "{}", raw)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOrderStatus {
    /// Re-read configuration shows the requested order.
    Verified,
    /// Applied, but the firmware still reports a different value.
    Pending { observed: Option<String> },
    /// `--apply` failed; the operator has to set it by hand.
    ApplyFailed { output: String },
}

#[derive(Debug, Clone)]
pub struct BootOrderOutcome {
    pub previous: Option<String>,
    pub requested: BootOrder,
    pub status: BootOrderStatus,
}

impl BootOrderOutcome {
    pub fn applied(&self) -> bool {
        !matches!(self.status, BootOrderStatus::ApplyFailed { .. })
    }
}

/// Instructions for setting the boot order by hand.
pub fn manual_remediation(order: &BootOrder) -> String {
    format!(
        "sudo {} --edit   # then set {}={}",
        EEPROM_CONFIG_TOOL, BOOT_ORDER_KEY, order
    )
}

fn read_config(host: &dyn Host) -> Result<EepromConfig, MigrateError> {
    let result = Cmd::new(EEPROM_CONFIG_TOOL)
        .run_with(host)
        .map_err(MigrateError::FirmwareConfig)?;
    Ok(EepromConfig::parse(&result.stdout))
}

fn same_order(observed: Option<&str>, requested: &BootOrder) -> bool {
    observed
        .and_then(|v| v.parse::<BootOrder>().ok())
        .is_some_and(|o| &o == requested)
}

/// Make the EEPROM prefer the destination device.
///
/// Only a failure to read the current configuration is an error. Apply and
/// verification problems are reported in the outcome, because the clone is
/// already usable at this point.
pub fn set_boot_order(host: &dyn Host, order: &BootOrder) -> Result<BootOrderOutcome, MigrateError> {
    let mut config = read_config(host)?;
    let previous = config.get(BOOT_ORDER_KEY).map(str::to_string);

    match &previous {
        Some(value) => println!("  Current BOOT_ORDER={}", value),
        None => println!("  BOOT_ORDER not set, firmware default in use"),
    }

    if same_order(previous.as_deref(), order) {
        println!("  BOOT_ORDER already {} ({})", order, order.describe());
        return Ok(BootOrderOutcome {
            previous,
            requested: order.clone(),
            status: BootOrderStatus::Verified,
        });
    }

    config.set(BOOT_ORDER_KEY, &order.to_string());

    let staged = staged_config_path();
    fs::write(&staged, config.to_string())
        .map_err(|e| MigrateError::io("failed to stage EEPROM configuration", &staged, e))?;

    println!("  Applying BOOT_ORDER={} ({})...", order, order.describe());
    let applied = Cmd::new(EEPROM_CONFIG_TOOL)
        .arg("--apply")
        .arg_path(&staged)
        .run_with(host);
    let _ = fs::remove_file(&staged);

    if let Err(failure) = applied {
        println!("  Warning: {}", failure);
        println!("  Set the boot order manually:");
        println!("    {}", manual_remediation(order));
        return Ok(BootOrderOutcome {
            previous,
            requested: order.clone(),
            status: BootOrderStatus::ApplyFailed {
                output: failure.output,
            },
        });
    }

    let status = match read_config(host) {
        Ok(reread) => {
            let observed = reread.get(BOOT_ORDER_KEY).map(str::to_string);
            if same_order(observed.as_deref(), order) {
                println!("  BOOT_ORDER verified");
                BootOrderStatus::Verified
            } else {
                println!(
                    "  Warning: firmware reports BOOT_ORDER={} (expected {}); it may only change after a reboot",
                    observed.as_deref().unwrap_or("<unset>"),
                    order
                );
                BootOrderStatus::Pending { observed }
            }
        }
        Err(e) => {
            println!("  Warning: could not re-read EEPROM configuration: {}", e);
            BootOrderStatus::Pending { observed: None }
        }
    };

    Ok(BootOrderOutcome {
        previous,
        requested: order.clone(),
        status,
    })
}

fn staged_config_path() -> PathBuf {
    std::env::temp_dir().join(format!("nvme-migrate-eeprom-{}.conf", std::process::id()))
}
