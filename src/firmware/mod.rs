//! Bootloader EEPROM handling.
//!
//! NVMe boot needs a recent bootloader, so the migration checks
//! `rpi-eeprom-update` before touching the disk. Applying an update stages
//! it for the next boot; when the tool says a reboot is pending the whole
//! run stops and the operator re-runs after rebooting.

mod boot_order;
mod eeprom_config;

pub use boot_order::{BootOrder, BootSource};
pub use eeprom_config::{
    manual_remediation, set_boot_order, BootOrderOutcome, BootOrderStatus, EepromConfig,
    EEPROM_CONFIG_TOOL,
};

use crate::confirm::Confirmer;
use crate::error::MigrateError;
use crate::process::{Cmd, CommandFailure, Host};

pub const EEPROM_UPDATE_TOOL: &str = "rpi-eeprom-update";

/// What `rpi-eeprom-update` says about the installed bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStatus {
    UpToDate,
    UpdateAvailable,
    /// Output could not be interpreted; treated like an available update.
    Indeterminate,
}

/// What the tool said after `rpi-eeprom-update -a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplySignal {
    RebootRequired,
    UpToDate,
    Ambiguous,
}

/// Result of the firmware step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareOutcome {
    /// Nothing to do.
    UpToDate,
    /// Update applied, no reboot needed.
    Updated,
    /// Operator declined the update.
    Skipped,
    /// Update failed to apply and the operator chose to continue.
    UpdateFailed,
    /// The run must stop here; re-run after rebooting.
    RebootRequired,
}

pub fn classify_status(output: &str) -> FirmwareStatus {
    let text = output.to_ascii_lowercase();
    if text.contains("bootloader: up to date") || text.contains("bootloader: up-to-date") {
        FirmwareStatus::UpToDate
    } else if text.contains("update available") || text.contains("update required") {
        FirmwareStatus::UpdateAvailable
    } else {
        FirmwareStatus::Indeterminate
    }
}

pub fn classify_apply(output: &str) -> ApplySignal {
    let text = output.to_ascii_lowercase();
    let reboot = text.contains("reboot")
        && (text.contains("pending") || text.contains("required") || text.contains("please reboot"));
    if reboot {
        ApplySignal::RebootRequired
    } else if text.contains("up to date") || text.contains("up-to-date") {
        ApplySignal::UpToDate
    } else {
        ApplySignal::Ambiguous
    }
}

/// Query the bootloader and, with the operator's consent, update it.
pub fn check_and_update(
    host: &dyn Host,
    confirmer: &mut dyn Confirmer,
) -> Result<FirmwareOutcome, MigrateError> {
    let query = Cmd::new(EEPROM_UPDATE_TOOL)
        .output_with(host)
        .map_err(MigrateError::FirmwareTool)?;
    let status = classify_status(&query.combined());

    match status {
        FirmwareStatus::UpToDate => {
            println!("  Bootloader is up to date");
            return Ok(FirmwareOutcome::UpToDate);
        }
        FirmwareStatus::UpdateAvailable => {
            println!("  Bootloader update available:");
            print_indented(&query.combined());
            if !confirmer.confirm("Apply the bootloader update now?", true) {
                println!("  Warning: continuing without the update; an old bootloader may not boot from NVMe");
                return Ok(FirmwareOutcome::Skipped);
            }
        }
        FirmwareStatus::Indeterminate => {
            println!("  Warning: could not determine bootloader status:");
            print_indented(&query.combined());
            if !confirmer.confirm("Attempt a bootloader update anyway?", false) {
                println!("  Warning: continuing with an unverified bootloader");
                return Ok(FirmwareOutcome::Skipped);
            }
        }
    }

    let apply = Cmd::new(EEPROM_UPDATE_TOOL).arg("-a");
    let result = apply.output_with(host).map_err(MigrateError::FirmwareTool)?;
    let output = result.combined();

    if !result.success() {
        println!("  Warning: bootloader update failed (exit code {}):", result.code());
        print_indented(&output);
        if confirmer.confirm("Continue the migration without the update?", false) {
            return Ok(FirmwareOutcome::UpdateFailed);
        }
        return Err(MigrateError::FirmwareTool(CommandFailure {
            command: apply.to_string(),
            reason: format!("exited with code {}", result.code()),
            output,
        }));
    }

    match classify_apply(&output) {
        ApplySignal::RebootRequired => {
            println!("  Bootloader update staged; a reboot is required to apply it");
            Ok(FirmwareOutcome::RebootRequired)
        }
        ApplySignal::UpToDate => {
            println!("  Bootloader updated");
            Ok(FirmwareOutcome::Updated)
        }
        ApplySignal::Ambiguous => {
            println!("  Warning: update output does not say whether a reboot is needed:");
            print_indented(&output);
            if confirmer.confirm("Stop here and reboot before partitioning?", false) {
                Ok(FirmwareOutcome::RebootRequired)
            } else {
                Ok(FirmwareOutcome::Updated)
            }
        }
    }
}

fn print_indented(text: &str) {
    for line in text.lines() {
        println!("    {}", line);
    }
}
