//! Runs the migration steps in order.
//!
//! Every step depends on the one before it. The first fatal error stops the
//! run; mounts held at that point are released as the stack unwinds, and the
//! failure carries the step and any backups written so far.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bootcfg;
use crate::clone::{self, boot_dir_under};
use crate::config::Config;
use crate::confirm::Confirmer;
use crate::disk::{self, PartitionOutcome};
use crate::error::{MigrateError, MigrationFailure, Step};
use crate::firmware::{self, manual_remediation, BootOrderOutcome, BootOrderStatus, FirmwareOutcome};
use crate::preflight::{self, PreflightResult};
use crate::process::{Cmd, Host};
use crate::report::{installed_path, MigrationReport, ReportInput};
use crate::signal;
use crate::timing::Timer;

/// How a run ended, when it did not fail.
#[derive(Debug)]
pub enum MigrationOutcome {
    Completed(MigrationSummary),
    /// Already booted from the destination; nothing was done.
    AlreadyMigrated { root_device: PathBuf },
    /// A bootloader update is staged; reboot and run again.
    RebootRequired,
    /// The operator declined partitioning; nothing was modified.
    Declined,
}

#[derive(Debug)]
pub struct MigrationSummary {
    /// Report location on the migrated system, if it was written.
    pub report: Option<PathBuf>,
    /// Backups, as paths on the migrated system.
    pub backups: Vec<PathBuf>,
    pub boot_order: Option<BootOrderOutcome>,
    pub powered_off: bool,
}

type StepResult<T> = Result<T, (Step, MigrateError)>;

fn at(step: Step) -> impl FnOnce(MigrateError) -> (Step, MigrateError) {
    move |error| (step, error)
}

/// Stop before `step` if the operator pressed Ctrl-C.
fn checkpoint(step: Step) -> StepResult<()> {
    if signal::cancel_requested() {
        return Err((step, MigrateError::Interrupted));
    }
    Ok(())
}

fn section(title: &str) {
    println!("\n=== {} ===\n", title);
}

#[derive(Default)]
struct Progress {
    backups: Vec<PathBuf>,
    steps: Vec<(Step, Duration)>,
}

impl Progress {
    fn timed<T>(&mut self, step: Step, f: impl FnOnce() -> StepResult<T>) -> StepResult<T> {
        checkpoint(step)?;
        section(&capitalize(&step.to_string()));
        let timer = Timer::start(&step.to_string());
        let result = f();
        let elapsed = timer.finish();
        self.steps.push((step, elapsed));
        result
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Run the whole migration.
pub fn run(
    host: &dyn Host,
    config: &Config,
    confirmer: &mut dyn Confirmer,
) -> Result<MigrationOutcome, MigrationFailure> {
    let mut progress = Progress::default();
    match run_steps(host, config, confirmer, &mut progress) {
        Ok(outcome) => Ok(outcome),
        Err((step, error)) => Err(MigrationFailure {
            step,
            error,
            backups: progress
                .backups
                .iter()
                .map(|b| installed_path(&config.mount_root, b))
                .collect(),
        }),
    }
}

fn run_steps(
    host: &dyn Host,
    config: &Config,
    confirmer: &mut dyn Confirmer,
    progress: &mut Progress,
) -> StepResult<MigrationOutcome> {
    let inspection = progress.timed(Step::Preflight, || {
        preflight::inspect(host, config).map_err(at(Step::Preflight))
    })?;
    let (target, boot_mount, root_device) = match inspection {
        PreflightResult::AlreadyMigrated { root_device } => {
            println!(
                "\nAlready running from {} ({}). Nothing to do.",
                config.device.display(),
                root_device.display()
            );
            return Ok(MigrationOutcome::AlreadyMigrated { root_device });
        }
        PreflightResult::Ready {
            target,
            boot_mount,
            root_device,
        } => (target, boot_mount, root_device),
    };

    let firmware = progress.timed(Step::Firmware, || {
        firmware::check_and_update(host, &mut *confirmer).map_err(at(Step::Firmware))
    })?;
    if firmware == FirmwareOutcome::RebootRequired {
        println!("\nThe bootloader update takes effect after a reboot.");
        println!("Reboot, then run nvme-migrate again to continue.");
        return Ok(MigrationOutcome::RebootRequired);
    }

    let partitioned = progress.timed(Step::Partition, || {
        disk::partition(
            host,
            &target,
            &mut *confirmer,
            config.settle_timeout,
            config.settle_poll,
        )
        .map_err(at(Step::Partition))
    })?;
    if partitioned == PartitionOutcome::Declined {
        println!("\nNot partitioning {}. Nothing was changed.", target.device.display());
        return Ok(MigrationOutcome::Declined);
    }

    progress.timed(Step::Format, || {
        disk::format(host, &target).map_err(at(Step::Format))
    })?;

    let mut mounts = progress.timed(Step::Clone, || {
        clone::clone(host, config, &target, &boot_mount).map_err(at(Step::Clone))
    })?;

    let dest_root = config.mount_root.clone();
    let dest_boot = boot_dir_under(&dest_root, &boot_mount);
    let mut backups = Vec::new();
    let changes = progress.timed(Step::BootConfig, || {
        bootcfg::rewrite_boot_config(host, &target, &dest_root, &dest_boot, &boot_mount, &mut backups)
            .map_err(at(Step::BootConfig))
    });
    progress.backups.append(&mut backups);
    let changes = changes?;

    let boot_order = progress.timed(Step::BootOrder, || {
        Ok(configure_boot_order(host, config))
    })?;

    checkpoint(Step::Finish)?;
    section("Finishing");
    let report = write_report(&ReportInput {
        target: &target,
        source_root_device: &root_device,
        boot_mount: &boot_mount,
        dest_root: &dest_root,
        firmware,
        boot_config: &changes,
        requested_order: &config.boot_order,
        boot_order: boot_order.as_ref(),
        backups: &progress.backups,
        steps: &progress.steps,
    });

    println!("  Unmounting {}...", dest_root.display());
    if let Err(e) = mounts.release() {
        println!("  Warning: {}", e);
        println!("  Check `findmnt {}` before powering off.", dest_root.display());
    }

    let backups: Vec<PathBuf> = progress
        .backups
        .iter()
        .map(|b| installed_path(&dest_root, b))
        .collect();
    print_instructions(&target.device, &backups, report.as_deref(), boot_order.as_ref());

    let powered_off = offer_poweroff(host, confirmer);

    Ok(MigrationOutcome::Completed(MigrationSummary {
        report,
        backups,
        boot_order,
        powered_off,
    }))
}

/// Boot order problems never fail the run: the clone is complete and the
/// order can be set by hand.
fn configure_boot_order(host: &dyn Host, config: &Config) -> Option<BootOrderOutcome> {
    println!(
        "  Setting BOOT_ORDER={} ({})",
        config.boot_order,
        config.boot_order.describe()
    );
    match firmware::set_boot_order(host, &config.boot_order) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            println!("  Warning: {}", e);
            if let Some(output) = e.tool_output() {
                println!("  {}", output);
            }
            println!("  Set it manually: {}", manual_remediation(&config.boot_order));
            None
        }
    }
}

fn write_report(input: &ReportInput<'_>) -> Option<PathBuf> {
    let result = MigrationReport::build(input).and_then(|report| report.write(input.dest_root));
    match result {
        Ok(path) => Some(installed_path(input.dest_root, &path)),
        Err(e) => {
            println!("  Warning: could not write migration report: {:#}", e);
            None
        }
    }
}

fn print_instructions(
    device: &Path,
    backups: &[PathBuf],
    report: Option<&Path>,
    boot_order: Option<&BootOrderOutcome>,
) {
    println!("\n=== Migration complete ===\n");
    println!("  The system has been copied to {}.", device.display());
    if !backups.is_empty() {
        println!("  Original boot configuration saved on the NVMe system:");
        for backup in backups {
            println!("    {}", backup.display());
        }
    }
    if let Some(report) = report {
        println!("  Report: {}", report.display());
    }
    match boot_order.map(|o| &o.status) {
        Some(BootOrderStatus::Verified) => {
            println!("\n  Power off, then power on: the Pi will boot from NVMe.");
        }
        _ => {
            println!("\n  The EEPROM boot order is not confirmed. The SD card still boots");
            println!("  first until BOOT_ORDER is set; remove the card to force NVMe boot.");
        }
    }
    println!("  Keep the SD card: it is an untouched fallback.");
}

fn offer_poweroff(host: &dyn Host, confirmer: &mut dyn Confirmer) -> bool {
    println!();
    if !confirmer.confirm_attended("Power off now?", false) {
        return false;
    }
    match Cmd::new("systemctl").arg("poweroff").run_with(host) {
        Ok(_) => true,
        Err(e) => {
            println!("  Warning: {}", e);
            false
        }
    }
}
