//! Migration report written onto the destination root.
//!
//! The report is the record of what a successful run did: which device was
//! used, the PARTUUIDs the boot configuration now points at, and the backups
//! (with digests) that allow undoing the rewrite by hand.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::bootcfg::BootConfigChanges;
use crate::common::{sha256_file, write_file_with_dirs};
use crate::disk::MigrationTarget;
use crate::error::Step;
use crate::firmware::{BootOrder, BootOrderOutcome, BootOrderStatus, FirmwareOutcome};

/// Location of the report on the migrated system.
pub const REPORT_PATH: &str = "var/lib/nvme-migrate/report.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Path on the migrated system.
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootOrderRecord {
    pub previous: Option<String>,
    pub requested: String,
    /// `verified`, `pending`, `apply_failed` or `not_configured`.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: String,
    pub seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub tool_version: String,
    pub completed_at: u64,
    pub source_root_device: PathBuf,
    pub device: PathBuf,
    pub boot_partition: PathBuf,
    pub root_partition: PathBuf,
    pub boot_partuuid: String,
    pub root_partuuid: String,
    pub boot_mount: PathBuf,
    pub firmware: String,
    pub boot_order: BootOrderRecord,
    pub backups: Vec<BackupRecord>,
    pub steps: Vec<StepTiming>,
}

/// `path` under the mounted destination, as the migrated system will see it.
pub fn installed_path(dest_root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(dest_root) {
        Ok(rest) => Path::new("/").join(rest),
        Err(_) => path.to_path_buf(),
    }
}

pub fn firmware_label(outcome: FirmwareOutcome) -> &'static str {
    match outcome {
        FirmwareOutcome::UpToDate => "up_to_date",
        FirmwareOutcome::Updated => "updated",
        FirmwareOutcome::Skipped => "skipped",
        FirmwareOutcome::UpdateFailed => "update_failed",
        FirmwareOutcome::RebootRequired => "reboot_required",
    }
}

impl BootOrderRecord {
    pub fn from_outcome(requested: &BootOrder, outcome: Option<&BootOrderOutcome>) -> Self {
        let Some(outcome) = outcome else {
            return Self {
                previous: None,
                requested: requested.to_string(),
                status: "not_configured".to_string(),
            };
        };
        let status = match outcome.status {
            BootOrderStatus::Verified => "verified",
            BootOrderStatus::Pending { .. } => "pending",
            BootOrderStatus::ApplyFailed { .. } => "apply_failed",
        };
        Self {
            previous: outcome.previous.clone(),
            requested: outcome.requested.to_string(),
            status: status.to_string(),
        }
    }
}

/// Everything the orchestrator collected during a run.
pub struct ReportInput<'a> {
    pub target: &'a MigrationTarget,
    pub source_root_device: &'a Path,
    pub boot_mount: &'a Path,
    pub dest_root: &'a Path,
    pub firmware: FirmwareOutcome,
    pub boot_config: &'a BootConfigChanges,
    pub requested_order: &'a BootOrder,
    pub boot_order: Option<&'a BootOrderOutcome>,
    pub backups: &'a [PathBuf],
    pub steps: &'a [(Step, Duration)],
}

impl MigrationReport {
    pub fn build(input: &ReportInput<'_>) -> Result<Self> {
        let mut backups = Vec::new();
        for backup in input.backups {
            backups.push(BackupRecord {
                path: installed_path(input.dest_root, backup),
                sha256: sha256_file(backup)?,
            });
        }

        let completed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            completed_at,
            source_root_device: input.source_root_device.to_path_buf(),
            device: input.target.device.clone(),
            boot_partition: input.target.boot_partition.clone(),
            root_partition: input.target.root_partition.clone(),
            boot_partuuid: input.boot_config.boot_partuuid.clone(),
            root_partuuid: input.boot_config.root_partuuid.clone(),
            boot_mount: input.boot_mount.to_path_buf(),
            firmware: firmware_label(input.firmware).to_string(),
            boot_order: BootOrderRecord::from_outcome(input.requested_order, input.boot_order),
            backups,
            steps: input
                .steps
                .iter()
                .map(|(step, elapsed)| StepTiming {
                    step: step.to_string(),
                    seconds: elapsed.as_secs_f64(),
                })
                .collect(),
        })
    }

    /// Write the report under `dest_root`, returning the path written.
    pub fn write(&self, dest_root: &Path) -> Result<PathBuf> {
        let path = dest_root.join(REPORT_PATH);
        let json = serde_json::to_string_pretty(self)?;
        write_file_with_dirs(&path, json + "\n")?;
        Ok(path)
    }
}
