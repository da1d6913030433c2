//! Error taxonomy for the migration.

use std::fmt;
use std::path::PathBuf;

use crate::process::CommandFailure;

/// Migration step, used when reporting where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Preflight,
    Firmware,
    Partition,
    Format,
    Clone,
    BootConfig,
    BootOrder,
    Finish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Preflight => "preflight checks",
            Step::Firmware => "bootloader firmware update",
            Step::Partition => "partitioning",
            Step::Format => "formatting",
            Step::Clone => "cloning",
            Step::BootConfig => "boot configuration rewrite",
            Step::BootOrder => "EEPROM boot order",
            Step::Finish => "finishing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("must be run as root (try: sudo nvme-migrate)")]
    Permission,

    #[error("destination device {0} does not exist")]
    DeviceNotFound(PathBuf),

    #[error("required tool '{tool}' not found on PATH (install the '{package}' package)")]
    MissingDependency { tool: String, package: String },

    #[error("could not determine the device mounted at /")]
    RootDeviceLookup(#[source] CommandFailure),

    #[error("bootloader firmware tool failed")]
    FirmwareTool(#[source] CommandFailure),

    #[error("failed to partition {device}")]
    Partition {
        device: PathBuf,
        #[source]
        source: CommandFailure,
    },

    #[error("partitions {boot} and {root} did not appear within {timeout_secs}s")]
    PartitionVerification {
        boot: PathBuf,
        root: PathBuf,
        timeout_secs: u64,
    },

    #[error("failed to format {partition}; the device is partitioned but not formatted")]
    Format {
        partition: PathBuf,
        #[source]
        source: CommandFailure,
    },

    #[error("failed to mount {device} at {mount_point}")]
    Mount {
        device: PathBuf,
        mount_point: PathBuf,
        #[source]
        source: CommandFailure,
    },

    #[error("copy of {what} failed; re-run the migration from partitioning")]
    Copy {
        what: &'static str,
        #[source]
        source: CommandFailure,
    },

    #[error("{what} not found (looked in: {})", display_paths(.searched))]
    ConfigNotFound {
        what: &'static str,
        searched: Vec<PathBuf>,
    },

    #[error("could not resolve PARTUUID of {partition}")]
    PartuuidLookup {
        partition: PathBuf,
        #[source]
        source: Option<CommandFailure>,
    },

    #[error("could not read or apply the EEPROM configuration")]
    FirmwareConfig(#[source] CommandFailure),

    #[error("interrupted by operator")]
    Interrupted,

    #[error("{context}: {path}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrateError {
    /// Shorthand for wrapping a filesystem error with the file involved.
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Output captured from the failing tool, when there is any.
    pub fn tool_output(&self) -> Option<&str> {
        let failure = match self {
            Self::RootDeviceLookup(f) | Self::FirmwareTool(f) | Self::FirmwareConfig(f) => f,
            Self::Partition { source, .. }
            | Self::Format { source, .. }
            | Self::Mount { source, .. }
            | Self::Copy { source, .. } => source,
            Self::PartuuidLookup {
                source: Some(f), ..
            } => f,
            _ => return None,
        };
        if failure.output.is_empty() {
            None
        } else {
            Some(&failure.output)
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A fatal error together with where it happened and what can be used to
/// recover by hand.
#[derive(Debug)]
pub struct MigrationFailure {
    pub step: Step,
    pub error: MigrateError,
    /// Backup files written before the failure.
    pub backups: Vec<PathBuf>,
}

impl fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.error)
    }
}

impl std::error::Error for MigrationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
