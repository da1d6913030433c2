//! Preflight checks for an SD-to-NVMe migration.
//!
//! `inspect` is the fail-fast gate in front of a migration run. It is
//! read-only: nothing here touches the destination device.
//! `run_checks` collects the same checks into a report without stopping
//! at the first failure, for `nvme-migrate check`.

mod environment;
mod host_tools;
mod types;

use crate::config::Config;
use crate::disk::MigrationTarget;
use crate::error::MigrateError;
use crate::process::Host;

pub use environment::{boot_size_warning, directory_size, resolve_boot_mount, root_device};
pub use host_tools::{first_missing, REQUIRED_TOOLS};
pub use types::{CheckResult, CheckStatus, PreflightReport, PreflightResult};

/// Verify the system can be migrated to the configured device.
pub fn inspect(host: &dyn Host, config: &Config) -> Result<PreflightResult, MigrateError> {
    if !host.is_privileged() {
        return Err(MigrateError::Permission);
    }

    let target = MigrationTarget::from_config(config);
    let root_device = root_device(host)?;
    println!("  Root filesystem: {}", root_device.display());
    if target.owns(&root_device) {
        return Ok(PreflightResult::AlreadyMigrated { root_device });
    }

    if !target.device.exists() {
        return Err(MigrateError::DeviceNotFound(target.device));
    }

    if let Some((tool, package)) = first_missing(host) {
        return Err(MigrateError::MissingDependency {
            tool: tool.to_string(),
            package: package.to_string(),
        });
    }

    let boot_mount = resolve_boot_mount(config)?;
    println!("  Boot partition:  {}", boot_mount.display());
    if let Some(warning) = boot_size_warning(config, &boot_mount) {
        println!("  Warning: {}", warning);
    }

    Ok(PreflightResult::Ready {
        target,
        boot_mount,
        root_device,
    })
}

/// Run every check and collect the results.
pub fn run_checks(host: &dyn Host, config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(host));

    println!("Checking system state...");
    checks.extend(environment::check_environment(host, config));

    println!();

    PreflightReport { checks }
}
