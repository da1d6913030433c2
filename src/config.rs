//! Configuration management for nvme-migrate.
//!
//! Values come from `NVME_MIGRATE_*` environment variables. `main` loads
//! `/etc/nvme-migrate.env` and a local `.env` through dotenvy first, so the
//! files act as defaults and the real environment takes precedence.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::firmware::BootOrder;

/// System-wide env file read before the local `.env`.
pub const SYSTEM_ENV_FILE: &str = "/etc/nvme-migrate.env";

pub const DEFAULT_DEVICE: &str = "/dev/nvme0n1";
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt/nvme-migrate";
/// Pi OS Bookworm mounts the boot partition here; older releases use `/boot`.
pub const DEFAULT_BOOT_MOUNT: &str = "/boot/firmware";
pub const LEGACY_BOOT_MOUNT: &str = "/boot";
/// The firmware needs room for several kernels and overlays.
pub const MIN_BOOT_SIZE_MIB: u64 = 512;
pub const MAX_BOOT_SIZE_MIB: u64 = 64 * 1024;
pub const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 10;

/// Immutable run configuration, built once at startup and passed by
/// reference to every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination block device (whole disk, not a partition).
    pub device: PathBuf,
    /// Where the destination root partition is mounted while cloning.
    pub mount_root: PathBuf,
    /// Source boot mount point; `None` means detect (`/boot/firmware`, then `/boot`).
    pub source_boot: Option<PathBuf>,
    /// Root of the running system to clone.
    pub source_root: PathBuf,
    pub boot_size_mib: u64,
    pub boot_label: String,
    pub root_label: String,
    /// EEPROM boot order written at the end of the run.
    pub boot_order: BootOrder,
    pub settle_timeout: Duration,
    pub settle_poll: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            source_boot: None,
            source_root: PathBuf::from("/"),
            boot_size_mib: MIN_BOOT_SIZE_MIB,
            boot_label: "bootfs".to_string(),
            root_label: "rootfs".to_string(),
            boot_order: BootOrder::nvme_first(),
            settle_timeout: Duration::from_secs(DEFAULT_SETTLE_TIMEOUT_SECS),
            settle_poll: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Build configuration from a variable map, falling back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(device) = get("NVME_MIGRATE_DEVICE") {
            config.device = PathBuf::from(device);
        }
        if let Some(mount_root) = get("NVME_MIGRATE_MOUNT_ROOT") {
            config.mount_root = PathBuf::from(mount_root);
        }
        if let Some(boot) = get("NVME_MIGRATE_SOURCE_BOOT") {
            config.source_boot = Some(PathBuf::from(boot));
        }
        if let Some(size) = get("NVME_MIGRATE_BOOT_SIZE_MIB") {
            config.boot_size_mib = size
                .parse()
                .with_context(|| format!("NVME_MIGRATE_BOOT_SIZE_MIB is not a number: {}", size))?;
        }
        if let Some(label) = get("NVME_MIGRATE_BOOT_LABEL") {
            config.boot_label = label.to_string();
        }
        if let Some(label) = get("NVME_MIGRATE_ROOT_LABEL") {
            config.root_label = label.to_string();
        }
        if let Some(order) = get("NVME_MIGRATE_BOOT_ORDER") {
            config.boot_order = order
                .parse()
                .with_context(|| format!("NVME_MIGRATE_BOOT_ORDER is invalid: {}", order))?;
        }
        if let Some(secs) = get("NVME_MIGRATE_SETTLE_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().with_context(|| {
                format!("NVME_MIGRATE_SETTLE_TIMEOUT_SECS is not a number: {}", secs)
            })?;
            config.settle_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.boot_size_mib < MIN_BOOT_SIZE_MIB {
            bail!(
                "boot partition must be at least {} MiB (configured: {} MiB)",
                MIN_BOOT_SIZE_MIB,
                self.boot_size_mib
            );
        }
        if self.boot_size_mib > MAX_BOOT_SIZE_MIB {
            bail!(
                "boot partition must be at most {} MiB (configured: {} MiB)",
                MAX_BOOT_SIZE_MIB,
                self.boot_size_mib
            );
        }
        if !self.device.is_absolute() {
            bail!("device must be an absolute path: {}", self.device.display());
        }
        if !self.mount_root.is_absolute() || self.mount_root == Path::new("/") {
            bail!(
                "mount root must be an absolute directory other than /: {}",
                self.mount_root.display()
            );
        }
        // FAT volume labels are at most 11 characters.
        if self.boot_label.is_empty() || self.boot_label.len() > 11 {
            bail!("boot label must be 1-11 characters: {:?}", self.boot_label);
        }
        if self.root_label.is_empty() || self.root_label.len() > 16 {
            bail!("root label must be 1-16 characters: {:?}", self.root_label);
        }
        Ok(())
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  NVME_MIGRATE_DEVICE: {}", self.device.display());
        println!("  NVME_MIGRATE_MOUNT_ROOT: {}", self.mount_root.display());
        match &self.source_boot {
            Some(path) => println!("  NVME_MIGRATE_SOURCE_BOOT: {}", path.display()),
            None => println!(
                "  NVME_MIGRATE_SOURCE_BOOT: auto ({} or {})",
                DEFAULT_BOOT_MOUNT, LEGACY_BOOT_MOUNT
            ),
        }
        println!("  NVME_MIGRATE_BOOT_SIZE_MIB: {}", self.boot_size_mib);
        println!("  NVME_MIGRATE_BOOT_LABEL: {}", self.boot_label);
        println!("  NVME_MIGRATE_ROOT_LABEL: {}", self.root_label);
        println!(
            "  NVME_MIGRATE_BOOT_ORDER: {} ({})",
            self.boot_order,
            self.boot_order.describe()
        );
        println!(
            "  NVME_MIGRATE_SETTLE_TIMEOUT_SECS: {}",
            self.settle_timeout.as_secs()
        );
    }
}
