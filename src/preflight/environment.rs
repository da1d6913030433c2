//! System state checks: privileges, root device, source boot partition.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::clone::boot_dir_under;
use crate::config::{Config, DEFAULT_BOOT_MOUNT, LEGACY_BOOT_MOUNT};
use crate::disk::MigrationTarget;
use crate::error::MigrateError;
use crate::process::{Cmd, Host};

use super::types::CheckResult;

/// Device currently mounted at `/`.
pub fn root_device(host: &dyn Host) -> Result<PathBuf, MigrateError> {
    let result = Cmd::new("findmnt")
        .args(["-n", "-o", "SOURCE", "/"])
        .run_with(host)
        .map_err(MigrateError::RootDeviceLookup)?;
    // btrfs and friends append the subvolume: /dev/sda2[/@]
    let source = result.stdout_trimmed();
    let source = source.split('[').next().unwrap_or(source).trim();
    Ok(PathBuf::from(source))
}

/// Boot mount point of the running system.
///
/// Uses the configured path if there is one, otherwise the first of
/// `/boot/firmware` and `/boot` that holds firmware files.
pub fn resolve_boot_mount(config: &Config) -> Result<PathBuf, MigrateError> {
    let candidates = match &config.source_boot {
        Some(path) => vec![path.clone()],
        None => vec![PathBuf::from(DEFAULT_BOOT_MOUNT), PathBuf::from(LEGACY_BOOT_MOUNT)],
    };

    for candidate in &candidates {
        let dir = boot_dir_under(&config.source_root, candidate);
        if dir.join("cmdline.txt").is_file() || dir.join("start4.elf").is_file() {
            return Ok(candidate.clone());
        }
        if config.source_boot.is_some() && dir.is_dir() {
            return Ok(candidate.clone());
        }
    }

    Err(MigrateError::ConfigNotFound {
        what: "source boot partition",
        searched: candidates
            .iter()
            .map(|c| boot_dir_under(&config.source_root, c))
            .collect(),
    })
}

/// Total size in bytes of the regular files under `dir`.
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Warning text if the boot contents will not fit the new boot partition.
pub fn boot_size_warning(config: &Config, boot_mount: &Path) -> Option<String> {
    let used = directory_size(&boot_dir_under(&config.source_root, boot_mount));
    let capacity = config.boot_size_mib.saturating_mul(1024 * 1024);
    // Leave room for FAT overhead and future kernels.
    if used > capacity / 10 * 9 {
        Some(format!(
            "{} uses {} MiB, boot partition is {} MiB; raise NVME_MIGRATE_BOOT_SIZE_MIB",
            boot_mount.display(),
            used / (1024 * 1024),
            config.boot_size_mib
        ))
    } else {
        None
    }
}

/// Environment checks for the report.
pub fn check_environment(host: &dyn Host, config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();
    let target = MigrationTarget::from_config(config);

    if host.is_privileged() {
        results.push(CheckResult::pass("root privileges"));
    } else {
        results.push(CheckResult::fail("root privileges", "run with sudo"));
    }

    match root_device(host) {
        Ok(root) if target.owns(&root) => results.push(CheckResult::warn(
            "root device",
            &format!("{} - already running from {}", root.display(), target.device.display()),
        )),
        Ok(root) => results.push(CheckResult::pass_with("root device", &root.display().to_string())),
        Err(e) => results.push(CheckResult::fail("root device", &e.to_string())),
    }

    if target.device.exists() {
        results.push(CheckResult::pass_with(
            "destination device",
            &target.device.display().to_string(),
        ));
    } else {
        results.push(CheckResult::fail(
            "destination device",
            &format!("{} not found - is the NVMe drive attached?", target.device.display()),
        ));
    }

    match resolve_boot_mount(config) {
        Ok(boot_mount) => {
            results.push(CheckResult::pass_with(
                "source boot partition",
                &boot_mount.display().to_string(),
            ));
            match boot_size_warning(config, &boot_mount) {
                Some(warning) => results.push(CheckResult::warn("boot partition size", &warning)),
                None => results.push(CheckResult::pass_with(
                    "boot partition size",
                    &format!("{} MiB", config.boot_size_mib),
                )),
            }
        }
        Err(e) => results.push(CheckResult::fail("source boot partition", &e.to_string())),
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(root: &Path) -> Config {
        Config {
            source_root: root.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_resolve_prefers_boot_firmware() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("boot/firmware")).unwrap();
        fs::write(dir.path().join("boot/firmware/cmdline.txt"), "root=x\n").unwrap();
        // Bookworm leaves a stub config.txt in /boot
        fs::write(dir.path().join("boot/config.txt"), "# moved\n").unwrap();

        let boot = resolve_boot_mount(&config_for(dir.path())).unwrap();
        assert_eq!(boot, PathBuf::from("/boot/firmware"));
    }

    #[test]
    fn test_resolve_falls_back_to_boot() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("boot")).unwrap();
        fs::write(dir.path().join("boot/cmdline.txt"), "root=x\n").unwrap();

        let boot = resolve_boot_mount(&config_for(dir.path())).unwrap();
        assert_eq!(boot, PathBuf::from("/boot"));
    }

    #[test]
    fn test_resolve_configured_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("firmware")).unwrap();
        let config = Config {
            source_boot: Some(PathBuf::from("/firmware")),
            ..config_for(dir.path())
        };
        assert_eq!(resolve_boot_mount(&config).unwrap(), PathBuf::from("/firmware"));
    }

    #[test]
    fn test_resolve_nothing_found() {
        let dir = TempDir::new().unwrap();
        let err = resolve_boot_mount(&config_for(dir.path())).unwrap_err();
        assert!(matches!(err, MigrateError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_directory_size_and_warning() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("boot/overlays")).unwrap();
        fs::write(dir.path().join("boot/kernel8.img"), vec![0u8; 4096]).unwrap();
        fs::write(dir.path().join("boot/overlays/a.dtbo"), vec![0u8; 1024]).unwrap();

        assert_eq!(directory_size(&dir.path().join("boot")), 5120);
        assert!(boot_size_warning(&config_for(dir.path()), Path::new("/boot")).is_none());

        let huge = Config {
            boot_size_mib: u64::MAX,
            ..config_for(dir.path())
        };
        assert!(boot_size_warning(&huge, Path::new("/boot")).is_none());
    }
}
