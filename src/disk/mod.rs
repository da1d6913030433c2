//! Destination device layout, partitioning and mounts.

mod mount;
mod partition;

pub use mount::{MountSession, MountStack};
pub use partition::{
    format, mounted_partitions, parse_lsblk_mountpoints, partition, unmount_existing,
    wait_for_partitions, PartitionOutcome,
};

use std::path::{Path, PathBuf};

use crate::config::Config;

pub const BOOT_FILESYSTEM: &str = "vfat";
pub const ROOT_FILESYSTEM: &str = "ext4";

/// Start of the first partition, for 1 MiB alignment.
pub const FIRST_PARTITION_START_MIB: u64 = 1;

/// The destination device and the partitions the migration creates on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget {
    pub device: PathBuf,
    pub boot_partition: PathBuf,
    pub root_partition: PathBuf,
    pub boot_label: String,
    pub root_label: String,
    pub boot_size_mib: u64,
}

impl MigrationTarget {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device: config.device.clone(),
            boot_partition: partition_path(&config.device, 1),
            root_partition: partition_path(&config.device, 2),
            boot_label: config.boot_label.clone(),
            root_label: config.root_label.clone(),
            boot_size_mib: config.boot_size_mib,
        }
    }

    /// End of the boot partition, where the root partition begins.
    pub fn boot_end_mib(&self) -> u64 {
        FIRST_PARTITION_START_MIB.saturating_add(self.boot_size_mib)
    }

    /// True if `device` is this disk or one of its partitions.
    pub fn owns(&self, device: &Path) -> bool {
        if device == self.device {
            return true;
        }
        let disk = self.device.to_string_lossy();
        let candidate = device.to_string_lossy();
        let Some(rest) = candidate.strip_prefix(disk.as_ref()) else {
            return false;
        };
        let number = if disk.ends_with(|c: char| c.is_ascii_digit()) {
            match rest.strip_prefix('p') {
                Some(n) => n,
                None => return false,
            }
        } else {
            rest
        };
        !number.is_empty() && number.chars().all(|c| c.is_ascii_digit())
    }
}

/// Kernel name of partition `number` on `device`.
///
/// Disks whose name ends in a digit (`nvme0n1`, `mmcblk0`) get a `p`
/// separator; others (`sda`) do not.
pub fn partition_path(device: &Path, number: u32) -> PathBuf {
    let name = device.to_string_lossy();
    if name.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{}p{}", name, number))
    } else {
        PathBuf::from(format!("{}{}", name, number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_path() {
        assert_eq!(
            partition_path(Path::new("/dev/nvme0n1"), 2),
            PathBuf::from("/dev/nvme0n1p2")
        );
        assert_eq!(
            partition_path(Path::new("/dev/mmcblk0"), 1),
            PathBuf::from("/dev/mmcblk0p1")
        );
        assert_eq!(partition_path(Path::new("/dev/sda"), 1), PathBuf::from("/dev/sda1"));
    }

    #[test]
    fn test_target_from_config() {
        let target = MigrationTarget::from_config(&Config::default());
        assert_eq!(target.boot_partition, PathBuf::from("/dev/nvme0n1p1"));
        assert_eq!(target.root_partition, PathBuf::from("/dev/nvme0n1p2"));
        assert_eq!(target.boot_end_mib(), 513);
    }

    #[test]
    fn test_boot_end_does_not_overflow() {
        let target = MigrationTarget::from_config(&Config {
            boot_size_mib: u64::MAX,
            ..Config::default()
        });
        assert_eq!(target.boot_end_mib(), u64::MAX);
    }

    #[test]
    fn test_owns() {
        let target = MigrationTarget::from_config(&Config::default());
        assert!(target.owns(Path::new("/dev/nvme0n1")));
        assert!(target.owns(Path::new("/dev/nvme0n1p2")));
        assert!(!target.owns(Path::new("/dev/nvme0n10")));
        assert!(!target.owns(Path::new("/dev/nvme0n1px")));
        assert!(!target.owns(Path::new("/dev/mmcblk0p2")));

        let sda = MigrationTarget::from_config(&Config {
            device: PathBuf::from("/dev/sda"),
            ..Config::default()
        });
        assert!(sda.owns(Path::new("/dev/sda2")));
        assert!(!sda.owns(Path::new("/dev/sdb1")));
    }
}
