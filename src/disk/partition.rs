//! Partitioning and formatting of the destination device.

use std::path::PathBuf;
use std::time::Duration;

use super::{MigrationTarget, FIRST_PARTITION_START_MIB};
use crate::confirm::Confirmer;
use crate::error::MigrateError;
use crate::process::{Cmd, Host};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOutcome {
    Completed,
    /// Operator declined; the device was not touched.
    Declined,
}

/// Mount points of anything on `device` that is currently mounted.
pub fn mounted_partitions(host: &dyn Host, target: &MigrationTarget) -> Vec<PathBuf> {
    let result = Cmd::new("lsblk")
        .args(["-nrpo", "NAME,MOUNTPOINT"])
        .arg_path(&target.device)
        .run_with(host);

    match result {
        Ok(result) => parse_lsblk_mountpoints(&result.stdout),
        Err(e) => {
            println!("  Warning: could not list partitions: {}", e);
            Vec::new()
        }
    }
}

/// Parse `lsblk -nrpo NAME,MOUNTPOINT` output.
///
/// Raw mode escapes spaces in mount points as `\x20`.
pub fn parse_lsblk_mountpoints(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _name = fields.next()?;
            let mountpoint = fields.next()?;
            if mountpoint.starts_with('[') {
                // [SWAP]
                return None;
            }
            Some(PathBuf::from(mountpoint.replace("\\x20", " ")))
        })
        .collect()
}

/// Best-effort unmount of everything mounted from the target device.
pub fn unmount_existing(host: &dyn Host, target: &MigrationTarget) {
    for mountpoint in mounted_partitions(host, target) {
        println!("  Unmounting {}", mountpoint.display());
        if let Err(e) = Cmd::new("umount").arg_path(&mountpoint).run_with(host) {
            println!("  Warning: {}", e);
        }
    }
}

/// Wipe the partition table and create the boot and root partitions.
///
/// Requires the operator to confirm by device name. Nothing is modified if
/// they decline.
pub fn partition(
    host: &dyn Host,
    target: &MigrationTarget,
    confirmer: &mut dyn Confirmer,
    settle_timeout: Duration,
    settle_poll: Duration,
) -> Result<PartitionOutcome, MigrateError> {
    println!(
        "  All data on {} will be destroyed.",
        target.device.display()
    );
    let question = format!("Erase {} and create new partitions?", target.device.display());
    if !confirmer.confirm(&question, false) {
        return Ok(PartitionOutcome::Declined);
    }

    unmount_existing(host, target);

    let boot_start = format!("{}MiB", FIRST_PARTITION_START_MIB);
    let boot_end = format!("{}MiB", target.boot_end_mib());
    let steps: [Vec<&str>; 4] = [
        vec!["mklabel", "gpt"],
        vec!["mkpart", target.boot_label.as_str(), "fat32", boot_start.as_str(), boot_end.as_str()],
        vec!["set", "1", "boot", "on"],
        vec!["mkpart", target.root_label.as_str(), "ext4", boot_end.as_str(), "100%"],
    ];

    println!("  Writing GPT partition table to {}...", target.device.display());
    for step in steps {
        Cmd::new("parted")
            .arg("-s")
            .arg_path(&target.device)
            .args(step)
            .run_with(host)
            .map_err(|source| MigrateError::Partition {
                device: target.device.clone(),
                source,
            })?;
    }

    if let Err(e) = Cmd::new("partprobe").arg_path(&target.device).run_with(host) {
        println!("  Warning: {}", e);
    }
    // udevadm is not always installed; the poll below is what counts.
    let _ = Cmd::new("udevadm").arg("settle").output_with(host);

    wait_for_partitions(host, target, settle_timeout, settle_poll)?;
    println!(
        "  Created {} ({} MiB) and {}",
        target.boot_partition.display(),
        target.boot_size_mib,
        target.root_partition.display()
    );
    Ok(PartitionOutcome::Completed)
}

/// Poll until both partition nodes exist or `timeout` has been spent waiting.
pub fn wait_for_partitions(
    host: &dyn Host,
    target: &MigrationTarget,
    timeout: Duration,
    poll: Duration,
) -> Result<(), MigrateError> {
    let mut waited = Duration::ZERO;
    loop {
        if target.boot_partition.exists() && target.root_partition.exists() {
            return Ok(());
        }
        if waited >= timeout {
            return Err(MigrateError::PartitionVerification {
                boot: target.boot_partition.clone(),
                root: target.root_partition.clone(),
                timeout_secs: timeout.as_secs(),
            });
        }
        let step = poll.min(timeout - waited).max(Duration::from_millis(1));
        host.sleep(step);
        waited += step;
    }
}

/// Create the boot (FAT32) and root (ext4) filesystems.
///
/// A failure leaves the device partitioned but unformatted; the run stops
/// and is not retried.
pub fn format(host: &dyn Host, target: &MigrationTarget) -> Result<(), MigrateError> {
    println!(
        "  Formatting {} as FAT32 ({})...",
        target.boot_partition.display(),
        target.boot_label
    );
    Cmd::new("mkfs.vfat")
        .args(["-F", "32", "-n", target.boot_label.as_str()])
        .arg_path(&target.boot_partition)
        .run_with(host)
        .map_err(|source| MigrateError::Format {
            partition: target.boot_partition.clone(),
            source,
        })?;

    println!(
        "  Formatting {} as ext4 ({})...",
        target.root_partition.display(),
        target.root_label
    );
    Cmd::new("mkfs.ext4")
        .args(["-F", "-q", "-L", target.root_label.as_str()])
        .arg_path(&target.root_partition)
        .run_with(host)
        .map_err(|source| MigrateError::Format {
            partition: target.root_partition.clone(),
            source,
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lsblk_mountpoints() {
        let output = "/dev/nvme0n1\n\
                      /dev/nvme0n1p1 /media/pi/bootfs\n\
                      /dev/nvme0n1p2 /media/pi/my\\x20disk\n\
                      /dev/nvme0n1p3 [SWAP]\n";
        assert_eq!(
            parse_lsblk_mountpoints(output),
            vec![
                PathBuf::from("/media/pi/bootfs"),
                PathBuf::from("/media/pi/my disk"),
            ]
        );
    }

    #[test]
    fn test_parse_lsblk_nothing_mounted() {
        assert!(parse_lsblk_mountpoints("/dev/nvme0n1\n").is_empty());
        assert!(parse_lsblk_mountpoints("").is_empty());
    }
}
