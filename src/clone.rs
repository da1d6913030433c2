//! Copy the running system onto the destination partitions.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::disk::{MigrationTarget, MountSession, MountStack};
use crate::error::MigrateError;
use crate::process::{Cmd, Host};

/// Paths never copied from the live root. Patterns ending in `/*` keep the
/// directory itself so it exists as a mount point on the destination.
pub const ROOT_EXCLUDES: &[&str] = &[
    "/proc/*",
    "/sys/*",
    "/dev/*",
    "/tmp/*",
    "/run/*",
    "/mnt/*",
    "/media/*",
    "/lost+found",
    "/var/log/*",
    "/var/tmp/*",
    "/var/swap",
];

/// rsync exit code for source files that vanished mid-copy. Logs and caches
/// on a running root do this routinely.
pub const RSYNC_VANISHED: i32 = 24;

/// `boot_mount` (e.g. `/boot/firmware`) as seen from inside `root`.
pub fn boot_dir_under(root: &Path, boot_mount: &Path) -> PathBuf {
    root.join(boot_mount.strip_prefix("/").unwrap_or(boot_mount))
}

/// Full exclude list for the root copy.
pub fn root_excludes(boot_mount: &Path, mount_root: &Path) -> Vec<String> {
    let mut excludes: Vec<String> = ROOT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.push(format!("{}/*", boot_mount.display()));
    if !mount_root.starts_with("/mnt") && !mount_root.starts_with("/media") {
        excludes.push(mount_root.display().to_string());
    }
    excludes
}

/// rsync treats `dir/` as "contents of dir".
fn contents_of(path: &Path) -> String {
    let s = path.display().to_string();
    if s.ends_with('/') {
        s
    } else {
        format!("{}/", s)
    }
}

/// Mount the destination and copy the live root and boot contents onto it.
///
/// The returned mounts stay up for the boot-config rewrite; dropping them
/// (including on any error here) unmounts both.
pub fn clone<'h>(
    host: &'h dyn Host,
    config: &Config,
    target: &MigrationTarget,
    boot_mount: &Path,
) -> Result<MountStack<'h>, MigrateError> {
    let dest_root = config.mount_root.clone();
    let dest_boot = boot_dir_under(&dest_root, boot_mount);
    let source_boot = boot_dir_under(&config.source_root, boot_mount);

    let mut mounts = MountStack::new();
    mounts.push(MountSession::mount(host, &target.root_partition, &dest_root)?);
    mounts.push(MountSession::mount(host, &target.boot_partition, &dest_boot)?);

    println!(
        "  Copying {} to {} (this can take a while)...",
        config.source_root.display(),
        dest_root.display()
    );
    let mut root_copy = Cmd::new("rsync")
        .args(["-aHAXxW", "--numeric-ids", "--info=progress2"])
        .streaming();
    for exclude in root_excludes(boot_mount, &config.mount_root) {
        root_copy = root_copy.arg(format!("--exclude={}", exclude));
    }
    let root_copy = root_copy
        .arg(contents_of(&config.source_root))
        .arg(contents_of(&dest_root));
    let result = root_copy
        .output_with(host)
        .map_err(|source| MigrateError::Copy {
            what: "root filesystem",
            source,
        })?;
    match result.code() {
        0 => {}
        RSYNC_VANISHED => {
            println!("  Warning: files changed on the live system during the copy:");
            for line in result.combined().lines() {
                println!("    {}", line);
            }
        }
        _ => {
            return Err(MigrateError::Copy {
                what: "root filesystem",
                source: root_copy.failure(&result),
            })
        }
    }

    println!(
        "  Copying {} to {}...",
        source_boot.display(),
        dest_boot.display()
    );
    // FAT has no owners or permissions and 2 second timestamps.
    Cmd::new("rsync")
        .args(["-rtW", "--modify-window=1"])
        .arg(contents_of(&source_boot))
        .arg(contents_of(&dest_boot))
        .run_with(host)
        .map_err(|source| MigrateError::Copy {
            what: "boot partition",
            source,
        })?;

    Ok(mounts)
}
