//! Boot configuration rewrite on the cloned system.
//!
//! After the clone the destination still says "boot from the SD card".
//! This module points its `fstab` and `cmdline.txt` at the destination
//! PARTUUIDs, keeping `.bak` copies of both files as the only way back.

mod backup;
mod cmdline;
mod fstab;

pub use backup::{backup_file, backup_path, protect};
pub use cmdline::{rewrite_cmdline, root_argument};
pub use fstab::{rewrite_fstab, Fstab, FstabChanges, FstabEntry};

use std::fs;
use std::path::{Path, PathBuf};

use crate::disk::MigrationTarget;
use crate::error::MigrateError;
use crate::process::{Cmd, Host};

pub const CMDLINE_FILE: &str = "cmdline.txt";

/// Everything the rewrite changed, for the final report.
#[derive(Debug, Clone)]
pub struct BootConfigChanges {
    pub root_partuuid: String,
    pub boot_partuuid: String,
    pub fstab: PathBuf,
    pub fstab_backup: PathBuf,
    pub fstab_changes: FstabChanges,
    pub cmdline: PathBuf,
    pub cmdline_backup: PathBuf,
}

/// Stable partition identifier of `partition`.
pub fn partuuid(host: &dyn Host, partition: &Path) -> Result<String, MigrateError> {
    let result = Cmd::new("blkid")
        .args(["-s", "PARTUUID", "-o", "value"])
        .arg_path(partition)
        .run_with(host)
        .map_err(|source| MigrateError::PartuuidLookup {
            partition: partition.to_path_buf(),
            source: Some(source),
        })?;

    let value = result.stdout_trimmed();
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(MigrateError::PartuuidLookup {
            partition: partition.to_path_buf(),
            source: None,
        });
    }
    Ok(value.to_string())
}

/// `cmdline.txt` on the destination boot partition: directly in it, or in
/// the nested `firmware/` directory some images use.
pub fn find_cmdline(dest_boot: &Path) -> Result<PathBuf, MigrateError> {
    let searched = vec![
        dest_boot.join(CMDLINE_FILE),
        dest_boot.join("firmware").join(CMDLINE_FILE),
    ];
    match searched.iter().find(|p| p.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(MigrateError::ConfigNotFound {
            what: CMDLINE_FILE,
            searched,
        }),
    }
}

fn read(path: &Path) -> Result<String, MigrateError> {
    fs::read_to_string(path).map_err(|e| MigrateError::io("failed to read", path, e))
}

fn write(path: &Path, content: &str) -> Result<(), MigrateError> {
    fs::write(path, content).map_err(|e| MigrateError::io("failed to write", path, e))
}

/// Rewrite `fstab` and `cmdline.txt` on the mounted destination.
///
/// `dest_root` and `dest_boot` are where the destination partitions are
/// mounted; `boot_mount` is the boot path as seen by the booted system.
/// Every backup written is pushed onto `backups` before the file it
/// protects is modified, so a failure part-way still reports it. Backups
/// copied over from the source are replaced unless the file already points
/// at the destination.
pub fn rewrite_boot_config(
    host: &dyn Host,
    target: &MigrationTarget,
    dest_root: &Path,
    dest_boot: &Path,
    boot_mount: &Path,
    backups: &mut Vec<PathBuf>,
) -> Result<BootConfigChanges, MigrateError> {
    let root_partuuid = partuuid(host, &target.root_partition)?;
    let boot_partuuid = partuuid(host, &target.boot_partition)?;
    println!("  Root PARTUUID: {}", root_partuuid);
    println!("  Boot PARTUUID: {}", boot_partuuid);

    let fstab = dest_root.join("etc/fstab");
    if !fstab.is_file() {
        return Err(MigrateError::ConfigNotFound {
            what: "fstab",
            searched: vec![fstab],
        });
    }
    let root_spec = format!("PARTUUID={}", root_partuuid);
    let fstab_text = read(&fstab)?;
    let fstab_backup = protect(&fstab, Fstab::parse(&fstab_text).contains(&root_spec, "/"))?;
    backups.push(fstab_backup.clone());

    let boot_mount = boot_mount.to_string_lossy();
    let (content, fstab_changes) =
        rewrite_fstab(&fstab_text, &root_partuuid, &boot_partuuid, &boot_mount);
    write(&fstab, &content)?;
    println!(
        "  {}: {} entries disabled, {} added",
        fstab.display(),
        fstab_changes.commented,
        fstab_changes.appended
    );

    let cmdline = find_cmdline(dest_boot)?;
    let original = read(&cmdline)?;
    let cmdline_rewritten =
        root_argument(&original).is_some_and(|r| r.eq_ignore_ascii_case(&root_spec));
    let cmdline_backup = protect(&cmdline, cmdline_rewritten)?;
    backups.push(cmdline_backup.clone());

    let rewritten = rewrite_cmdline(&original, &root_partuuid);
    write(&cmdline, &rewritten)?;
    println!(
        "  {}: root={} -> root=PARTUUID={}",
        cmdline.display(),
        root_argument(&original).unwrap_or("<none>"),
        root_partuuid
    );

    Ok(BootConfigChanges {
        root_partuuid,
        boot_partuuid,
        fstab,
        fstab_backup,
        fstab_changes,
        cmdline,
        cmdline_backup,
    })
}
