//! `.bak` copies of configuration files.
//!
//! The clone copies any `.bak` the source system already had, so an existing
//! backup only counts as the original when the file it sits next to has
//! already been rewritten for this destination. Otherwise it is replaced.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MigrateError;

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to `path.bak`, replacing whatever backup was there.
pub fn backup_file(path: &Path) -> Result<PathBuf, MigrateError> {
    let backup = backup_path(path);
    if backup.exists() {
        println!("  Replacing stale backup {}", backup.display());
    }
    fs::copy(path, &backup).map_err(|e| MigrateError::io("failed to back up", path, e))?;
    println!("  Backed up {} to {}", path.display(), backup.display());
    Ok(backup)
}

/// Back up `path` before it is modified.
///
/// `rewritten` says the file already points at the destination, in which
/// case an existing backup holds the pre-migration content and is kept.
pub fn protect(path: &Path, rewritten: bool) -> Result<PathBuf, MigrateError> {
    let backup = backup_path(path);
    if rewritten && backup.is_file() {
        println!("  Keeping existing backup {}", backup.display());
        return Ok(backup);
    }
    backup_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/mnt/x/etc/fstab")),
            PathBuf::from("/mnt/x/etc/fstab.bak")
        );
        assert_eq!(
            backup_path(Path::new("/boot/cmdline.txt")),
            PathBuf::from("/boot/cmdline.txt.bak")
        );
    }

    #[test]
    fn test_backup_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("fstab");
        fs::write(&file, b"proc /proc proc defaults 0 0\n").unwrap();

        let backup = backup_file(&file).unwrap();
        assert_eq!(fs::read(&backup).unwrap(), fs::read(&file).unwrap());
    }

    #[test]
    fn test_stale_backup_is_replaced() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cmdline.txt");
        fs::write(&file, "current\n").unwrap();
        fs::write(backup_path(&file), "old backup from the source\n").unwrap();

        let backup = protect(&file, false).unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "current\n");
    }

    #[test]
    fn test_backup_of_rewritten_file_is_kept() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cmdline.txt");
        fs::write(&file, "original\n").unwrap();
        protect(&file, false).unwrap();

        fs::write(&file, "rewritten\n").unwrap();
        let backup = protect(&file, true).unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "original\n");
    }

    #[test]
    fn test_rewritten_without_backup_still_backs_up() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("fstab");
        fs::write(&file, "rewritten\n").unwrap();

        let backup = protect(&file, true).unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "rewritten\n");
    }

    #[test]
    fn test_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let err = backup_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, MigrateError::Io { .. }));
    }
}
