//! Host tool availability checks.

use crate::firmware::{EEPROM_CONFIG_TOOL, EEPROM_UPDATE_TOOL};
use crate::process::Host;

use super::types::CheckResult;

/// Tools the migration cannot run without, with the Debian package that
/// provides them.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("findmnt", "util-linux"),
    ("lsblk", "util-linux"),
    ("blkid", "util-linux"),
    ("mount", "mount"),
    ("umount", "mount"),
    ("parted", "parted"),
    ("partprobe", "parted"),
    ("mkfs.vfat", "dosfstools"),
    ("mkfs.ext4", "e2fsprogs"),
    ("rsync", "rsync"),
    (EEPROM_UPDATE_TOOL, "rpi-eeprom"),
    (EEPROM_CONFIG_TOOL, "rpi-eeprom"),
];

/// First required tool that is not on PATH.
pub fn first_missing(host: &dyn Host) -> Option<(&'static str, &'static str)> {
    REQUIRED_TOOLS
        .iter()
        .copied()
        .find(|(tool, _)| host.find_tool(tool).is_none())
}

/// Check every required tool, for the report.
pub fn check_host_tools(host: &dyn Host) -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, package)| match host.find_tool(tool) {
            Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
            None => CheckResult::fail(
                tool,
                &format!("Not found. Install '{}' package.", package),
            ),
        })
        .collect()
}
