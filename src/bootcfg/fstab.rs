//! Line-oriented `/etc/fstab` editing.
//!
//! Entries are parsed into fields so matching is done on the mount point
//! and device, not on text patterns. Lines that are not touched are written
//! back byte-for-byte.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub spec: String,
    pub mountpoint: String,
    pub fstype: String,
    pub options: String,
    pub dump: u32,
    pub pass: u32,
}

impl FstabEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 3 {
            return None;
        }
        Some(Self {
            spec: fields[0].to_string(),
            mountpoint: fields[1].to_string(),
            fstype: fields[2].to_string(),
            options: fields.get(3).unwrap_or(&"defaults").to_string(),
            dump: fields.get(4).and_then(|v| v.parse().ok()).unwrap_or(0),
            pass: fields.get(5).and_then(|v| v.parse().ok()).unwrap_or(0),
        })
    }

    pub fn partuuid(partuuid: &str, mountpoint: &str, fstype: &str, options: &str, pass: u32) -> Self {
        Self {
            spec: format!("PARTUUID={}", partuuid),
            mountpoint: mountpoint.to_string(),
            fstype: fstype.to_string(),
            options: options.to_string(),
            dump: 0,
            pass,
        }
    }

    fn has_spec(&self, spec: &str) -> bool {
        self.spec.eq_ignore_ascii_case(spec)
    }
}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}  {}  {}  {}  {}",
            self.spec, self.mountpoint, self.fstype, self.options, self.dump, self.pass
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { entry: FstabEntry, raw: String },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fstab {
    lines: Vec<Line>,
}

impl Fstab {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| match FstabEntry::parse(raw) {
                Some(entry) => Line::Entry {
                    entry,
                    raw: raw.to_string(),
                },
                None => Line::Other(raw.to_string()),
            })
            .collect();
        Self { lines }
    }

    pub fn entries(&self) -> impl Iterator<Item = &FstabEntry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { entry, .. } => Some(entry),
            Line::Other(_) => None,
        })
    }

    /// Active entry mounting `spec` at `mountpoint`.
    pub fn contains(&self, spec: &str, mountpoint: &str) -> bool {
        self.entries()
            .any(|e| e.has_spec(spec) && e.mountpoint == mountpoint)
    }

    /// Comment out active entries mounted at any of `mountpoints`, except
    /// those whose device is in `keep`. Returns how many were disabled.
    pub fn comment_out(&mut self, mountpoints: &[&str], keep: &[String]) -> usize {
        let mut count = 0;
        for line in &mut self.lines {
            let Line::Entry { entry, raw } = line else {
                continue;
            };
            if !mountpoints.contains(&entry.mountpoint.as_str()) {
                continue;
            }
            if keep.iter().any(|spec| entry.has_spec(spec)) {
                continue;
            }
            *line = Line::Other(format!("#{}", raw));
            count += 1;
        }
        count
    }

    pub fn push(&mut self, entry: FstabEntry) {
        let raw = entry.to_string();
        self.lines.push(Line::Entry { entry, raw });
    }

    pub fn push_comment(&mut self, comment: &str) {
        self.lines.push(Line::Other(format!("# {}", comment)));
    }
}

impl fmt::Display for Fstab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                Line::Entry { raw, .. } => writeln!(f, "{}", raw)?,
                Line::Other(raw) => writeln!(f, "{}", raw)?,
            }
        }
        Ok(())
    }
}

/// Summary of an fstab rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FstabChanges {
    pub commented: usize,
    pub appended: usize,
}

/// Point `/` and `boot_mount` at the destination partitions.
///
/// Running this twice yields the same table: destination entries are
/// recognised and neither commented out nor appended again.
pub fn rewrite_fstab(
    text: &str,
    root_partuuid: &str,
    boot_partuuid: &str,
    boot_mount: &str,
) -> (String, FstabChanges) {
    let mut fstab = Fstab::parse(text);
    let root_spec = format!("PARTUUID={}", root_partuuid);
    let boot_spec = format!("PARTUUID={}", boot_partuuid);

    let mut changes = FstabChanges {
        commented: fstab.comment_out(&["/", boot_mount], &[root_spec.clone(), boot_spec.clone()]),
        appended: 0,
    };

    let root_missing = !fstab.contains(&root_spec, "/");
    let boot_missing = !fstab.contains(&boot_spec, boot_mount);
    if root_missing || boot_missing {
        fstab.push_comment("NVMe partitions (nvme-migrate)");
    }
    if root_missing {
        fstab.push(FstabEntry::partuuid(root_partuuid, "/", "ext4", "defaults,noatime", 1));
        changes.appended += 1;
    }
    if boot_missing {
        fstab.push(FstabEntry::partuuid(boot_partuuid, boot_mount, "vfat", "defaults", 2));
        changes.appended += 1;
    }

    (fstab.to_string(), changes)
}
