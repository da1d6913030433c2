//! Kernel command line (`cmdline.txt`) editing.

pub const ROOTWAIT: &str = "rootwait";

/// Point `root=` at the destination root partition.
///
/// Only the first `root=` argument is replaced; everything else is kept in
/// order. `rootwait` is appended when missing because the NVMe device may
/// enumerate later than the SD card did.
pub fn rewrite_cmdline(text: &str, root_partuuid: &str) -> String {
    let root_arg = format!("root=PARTUUID={}", root_partuuid);
    let mut args: Vec<String> = text.split_whitespace().map(str::to_string).collect();

    match args.iter().position(|a| a.starts_with("root=")) {
        Some(index) => args[index] = root_arg,
        None => args.push(root_arg),
    }

    if !args.iter().any(|a| a == ROOTWAIT) {
        args.push(ROOTWAIT.to_string());
    }

    // The firmware only reads the first line.
    format!("{}\n", args.join(" "))
}

/// Value of the first `root=` argument.
pub fn root_argument(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find_map(|a| a.strip_prefix("root="))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI_OS_CMDLINE: &str = "console=serial0,115200 console=tty1 root=PARTUUID=4e639091-02 rootfstype=ext4 fsck.repair=yes rootwait quiet splash\n";

    #[test]
    fn test_replaces_root_keeps_everything_else() {
        let out = rewrite_cmdline(PI_OS_CMDLINE, "abcd-02");
        assert_eq!(
            out,
            "console=serial0,115200 console=tty1 root=PARTUUID=abcd-02 rootfstype=ext4 fsck.repair=yes rootwait quiet splash\n"
        );
    }

    #[test]
    fn test_appends_rootwait_when_missing() {
        let out = rewrite_cmdline("console=tty1 root=/dev/mmcblk0p2 quiet", "abcd-02");
        assert_eq!(out, "console=tty1 root=PARTUUID=abcd-02 quiet rootwait\n");
    }

    #[test]
    fn test_only_first_root_replaced() {
        let out = rewrite_cmdline("root=/dev/a root=/dev/b rootwait", "x");
        assert_eq!(out, "root=PARTUUID=x root=/dev/b rootwait\n");
    }

    #[test]
    fn test_adds_root_when_absent() {
        let out = rewrite_cmdline("console=tty1\n", "x");
        assert_eq!(out, "console=tty1 root=PARTUUID=x rootwait\n");
    }

    #[test]
    fn test_rootfstype_is_not_root() {
        let out = rewrite_cmdline("rootfstype=ext4 root=/dev/sda2", "x");
        assert_eq!(out, "rootfstype=ext4 root=PARTUUID=x rootwait\n");
    }

    #[test]
    fn test_rewrite_twice_is_stable() {
        let once = rewrite_cmdline(PI_OS_CMDLINE, "abcd-02");
        assert_eq!(rewrite_cmdline(&once, "abcd-02"), once);
    }

    #[test]
    fn test_root_argument() {
        assert_eq!(root_argument(PI_OS_CMDLINE), Some("PARTUUID=4e639091-02"));
        assert_eq!(root_argument("quiet"), None);
    }
}
