//! Shared test utilities for nvme-migrate tests.
//!
//! `FakeHost` stands in for the Pi: every tool invocation is matched against
//! scripted rules and recorded, mounts are tracked so tests can assert that
//! nothing is left mounted, and sleeping is instant.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::rc::Rc;
use std::time::Duration;

use nvme_migrate::config::Config;
use nvme_migrate::confirm::Confirmer;
use nvme_migrate::process::{Cmd, CommandResult, Host};
use tempfile::TempDir;

pub const SD_ROOT_DEVICE: &str = "/dev/mmcblk0p2";
pub const BOOT_PARTUUID: &str = "5e3da3da-01";
pub const ROOT_PARTUUID: &str = "5e3da3da-02";

pub const SOURCE_FSTAB: &str = "proc            /proc           proc    defaults          0       0\n\
PARTUUID=4e639091-01  /boot/firmware  vfat    defaults          0       2\n\
PARTUUID=4e639091-02  /               ext4    defaults,noatime  0       1\n";

pub const SOURCE_CMDLINE: &str =
    "console=serial0,115200 console=tty1 root=PARTUUID=4e639091-02 rootfstype=ext4 fsck.repair=yes rootwait quiet\n";

pub const EEPROM_UP_TO_DATE: &str =
    "BOOTLOADER: up to date\n   CURRENT: Thu 18 Jan 2024\n    LATEST: Thu 18 Jan 2024\n";

/// Canned reply for a tool invocation.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Self {
            code,
            stderr: stderr.to_string(),
            ..Self::default()
        }
    }
}

type Script = Box<dyn Fn(&Cmd) -> Reply>;

struct Rule {
    pattern: String,
    script: Script,
}

/// Scripted [`Host`].
///
/// Rules match on a substring of the rendered command line. The most
/// recently added matching rule wins; unmatched commands succeed silently.
pub struct FakeHost {
    rules: Vec<Rule>,
    calls: RefCell<Vec<String>>,
    mounted: RefCell<Vec<PathBuf>>,
    slept: Cell<Duration>,
    pub privileged: bool,
    pub missing_tools: Vec<String>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: RefCell::new(Vec::new()),
            mounted: RefCell::new(Vec::new()),
            slept: Cell::new(Duration::ZERO),
            privileged: true,
            missing_tools: Vec::new(),
        }
    }

    pub fn reply(&mut self, pattern: &str, reply: Reply) -> &mut Self {
        self.script(pattern, move |_| reply.clone())
    }

    pub fn script(&mut self, pattern: &str, script: impl Fn(&Cmd) -> Reply + 'static) -> &mut Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            script: Box::new(script),
        });
        self
    }

    /// Every command line executed, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c == program || c.starts_with(&format!("{} ", program)))
            .collect()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.calls().iter().any(|c| c.contains(fragment))
    }

    /// Mount points currently mounted through this host.
    pub fn mounted(&self) -> Vec<PathBuf> {
        self.mounted.borrow().clone()
    }

    pub fn slept(&self) -> Duration {
        self.slept.get()
    }

    fn track_mounts(&self, cmd: &Cmd, reply: &Reply) {
        if reply.code != 0 {
            return;
        }
        let args = cmd.get_args();
        match cmd.program() {
            "mount" if args.len() == 2 => {
                self.mounted.borrow_mut().push(PathBuf::from(&args[1]));
            }
            "umount" => {
                if let Some(target) = args.last() {
                    let target = PathBuf::from(target);
                    self.mounted.borrow_mut().retain(|m| m != &target);
                }
            }
            _ => {}
        }
    }
}

impl Host for FakeHost {
    fn execute(&self, cmd: &Cmd) -> io::Result<CommandResult> {
        let line = cmd.to_string();
        self.calls.borrow_mut().push(line.clone());

        if self.missing_tools.iter().any(|t| t == cmd.program()) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }

        let reply = self
            .rules
            .iter()
            .rev()
            .find(|rule| line.contains(&rule.pattern))
            .map(|rule| (rule.script)(cmd))
            .unwrap_or_default();
        self.track_mounts(cmd, &reply);

        Ok(CommandResult {
            status: ExitStatus::from_raw(reply.code << 8),
            stdout: reply.stdout,
            stderr: reply.stderr,
        })
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn find_tool(&self, program: &str) -> Option<PathBuf> {
        if self.missing_tools.iter().any(|t| t == program) {
            None
        } else {
            Some(Path::new("/usr/bin").join(program))
        }
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
    }
}

/// Confirmer with a queue of answers; falls back to each question's default.
pub struct Scripted {
    answers: VecDeque<bool>,
    pub asked: Vec<String>,
}

impl Scripted {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            asked: Vec::new(),
        }
    }
}

impl Confirmer for Scripted {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        self.asked.push(question.to_string());
        self.answers.pop_front().unwrap_or(default)
    }
}

/// Copy the regular files directly inside `from` into `to`, overwriting.
fn copy_files(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_file() {
            fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
        }
    }
}

/// Test environment: a fake running system and a fake NVMe device node.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Root of the "running" system that gets cloned.
    pub source_root: PathBuf,
    /// Where the destination is "mounted".
    pub mount_root: PathBuf,
    /// Stand-in for /dev/nvme0n1.
    pub device: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let source_root = base.join("sd");
        let mount_root = base.join("mnt/nvme-migrate");
        let device = base.join("dev/nvme0n1");

        fs::create_dir_all(source_root.join("etc")).unwrap();
        fs::create_dir_all(source_root.join("boot/firmware/overlays")).unwrap();
        fs::write(source_root.join("etc/fstab"), SOURCE_FSTAB).unwrap();
        fs::write(source_root.join("etc/hostname"), "raspberrypi\n").unwrap();
        fs::write(source_root.join("boot/firmware/cmdline.txt"), SOURCE_CMDLINE).unwrap();
        fs::write(source_root.join("boot/firmware/config.txt"), "arm_64bit=1\n").unwrap();
        fs::write(source_root.join("boot/firmware/start4.elf"), "firmware").unwrap();
        fs::write(source_root.join("boot/firmware/overlays/README"), "overlays\n").unwrap();

        fs::create_dir_all(device.parent().unwrap()).unwrap();
        fs::write(&device, "").unwrap();

        Self {
            _temp_dir: temp_dir,
            source_root,
            mount_root,
            device,
        }
    }

    pub fn config(&self) -> Config {
        Config {
            device: self.device.clone(),
            mount_root: self.mount_root.clone(),
            source_root: self.source_root.clone(),
            settle_timeout: Duration::from_secs(2),
            settle_poll: Duration::from_millis(500),
            ..Config::default()
        }
    }

    pub fn boot_partition(&self) -> PathBuf {
        PathBuf::from(format!("{}p1", self.device.display()))
    }

    pub fn root_partition(&self) -> PathBuf {
        PathBuf::from(format!("{}p2", self.device.display()))
    }

    pub fn dest_fstab(&self) -> PathBuf {
        self.mount_root.join("etc/fstab")
    }

    pub fn dest_cmdline(&self) -> PathBuf {
        self.mount_root.join("boot/firmware/cmdline.txt")
    }

    /// A host that behaves like a Pi booted from SD with an empty NVMe
    /// drive attached and an up-to-date bootloader.
    pub fn pi_host(&self) -> FakeHost {
        let mut host = FakeHost::new();
        host.reply("findmnt", Reply::ok(&format!("{}\n", SD_ROOT_DEVICE)));
        host.reply("rpi-eeprom-update", Reply::ok(EEPROM_UP_TO_DATE));
        host.reply("lsblk", Reply::ok(&format!("{}\n", self.device.display())));

        let (boot, root) = (self.boot_partition(), self.root_partition());
        host.script("partprobe", move |_| {
            fs::write(&boot, "").unwrap();
            fs::write(&root, "").unwrap();
            Reply::ok("")
        });

        host.reply(
            &format!("-o value {}", self.boot_partition().display()),
            Reply::ok(&format!("{}\n", BOOT_PARTUUID)),
        );
        host.reply(
            &format!("-o value {}", self.root_partition().display()),
            Reply::ok(&format!("{}\n", ROOT_PARTUUID)),
        );

        // rsync "copies" by mirroring the directories the boot config step reads.
        let (src, dest) = (self.source_root.clone(), self.mount_root.clone());
        host.script("rsync -aHAXxW", move |_| {
            copy_files(&src.join("etc"), &dest.join("etc"));
            Reply::ok("")
        });
        let (src, dest) = (self.source_root.clone(), self.mount_root.clone());
        host.script("rsync -rtW", move |_| {
            copy_files(&src.join("boot/firmware"), &dest.join("boot/firmware"));
            Reply::ok("")
        });

        let eeprom = Rc::new(RefCell::new(
            "[all]\nBOOT_UART=0\nBOOT_ORDER=0xf41\n".to_string(),
        ));
        let current = Rc::clone(&eeprom);
        host.script("rpi-eeprom-config", move |_| Reply::ok(&current.borrow()));
        host.script("rpi-eeprom-config --apply", move |cmd| {
            let staged = &cmd.get_args()[1];
            *eeprom.borrow_mut() = fs::read_to_string(staged).unwrap();
            Reply::ok("Updating bootloader EEPROM\n")
        });

        host
    }
}
