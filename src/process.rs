//! Centralized command execution with consistent error handling.
//!
//! Every external tool the migration touches (parted, rsync, blkid, the
//! EEPROM tools) is described by a [`Cmd`] and executed through a [`Host`].
//! The real host spawns processes; tests substitute a scripted host so no
//! privileged tool ever runs.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string (empty for streaming commands).
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// Stdout and stderr joined, for error reports and output parsing.
    pub fn combined(&self) -> String {
        match (self.stdout_trimmed(), self.stderr_trimmed()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// A command that could not be run, or exited non-zero.
#[derive(Debug, Clone, thiserror::Error)]
#[error("`{command}` {reason}")]
pub struct CommandFailure {
    /// The command line, for display.
    pub command: String,
    /// What went wrong ("exited with code 1", "could not be started: ...").
    pub reason: String,
    /// Captured output of the tool, if any.
    pub output: String,
}

/// Description of an external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    /// Inherit stdout so long-running tools can show progress.
    streaming: bool,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            streaming: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Let stdout go straight to the terminal; stderr is still captured.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Run on `host` and return the result whatever the exit code.
    ///
    /// Only a failure to start the program is an error.
    pub fn output_with(&self, host: &dyn Host) -> Result<CommandResult, CommandFailure> {
        host.execute(self).map_err(|e| CommandFailure {
            command: self.to_string(),
            reason: format!("could not be started: {}. Is it installed?", e),
            output: String::new(),
        })
    }

    /// Run on `host`, failing on a non-zero exit with the captured output.
    pub fn run_with(&self, host: &dyn Host) -> Result<CommandResult, CommandFailure> {
        let result = self.output_with(host)?;
        if !result.success() {
            return Err(self.failure(&result));
        }
        Ok(result)
    }

    /// Failure describing a non-zero exit of this command.
    pub fn failure(&self, result: &CommandResult) -> CommandFailure {
        CommandFailure {
            command: self.to_string(),
            reason: format!("exited with code {}", result.code()),
            output: result.combined(),
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// The machine the migration runs on.
///
/// Commands, privilege and tool lookup, and waiting all go through this
/// trait so the orchestration can be exercised without touching real disks.
pub trait Host {
    /// Execute `cmd`, capturing output. Non-zero exits are not errors here.
    fn execute(&self, cmd: &Cmd) -> io::Result<CommandResult>;

    /// True when running with an effective uid of 0.
    fn is_privileged(&self) -> bool;

    /// Resolve `program` on PATH.
    fn find_tool(&self, program: &str) -> Option<PathBuf>;

    /// Block the current thread.
    fn sleep(&self, duration: Duration);
}

/// [`Host`] backed by the running Linux system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxHost;

impl Host for LinuxHost {
    fn execute(&self, cmd: &Cmd) -> io::Result<CommandResult> {
        let mut command = Command::new(cmd.program());
        command.args(cmd.get_args());
        command.stdin(Stdio::inherit());
        command.stderr(Stdio::piped());
        if cmd.is_streaming() {
            command.stdout(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped());
        }

        if let Some(dir) = cmd.current_dir() {
            command.current_dir(dir);
        }

        let output = command.output()?;
        Ok(CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn is_privileged(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }

    fn find_tool(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// =============================================================================
// Tests
// =============================================================================
