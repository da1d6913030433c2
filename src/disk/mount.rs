//! Scoped mounts.
//!
//! A [`MountSession`] unmounts itself when dropped, so every exit path
//! (success, `?` unwinding, interrupt) leaves the destination unmounted.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MigrateError;
use crate::process::{Cmd, CommandFailure, Host};

pub struct MountSession<'h> {
    host: &'h dyn Host,
    device: PathBuf,
    mount_point: PathBuf,
    mounted: bool,
}

impl<'h> MountSession<'h> {
    /// Mount `device` at `mount_point`, creating the directory if needed.
    pub fn mount(
        host: &'h dyn Host,
        device: &Path,
        mount_point: &Path,
    ) -> Result<Self, MigrateError> {
        fs::create_dir_all(mount_point)
            .map_err(|e| MigrateError::io("failed to create mount point", mount_point, e))?;

        Cmd::new("mount")
            .arg_path(device)
            .arg_path(mount_point)
            .run_with(host)
            .map_err(|source| MigrateError::Mount {
                device: device.to_path_buf(),
                mount_point: mount_point.to_path_buf(),
                source,
            })?;

        println!("  Mounted {} at {}", device.display(), mount_point.display());
        Ok(Self {
            host,
            device: device.to_path_buf(),
            mount_point: mount_point.to_path_buf(),
            mounted: true,
        })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Unmount now. Falls back to a lazy unmount if the filesystem is busy.
    pub fn unmount(&mut self) -> Result<(), CommandFailure> {
        if !self.mounted {
            return Ok(());
        }
        let result = Cmd::new("umount").arg_path(&self.mount_point).run_with(self.host);
        if let Err(busy) = result {
            println!(
                "  Warning: {} is busy, detaching lazily",
                self.mount_point.display()
            );
            Cmd::new("umount")
                .arg("-l")
                .arg_path(&self.mount_point)
                .run_with(self.host)
                .map_err(|_| busy)?;
        }
        self.mounted = false;
        println!("  Unmounted {}", self.mount_point.display());
        Ok(())
    }
}

impl Drop for MountSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            eprintln!(
                "  Warning: could not unmount {}: {} (run: umount {})",
                self.mount_point.display(),
                e,
                self.mount_point.display()
            );
        }
    }
}

/// Nested mounts, released innermost first.
#[derive(Default)]
pub struct MountStack<'h> {
    sessions: Vec<MountSession<'h>>,
}

impl<'h> MountStack<'h> {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }

    pub fn push(&mut self, session: MountSession<'h>) {
        self.sessions.push(session);
    }

    /// Mount point of the outermost session.
    pub fn root(&self) -> Option<&Path> {
        self.sessions.first().map(|s| s.mount_point())
    }

    pub fn mount_points(&self) -> Vec<PathBuf> {
        self.sessions
            .iter()
            .map(|s| s.mount_point().to_path_buf())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Unmount everything in reverse order, reporting the first failure.
    pub fn release(&mut self) -> Result<(), CommandFailure> {
        let mut first_error = None;
        while let Some(mut session) = self.sessions.pop() {
            if let Err(e) = session.unmount() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for MountStack<'_> {
    fn drop(&mut self) {
        // Vec drops front to back; nested mounts must go first.
        while let Some(session) = self.sessions.pop() {
            drop(session);
        }
    }
}
