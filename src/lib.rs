//! nvme-migrate library exports.
//!
//! The binary is a thin CLI over `migrate::run`; everything that touches
//! the system goes through `process::Host` so integration tests can script
//! the tools.

pub mod bootcfg;
pub mod clone;
pub mod common;
pub mod config;
pub mod confirm;
pub mod disk;
pub mod error;
pub mod firmware;
pub mod migrate;
pub mod preflight;
pub mod process;
pub mod report;
pub mod signal;
pub mod timing;
