//! Shared utilities.

pub mod files;

pub use files::{sha256_file, write_file_with_dirs};
