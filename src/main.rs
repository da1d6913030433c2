//! nvme-migrate - move a Raspberry Pi from SD card boot to NVMe boot.
//!
//! Checks and updates the bootloader, partitions and formats the NVMe
//! drive, copies the running system onto it, points the copy's boot
//! configuration at the new partitions and sets the EEPROM boot order.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use nvme_migrate::config::{Config, SYSTEM_ENV_FILE};
use nvme_migrate::error::MigrationFailure;
use nvme_migrate::migrate;
use nvme_migrate::process::LinuxHost;
use nvme_migrate::{confirm, preflight, signal};

#[derive(Parser)]
#[command(name = "nvme-migrate")]
#[command(version)]
#[command(about = "Migrate a running Raspberry Pi from SD card to NVMe boot")]
#[command(
    after_help = "QUICK START:\n  nvme-migrate check   Check the system is ready\n  sudo nvme-migrate    Run the migration\n  nvme-migrate config  Show effective configuration\n\nConfiguration is read from NVME_MIGRATE_* variables, /etc/nvme-migrate.env and .env."
)]
struct Cli {
    /// Answer yes to every confirmation, including erasing the device
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all preflight checks and print a report, without changing anything
    Check,
    /// Show the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Files only fill in what the environment does not set.
    dotenvy::from_path(SYSTEM_ENV_FILE).ok();
    dotenvy::dotenv().ok();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Some(Commands::Check) => cmd_check(&config),
        Some(Commands::Config) => {
            config.print();
            Ok(())
        }
        None => return cmd_migrate(&config, cli.yes),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_check(config: &Config) -> Result<()> {
    let report = preflight::run_checks(&LinuxHost, config);
    report.print();

    if !report.all_passed() {
        anyhow::bail!(
            "{} check(s) failed. Fix the issues above before migrating.",
            report.fail_count()
        );
    }
    println!("All preflight checks passed!");
    Ok(())
}

fn cmd_migrate(config: &Config, assume_yes: bool) -> ExitCode {
    signal::install_handler();
    let mut confirmer = confirm::select(assume_yes);

    println!("nvme-migrate: {} -> {}", config.source_root.display(), config.device.display());

    match migrate::run(&LinuxHost, config, confirmer.as_mut()) {
        // Early exits are not failures.
        Ok(_) => ExitCode::SUCCESS,
        Err(failure) => {
            print_failure(&failure);
            ExitCode::FAILURE
        }
    }
}

fn print_failure(failure: &MigrationFailure) {
    eprintln!("\nError: {}", failure);

    let mut source = std::error::Error::source(&failure.error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }

    if let Some(output) = failure.error.tool_output() {
        eprintln!("\nTool output:");
        for line in output.lines() {
            eprintln!("  {}", line);
        }
    }

    if !failure.backups.is_empty() {
        eprintln!("\nBackups written on the NVMe device before the failure:");
        for backup in &failure.backups {
            eprintln!("  {}", backup.display());
        }
    }
}
