//! rackctl - OpenRack firmware update CLI
//!
//! Operator front end for the firmware update orchestration engine:
//! version reporting, package updates and factory reset.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openrack_fwupdate::prelude::*;
use openrack_fwupdate::{BusctlBus, UpdateError};

use crate::output::{ConsolePrompt, ConsoleSink};

#[derive(Parser)]
#[command(name = "rackctl")]
#[command(about = "Update and inspect OpenRack appliance firmware")]
#[command(version)]
#[command(long_about = "
rackctl drives the OpenRack firmware update engine: it reports installed
firmware versions, applies signed update packages to the host and BMC
flash, and performs factory resets.

Updates are destructive maintenance operations: the chassis must be
powered off and the BMC reboots automatically at the end of a run.
")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print installed firmware version info
    Version,

    /// Update host and BMC firmware from a package file
    Update {
        /// Path to the firmware package
        file: PathBuf,

        /// Clean install: also restore manufacture default settings
        #[arg(short = 'r', long)]
        factory_reset: bool,

        /// Disable the flash access check/lock
        #[arg(short = 'l', long)]
        no_lock: bool,

        /// Disable digital signature verification
        #[arg(short = 's', long)]
        no_sign: bool,

        /// Don't ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Restore all settings to manufacture defaults and reboot
    FactoryReset {
        /// Disable the flash access check/lock
        #[arg(short = 'l', long)]
        no_lock: bool,

        /// Don't ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rackctl={log_level},openrack_fwupdate={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&cli) {
        output::print_error(&err);
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

    match &cli.command {
        Commands::Version => {
            let cfg = UpdateConfig::default();
            let bus = Arc::new(BusctlBus::new(runner.clone(), cfg.bus.clone()));
            let reporter = VersionReporter::new(cfg, runner, bus);
            for line in reporter.report(&ConsoleSink) {
                println!("{line}");
            }
            Ok(())
        }

        Commands::Update {
            file,
            factory_reset,
            no_lock,
            no_sign,
            yes,
        } => {
            let updater = build_updater(&runner, *no_lock, *no_sign, *yes, *factory_reset);
            updater.update(file)?;
            Ok(())
        }

        Commands::FactoryReset { no_lock, yes } => {
            let updater = build_updater(&runner, *no_lock, false, *yes, true);
            updater.factory_reset()?;
            Ok(())
        }
    }
}

fn build_updater(
    runner: &Arc<dyn CommandRunner>,
    no_lock: bool,
    no_sign: bool,
    yes: bool,
    clean_install: bool,
) -> Updater {
    let mut cfg = UpdateConfig::default();
    cfg.lock_enabled = !no_lock;
    if no_sign {
        cfg.verify = VerifyMode::Disabled;
    }
    let opts = InstallOptions {
        interactive: !yes,
        clean_install,
    };

    let bus = Arc::new(BusctlBus::new(runner.clone(), cfg.bus.clone()));
    Updater::new(
        cfg,
        opts,
        runner.clone(),
        bus,
        Arc::new(ConsoleSink),
        Arc::new(ConsolePrompt),
    )
}

/// Exit codes: 0 success, small positive codes per error kind, -1
/// (status 255) for a user abort or interrupt.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<UpdateError>() {
        Some(UpdateError::UserAborted) => -1,
        Some(UpdateError::LockUnavailable(_)) => 2,
        Some(UpdateError::VerificationFailed(_)) => 3,
        Some(UpdateError::PackageInvalid(_)) => 4,
        Some(UpdateError::HookFailed { .. }) => 5,
        Some(UpdateError::ExternalToolFailed { .. }) => 6,
        _ => 1,
    }
}
