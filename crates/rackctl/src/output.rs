//! Console output for the operator
//!
//! Each sequencer step is rendered as a fixed-width task line:
//!
//! ```text
//! Unpack firmware package...              [ OK ]
//! ```

use std::io::Write;

use colored::Colorize;
use openrack_fwupdate::{ProgressSink, Prompt, Result, UpdateError};

/// Column the status marker is aligned to
const STATUS_COLUMN: usize = 40;

/// [`ProgressSink`] printing task lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn task_started(&self, title: &str) {
        let dotted = format!("{title}...");
        print!("{dotted:<width$}", width = STATUS_COLUMN);
        if let Err(err) = std::io::stdout().flush() {
            tracing::debug!(%err, "stdout flush failed");
        }
    }

    fn task_done(&self, _title: &str) {
        println!("[{}]", " OK ".green());
    }

    fn task_failed(&self, _title: &str) {
        println!("[{}]", "FAIL".red());
    }

    fn note(&self, message: &str) {
        println!("{message}");
    }
}

/// Interactive confirmation with the attention banner
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        let banner = "**************************************";
        println!("{}", banner.red().bold());
        println!("{}", "*             ATTENTION!             *".red().bold());
        println!("{}", banner.red().bold());
        println!("{message}");

        dialoguer::Confirm::new()
            .with_prompt("Do you want to continue?")
            .default(false)
            .interact()
            .map_err(|_| UpdateError::UserAborted)
    }
}

/// Print a run-aborting error in the operator's face color.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{}", format!("{err:#}").red());
}
