//! Firmware update orchestration for OpenRack appliances
//!
//! This crate coordinates an atomic-ish, fail-safe in-field update of the
//! two coupled flash images on an appliance: the host system flash (PNOR)
//! and the management controller's own flash. It guarantees that:
//!
//! - the flash hardware is never written while anything else could be
//!   touching it (advisory lock, flashing-tool liveness check, chassis
//!   power gate, mediation daemon suspension);
//! - untrusted packages are never applied (manifest/key/signature chain
//!   against the host's provisioned trust roots);
//! - a failure at any stage leaves the machine diagnosable and
//!   recoverable, never bricked.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`sequencer`]: the top-level update and factory-reset state machine
//! - [`lock`]: exclusive flash access guard
//! - [`signature`]: chain-of-trust signature verification
//! - [`hooks`]: vendor customization hook protocol
//! - [`version`]: firmware version reporting with a persisted cache
//! - [`package`]: scratch directory and archive extraction
//! - [`partition`]: host flash partition table parsing
//! - [`sysbus`]: system-bus boundary (power state, units, mediation daemon)
//! - [`exec`]: external command execution seam
//! - [`progress`]: step reporting and operator interaction seams
//! - [`config`]: explicit engine configuration
//! - [`error`]: error types
//!
//! # Failure policy
//!
//! Every error is unrecoverable for the current run: the sequence aborts,
//! the flash access guard unwinds, the operator gets a per-step audit
//! trail. The
//! engine never retries and never rolls back a write already issued to the
//! flash tool: flashing tools are expected to be crash-safe for their own
//! partition, and recovery is an operator re-run.
//!
//! # Compatibility note
//!
//! The factory-reset sequence discovers the partitions to erase from the
//! live partition table (reprovision flag) instead of a fixed list. New
//! host generations with different flag semantics must be validated before
//! this tool is pointed at them.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod exec;
pub mod hooks;
pub mod lock;
pub mod manifest;
pub mod package;
pub mod partition;
pub mod prelude;
pub mod progress;
pub mod sequencer;
pub mod signature;
pub mod sysbus;
pub mod target;
pub mod version;

pub use config::{BusNames, InstallOptions, UpdateConfig};
pub use error::{Result, UpdateError};
pub use exec::{CmdOutput, CommandRunner, SystemRunner};
pub use hooks::{CustomizationHooks, PreInstallOutcome};
pub use lock::{FlashGuard, FlashLock};
pub use package::Scratch;
pub use partition::{PnorPartition, parse_partition_table, parts_to_clear};
pub use progress::{AssumeYes, ProgressSink, Prompt, TracingSink, with_task};
pub use sequencer::Updater;
pub use signature::{Verifier, VerifyMode};
pub use sysbus::{BusctlBus, MediatorState, PowerState, SystemBus};
pub use target::FirmwareTarget;
pub use version::{VERSION_UNAVAILABLE, VersionReporter};
