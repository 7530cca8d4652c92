//! Convenience re-exports for downstream crates

pub use crate::config::{BusNames, InstallOptions, UpdateConfig};
pub use crate::error::{Result, UpdateError};
pub use crate::exec::{CommandRunner, SystemRunner};
pub use crate::hooks::PreInstallOutcome;
pub use crate::progress::{AssumeYes, ProgressSink, Prompt, TracingSink};
pub use crate::sequencer::Updater;
pub use crate::signature::VerifyMode;
pub use crate::sysbus::{BusctlBus, SystemBus};
pub use crate::target::FirmwareTarget;
pub use crate::version::VersionReporter;
