//! System-bus boundary: chassis power state, systemd units and the flash
//! mediation daemon
//!
//! The engine never links a bus library; it talks to the system bus through
//! `busctl`, keeping the whole control flow synchronous. The [`SystemBus`]
//! trait is the seam the flash access guard and sequencer are tested
//! against.

use std::sync::Arc;

use tracing::debug;

use crate::config::BusNames;
use crate::error::Result;
use crate::exec::CommandRunner;

/// Chassis power state as reported by the state service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerState {
    /// Chassis is powered off; flash access is safe
    Off,
    /// Chassis is powered on
    On,
    /// Any other reported state, carried verbatim
    Other(String),
}

/// Flash mediation daemon state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediatorState {
    /// Daemon is idle and may be suspended
    Idle,
    /// Daemon is already suspended
    Suspended,
    /// Any other reported state
    Other(u8),
}

impl MediatorState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => MediatorState::Idle,
            1 => MediatorState::Suspended,
            other => MediatorState::Other(other),
        }
    }
}

/// Seam for the IPC boundary used by the flash access guard and sequencer
pub trait SystemBus {
    /// Query the chassis power state.
    ///
    /// # Errors
    ///
    /// Returns an error when the state service cannot be reached; the
    /// flash guard treats that as "state cannot be determined" and fails
    /// closed.
    fn chassis_power_state(&self) -> Result<PowerState>;

    /// Start a systemd unit (fire and forget, `replace` mode).
    ///
    /// # Errors
    ///
    /// Returns an error when the unit cannot be started.
    fn start_unit(&self, unit: &str) -> Result<()>;

    /// Query the flash mediation daemon state.
    ///
    /// # Errors
    ///
    /// Returns an error when the daemon cannot be reached.
    fn mediator_state(&self) -> Result<MediatorState>;

    /// Suspend the flash mediation daemon.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails; callers must check the state
    /// first and never force-suspend.
    fn mediator_suspend(&self) -> Result<()>;

    /// Resume the flash mediation daemon.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails.
    fn mediator_resume(&self) -> Result<()>;
}

/// Production [`SystemBus`] shelling out to `busctl`
pub struct BusctlBus {
    runner: Arc<dyn CommandRunner>,
    names: BusNames,
}

impl BusctlBus {
    /// Create a bus client using the given runner and well-known names.
    pub fn new(runner: Arc<dyn CommandRunner>, names: BusNames) -> Self {
        Self { runner, names }
    }

    fn get_property(&self, service: &str, path: &str, iface: &str, prop: &str) -> Result<String> {
        let args = ["get-property", service, path, iface, prop];
        let command = format!("busctl get-property {service} {path} {iface} {prop}");
        let out = self.runner.output("busctl", &args)?.expect_success(&command)?;
        debug!(property = %prop, reply = %out.trim(), "busctl property read");
        Ok(out)
    }
}

/// Parse a `busctl get-property` string reply of the form `s "Value"`.
///
/// Returns the last dot-separated component so enum-typed properties like
/// `xyz.openbmc_project.State.Chassis.PowerState.Off` collapse to `Off`.
pub(crate) fn parse_string_reply(reply: &str) -> Option<String> {
    let rest = reply.trim().strip_prefix("s ")?;
    let unquoted = rest.trim().trim_matches('"');
    let last = unquoted.rsplit('.').next().unwrap_or(unquoted);
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

/// Parse a `busctl get-property` byte reply of the form `y 0`.
pub(crate) fn parse_byte_reply(reply: &str) -> Option<u8> {
    let rest = reply.trim().strip_prefix("y ")?;
    rest.trim().parse().ok()
}

impl SystemBus for BusctlBus {
    fn chassis_power_state(&self) -> Result<PowerState> {
        let reply = self.get_property(
            &self.names.chassis_service,
            &self.names.chassis_path,
            &self.names.chassis_iface,
            "CurrentPowerState",
        )?;

        Ok(match parse_string_reply(&reply).as_deref() {
            Some("Off") => PowerState::Off,
            Some("On") => PowerState::On,
            Some(other) => PowerState::Other(other.to_string()),
            None => PowerState::Other(reply.trim().to_string()),
        })
    }

    fn start_unit(&self, unit: &str) -> Result<()> {
        let args = [
            "call",
            "org.freedesktop.systemd1",
            "/org/freedesktop/systemd1",
            "org.freedesktop.systemd1.Manager",
            "StartUnit",
            "ss",
            unit,
            "replace",
        ];
        let command = format!("busctl call systemd1 StartUnit {unit} replace");
        self.runner
            .output("busctl", &args)?
            .expect_success(&command)?;
        Ok(())
    }

    fn mediator_state(&self) -> Result<MediatorState> {
        let reply = self.get_property(
            &self.names.mediator_service,
            &self.names.mediator_path,
            &self.names.mediator_iface,
            "DaemonState",
        )?;

        let raw = parse_byte_reply(&reply).unwrap_or(u8::MAX);
        Ok(MediatorState::from_raw(raw))
    }

    fn mediator_suspend(&self) -> Result<()> {
        let args = [
            "call",
            self.names.mediator_service.as_str(),
            self.names.mediator_path.as_str(),
            self.names.mediator_iface.as_str(),
            "Suspend",
        ];
        self.runner
            .output("busctl", &args)?
            .expect_success("busctl call Suspend")?;
        Ok(())
    }

    fn mediator_resume(&self) -> Result<()> {
        let args = [
            "call",
            self.names.mediator_service.as_str(),
            self.names.mediator_path.as_str(),
            self.names.mediator_iface.as_str(),
            "Resume",
            "b",
            "true",
        ];
        self.runner
            .output("busctl", &args)?
            .expect_success("busctl call Resume")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_reply_collapses_enum_path() {
        let reply = "s \"xyz.openbmc_project.State.Chassis.PowerState.Off\"\n";
        assert_eq!(parse_string_reply(reply).as_deref(), Some("Off"));
    }

    #[test]
    fn test_parse_string_reply_plain_value() {
        assert_eq!(parse_string_reply("s \"On\"").as_deref(), Some("On"));
    }

    #[test]
    fn test_parse_string_reply_rejects_other_types() {
        assert_eq!(parse_string_reply("y 0"), None);
        assert_eq!(parse_string_reply(""), None);
    }

    #[test]
    fn test_parse_byte_reply() {
        assert_eq!(parse_byte_reply("y 0\n"), Some(0));
        assert_eq!(parse_byte_reply("y 2"), Some(2));
        assert_eq!(parse_byte_reply("s \"Off\""), None);
    }

    #[test]
    fn test_mediator_state_from_raw() {
        assert_eq!(MediatorState::from_raw(0), MediatorState::Idle);
        assert_eq!(MediatorState::from_raw(1), MediatorState::Suspended);
        assert_eq!(MediatorState::from_raw(9), MediatorState::Other(9));
    }
}
