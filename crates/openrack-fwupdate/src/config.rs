//! Engine configuration
//!
//! All paths, tool names and policy switches are explicit values threaded
//! through constructors. Nothing in the engine reads process-wide mutable
//! state, so tests can run differently-configured engines side by side.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::signature::VerifyMode;

/// Well-known bus names used by the production [`crate::sysbus::BusctlBus`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusNames {
    /// Chassis state service
    pub chassis_service: String,
    /// Chassis state object path
    pub chassis_path: String,
    /// Chassis state interface
    pub chassis_iface: String,
    /// Flash mediation daemon service
    pub mediator_service: String,
    /// Flash mediation daemon object path
    pub mediator_path: String,
    /// Flash mediation daemon control interface
    pub mediator_iface: String,
}

impl Default for BusNames {
    fn default() -> Self {
        Self {
            chassis_service: "xyz.openbmc_project.State.Chassis".to_string(),
            chassis_path: "/xyz/openbmc_project/state/chassis0".to_string(),
            chassis_iface: "xyz.openbmc_project.State.Chassis".to_string(),
            mediator_service: "xyz.openbmc_project.Hiomapd".to_string(),
            mediator_path: "/xyz/openbmc_project/Hiomapd".to_string(),
            mediator_iface: "xyz.openbmc_project.Hiomapd.Control".to_string(),
        }
    }
}

/// Static engine configuration: fixed paths, tool names and policy switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Advisory lock file guarding flash access
    pub lock_file: PathBuf,
    /// Scratch directory, recreated on every run
    pub scratch_dir: PathBuf,
    /// Persisted host firmware version record
    pub version_cache: PathBuf,
    /// Directory the management image is staged into for the next boot
    pub staging_dir: PathBuf,
    /// Allow-list file inside the staging directory, truncated on clean install
    pub allowlist_file: String,
    /// Host OS release metadata
    pub os_release: PathBuf,
    /// Provisioned trust root: one subdirectory per key type
    pub trust_root: PathBuf,

    /// Flash tool executable
    pub pflash: String,
    /// Process name checked for conflicting flash access
    pub flash_tool_name: String,
    /// Reboot command
    pub reboot_cmd: String,

    /// Unit inhibiting management-controller reboots while locked
    pub reboot_guard_enable: String,
    /// Unit releasing the reboot inhibit
    pub reboot_guard_disable: String,
    /// One-shot unit marking the writable management partition for clean
    /// regeneration on the next boot
    pub factory_reset_unit: String,

    /// Well-known bus names
    pub bus: BusNames,

    /// Signature verification strategy
    pub verify: VerifyMode,
    /// Master switch for the flash access guard (operator override)
    pub lock_enabled: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from("/var/lock/fwupdate.lock"),
            scratch_dir: PathBuf::from("/tmp/fwupdate"),
            version_cache: PathBuf::from("/var/cache/fwupdate/version.json"),
            staging_dir: PathBuf::from("/run/initramfs"),
            allowlist_file: "whitelist".to_string(),
            os_release: PathBuf::from("/etc/os-release"),
            trust_root: PathBuf::from("/etc/activationdata"),
            pflash: "pflash".to_string(),
            flash_tool_name: "pflash".to_string(),
            reboot_cmd: "/sbin/reboot".to_string(),
            reboot_guard_enable: "reboot-guard-enable.service".to_string(),
            reboot_guard_disable: "reboot-guard-disable.service".to_string(),
            factory_reset_unit: "obmc-flash-bmc-setenv@openbmconce\\x3dfactory\\x2dreset.service"
                .to_string(),
            bus: BusNames::default(),
            verify: VerifyMode::default(),
            lock_enabled: true,
        }
    }
}

/// Per-invocation install options
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Ask the operator for confirmation before destructive sequences
    pub interactive: bool,
    /// Clean/factory install: discard persisted configuration
    pub clean_install: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            interactive: true,
            clean_install: false,
        }
    }
}
