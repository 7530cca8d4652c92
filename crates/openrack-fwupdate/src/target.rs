//! Firmware targets
//!
//! The appliance carries two coupled images: the host system flash and the
//! management controller flash. Their handling rules differ (see the
//! sequencer), but package layout conventions are shared.

use serde::{Deserialize, Serialize};

/// One of the two flashable firmware images in an update package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirmwareTarget {
    /// Host system flash image (PNOR)
    Host,
    /// Management controller flash image
    Management,
}

impl FirmwareTarget {
    /// Expected image file name inside the unpacked package.
    pub fn image_file(self) -> &'static str {
        match self {
            FirmwareTarget::Host => "host.pnor",
            FirmwareTarget::Management => "image-bmc",
        }
    }

    /// Name of the optional customization sub-archive for this target.
    pub fn bundle_name(self) -> &'static str {
        match self {
            FirmwareTarget::Host => "host.update",
            FirmwareTarget::Management => "bmc.update",
        }
    }

    /// Operator-facing label.
    pub fn label(self) -> &'static str {
        match self {
            FirmwareTarget::Host => "Host",
            FirmwareTarget::Management => "BMC",
        }
    }
}

impl std::fmt::Display for FirmwareTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_conventions() {
        assert_eq!(FirmwareTarget::Host.image_file(), "host.pnor");
        assert_eq!(FirmwareTarget::Host.bundle_name(), "host.update");
        assert_eq!(FirmwareTarget::Management.image_file(), "image-bmc");
        assert_eq!(FirmwareTarget::Management.bundle_name(), "bmc.update");
    }

    #[test]
    fn test_target_display() {
        assert_eq!(format!("{}", FirmwareTarget::Host), "Host");
        assert_eq!(format!("{}", FirmwareTarget::Management), "BMC");
    }
}
