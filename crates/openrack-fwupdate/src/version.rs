//! Firmware version reporting
//!
//! The host firmware version lives in a flash partition, so reading it
//! needs the same hardware guard as an update. A small persisted record
//! avoids that cost on every query: when present it is authoritative, and
//! it is only regenerated by an explicit hardware read when absent. The
//! management firmware version comes from the host OS release metadata and
//! is never cached.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::UpdateConfig;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::lock::FlashLock;
use crate::manifest;
use crate::progress::ProgressSink;
use crate::sysbus::SystemBus;

/// Sentinel reported when no version can be determined
pub const VERSION_UNAVAILABLE: &str = "N/A";

/// Version query surface
pub struct VersionReporter {
    cfg: UpdateConfig,
    runner: Arc<dyn CommandRunner>,
    bus: Arc<dyn SystemBus>,
}

impl VersionReporter {
    /// Create a reporter over the given seams.
    pub fn new(
        cfg: UpdateConfig,
        runner: Arc<dyn CommandRunner>,
        bus: Arc<dyn SystemBus>,
    ) -> Self {
        Self { cfg, runner, bus }
    }

    /// Last-known host firmware version record.
    ///
    /// Cached record if present; otherwise a direct hardware read under
    /// the flash access guard, written back to the cache best-effort.
    /// Never fails: an unreadable version is reported as `["N/A"]`.
    pub fn host_version(&self, sink: &dyn ProgressSink) -> Vec<String> {
        if let Some(record) = load_record(&self.cfg.version_cache) {
            debug!("host version served from cache");
            return record;
        }

        match self.read_hardware_version(sink) {
            Ok(lines) if !lines.is_empty() => {
                store_record(&self.cfg.version_cache, &lines);
                lines
            }
            Ok(_) => vec![VERSION_UNAVAILABLE.to_string()],
            Err(err) => {
                warn!(%err, "host firmware version read failed");
                vec![VERSION_UNAVAILABLE.to_string()]
            }
        }
    }

    /// Management firmware version from the OS release metadata.
    pub fn management_version(&self) -> String {
        let id = manifest::read_tag(&self.cfg.os_release, "VERSION_ID")
            .ok()
            .flatten()
            .or_else(|| {
                manifest::read_tag(&self.cfg.os_release, "VERSION")
                    .ok()
                    .flatten()
            });
        id.unwrap_or_else(|| VERSION_UNAVAILABLE.to_string())
    }

    /// Full report: host record lines followed by the management version.
    pub fn report(&self, sink: &dyn ProgressSink) -> Vec<String> {
        let mut lines = self.host_version(sink);
        lines.push(format!("BMC: {}", self.management_version()));
        lines
    }

    fn read_hardware_version(&self, sink: &dyn ProgressSink) -> Result<Vec<String>> {
        // The flash hardware must not be touched while anything else could
        // be using it, even for a read.
        let lock = FlashLock::new(self.runner.clone(), self.bus.clone());
        let _guard = lock.acquire(&self.cfg, sink)?;

        std::fs::create_dir_all(&self.cfg.scratch_dir)?;
        let readout = self.cfg.scratch_dir.join("VERSION.part");
        let readout_arg = readout.display().to_string();
        let args = ["-P", "VERSION", "-r", readout_arg.as_str()];
        self.runner
            .output(&self.cfg.pflash, &args)?
            .expect_success(&format!("{} -P VERSION -r", self.cfg.pflash))?;

        let content = std::fs::read_to_string(&readout).unwrap_or_default();
        if let Err(err) = std::fs::remove_file(&readout) {
            debug!(%err, "version readout cleanup failed");
        }

        Ok(content
            .lines()
            .map(|l| l.trim_matches('\0').trim())
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}

fn load_record(cache: &Path) -> Option<Vec<String>> {
    let raw = std::fs::read_to_string(cache).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Best-effort cache write: this path is advisory only and must never turn
/// a successful read into a failure.
fn store_record(cache: &Path, lines: &[String]) {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = cache.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(lines)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(cache, json)
    };
    if let Err(err) = write() {
        warn!(%err, cache = %cache.display(), "version cache write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_record_roundtrip() -> std::io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let cache = tmp.path().join("nested").join("version.json");
        let lines = vec!["BIOS: 1.2.3".to_string(), "BMC: 9.9".to_string()];

        assert_eq!(load_record(&cache), None);
        store_record(&cache, &lines);
        assert_eq!(load_record(&cache), Some(lines));
        Ok(())
    }

    #[test]
    fn test_load_record_rejects_malformed_cache() -> std::io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let cache = tmp.path().join("version.json");
        std::fs::write(&cache, "not json")?;
        assert_eq!(load_record(&cache), None);
        Ok(())
    }
}
