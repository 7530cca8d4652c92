//! The update sequencer
//!
//! Top-level state machine for one operator-initiated run: unpack, verify,
//! lock, pre-install, write, post-install, reboot for both firmware
//! targets, plus the separate factory-reset sequence. The host image is
//! always written before the management image, because the management
//! write ends in an unconditional reboot that would discard a pending host
//! write. Both writes happen inside a single lock acquisition; the engine
//! performs no internal resume logic, recovery from a mid-sequence crash
//! is an operator re-run.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::{InstallOptions, UpdateConfig};
use crate::error::{Result, UpdateError};
use crate::exec::CommandRunner;
use crate::hooks::{CustomizationHooks, PreInstallOutcome};
use crate::lock::FlashLock;
use crate::manifest;
use crate::package::Scratch;
use crate::partition::parts_to_clear;
use crate::progress::{ProgressSink, Prompt, with_task};
use crate::signature::{MANIFEST_FILE, Verifier};
use crate::target::FirmwareTarget;

/// Host OS release tag naming the machine this build targets
const MACHINE_TAG: &str = "OPENRACK_TARGET_MACHINE";

/// Orchestrates complete update and factory-reset runs
pub struct Updater {
    cfg: UpdateConfig,
    opts: InstallOptions,
    runner: Arc<dyn CommandRunner>,
    bus: Arc<dyn crate::sysbus::SystemBus>,
    lock: FlashLock,
    sink: Arc<dyn ProgressSink>,
    prompt: Arc<dyn Prompt>,
}

impl Updater {
    /// Create a sequencer over the given seams.
    pub fn new(
        cfg: UpdateConfig,
        opts: InstallOptions,
        runner: Arc<dyn CommandRunner>,
        bus: Arc<dyn crate::sysbus::SystemBus>,
        sink: Arc<dyn ProgressSink>,
        prompt: Arc<dyn Prompt>,
    ) -> Self {
        let lock = FlashLock::new(runner.clone(), bus.clone());
        Self {
            cfg,
            opts,
            runner,
            bus,
            lock,
            sink,
            prompt,
        }
    }

    /// Run the full two-target update sequence from a package file.
    ///
    /// # Errors
    ///
    /// Any verification, lock or external-tool failure aborts the whole
    /// sequence; no hardware write happens for a target whose checks did
    /// not pass. See the crate documentation for the failure policy.
    pub fn update(&self, package: &Path) -> Result<()> {
        if !package.is_file() {
            return Err(UpdateError::PackageInvalid(format!(
                "firmware package file not found: {}",
                package.display()
            )));
        }

        self.confirm_update()?;

        let scratch = with_task(self.sink.as_ref(), "Prepare scratch directory", || {
            Scratch::recreate(&self.cfg.scratch_dir, self.runner.clone())
        })?;
        with_task(self.sink.as_ref(), "Unpack firmware package", || {
            scratch.unpack(package)
        })?;

        let host_image = scratch.file(FirmwareTarget::Host.image_file())?;
        let mgmt_image = scratch.file(FirmwareTarget::Management.image_file())?;

        let mut verifier = Verifier::new(
            self.runner.clone(),
            self.cfg.verify.clone(),
            self.cfg.trust_root.clone(),
        );
        if verifier.enabled() {
            with_task(
                self.sink.as_ref(),
                "Check signature of firmware package",
                || verifier.system_level_verify(scratch.dir()),
            )?;
            self.check_machine_type(&scratch)?;
            for image in [&host_image, &mgmt_image] {
                let name = image
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                with_task(
                    self.sink.as_ref(),
                    &format!("Check signature of {name}"),
                    || verifier.verify(image),
                )?;
            }
        }

        let host_hooks = CustomizationHooks::prepare(
            &scratch,
            FirmwareTarget::Host,
            &verifier,
            self.sink.as_ref(),
        )?;
        let mgmt_hooks = CustomizationHooks::prepare(
            &scratch,
            FirmwareTarget::Management,
            &verifier,
            self.sink.as_ref(),
        )?;

        // One guard bracket covers both writes: host first, management
        // last, since its default path ends in the reboot.
        let _guard = self.lock.acquire(&self.cfg, self.sink.as_ref())?;

        self.install_host(&scratch, &host_image, &host_hooks)?;
        self.install_management(&mgmt_image, &mgmt_hooks)?;

        Ok(())
    }

    /// Erase reprovisionable flash partitions and schedule a clean
    /// regeneration of the management side, then reboot.
    ///
    /// The partition set is discovered from the live partition table, not
    /// hard-coded; hosts of a different generation advertise their own
    /// reprovision flags.
    ///
    /// # Errors
    ///
    /// Same failure policy as [`Updater::update`].
    pub fn factory_reset(&self) -> Result<()> {
        if self.opts.interactive {
            let message = "All settings will be restored to manufacture default values.\n\
                           The BMC system will be rebooted automatically to apply changes.";
            if !self.prompt.confirm(message)? {
                return Err(UpdateError::UserAborted);
            }
        }

        {
            let _guard = self.lock.acquire(&self.cfg, self.sink.as_ref())?;

            let listing = with_task(self.sink.as_ref(), "Read flash partition table", || {
                let args = ["-i"];
                self.runner
                    .output(&self.cfg.pflash, &args)?
                    .expect_success(&format!("{} -i", self.cfg.pflash))
            })?;

            let partitions = parts_to_clear(&listing);
            if partitions.is_empty() {
                self.sink.note("No partitions found on the host flash!");
            }
            for part in &partitions {
                let kind = if part.ecc { "ECC" } else { "Erase" };
                with_task(
                    self.sink.as_ref(),
                    &format!("Clear {} partition [{kind}]", part.name),
                    || {
                        let args = ["-P", part.name.as_str(), part.clear_flag(), "-f"];
                        self.runner
                            .output(&self.cfg.pflash, &args)?
                            .expect_success(&format!(
                                "{} -P {} {} -f",
                                self.cfg.pflash,
                                part.name,
                                part.clear_flag()
                            ))?;
                        Ok(())
                    },
                )?;
            }

            with_task(self.sink.as_ref(), "Enable the BMC clean", || {
                self.bus.start_unit(&self.cfg.factory_reset_unit)
            })?;
            self.clear_allowlist()?;
        }

        self.reboot()
    }

    fn confirm_update(&self) -> Result<()> {
        if !self.opts.interactive {
            return Ok(());
        }
        let mut message = String::from("Host and BMC firmware will be updated.\n");
        if self.opts.clean_install {
            message.push_str("All settings will be restored to manufacture default values.\n");
        }
        message.push_str(
            "The BMC system will be rebooted automatically to apply changes.\n\
             Please do not turn off the server during update!",
        );
        if !self.prompt.confirm(&message)? {
            return Err(UpdateError::UserAborted);
        }
        Ok(())
    }

    /// Compare the package's target machine against the running system.
    ///
    /// Old platform builds do not expose a machine name; the check is
    /// skipped with a note in that case.
    fn check_machine_type(&self, scratch: &Scratch) -> Result<()> {
        let current = manifest::read_tag(&self.cfg.os_release, MACHINE_TAG)
            .ok()
            .flatten();
        let Some(current) = current else {
            self.sink
                .note("WARNING: Current machine name is undefined, the check is skipped.");
            return Ok(());
        };

        with_task(self.sink.as_ref(), "Check target machine type", || {
            let manifest_file = scratch.file(MANIFEST_FILE)?;
            let target = manifest::require_tag(&manifest_file, "MachineName")?;
            if target != current {
                return Err(UpdateError::PackageInvalid(format!(
                    "package is built for machine type {target}, this system is {current}"
                )));
            }
            Ok(())
        })
    }

    fn install_host(
        &self,
        scratch: &Scratch,
        image: &Path,
        hooks: &CustomizationHooks,
    ) -> Result<()> {
        let outcome =
            hooks.pre_install(&self.runner, FirmwareTarget::Host, image, self.opts)?;
        match outcome {
            PreInstallOutcome::AlreadyApplied => {
                debug!("host write performed by pre-install hook");
            }
            PreInstallOutcome::NotApplied => self.write_host(scratch, image)?,
        }
        hooks.post_install(&self.runner)?;
        Ok(())
    }

    /// Default host write: preserve NVRAM, program the image, restore
    /// NVRAM. A clean install intentionally discards the NVRAM contents.
    fn write_host(&self, scratch: &Scratch, image: &Path) -> Result<()> {
        let nvram = scratch.dir().join("nvram.bin");
        let mut preserved = false;

        if !self.opts.clean_install {
            let read_back = with_task(self.sink.as_ref(), "Preserve NVRAM configuration", || {
                let nvram_arg = nvram.display().to_string();
                let args = ["-P", "NVRAM", "-r", nvram_arg.as_str()];
                self.runner
                    .output(&self.cfg.pflash, &args)?
                    .expect_success(&format!("{} -P NVRAM -r", self.cfg.pflash))?;
                if !nvram.is_file() {
                    return Err(UpdateError::PackageInvalid(
                        "NVRAM readout was not created".to_string(),
                    ));
                }
                Ok(())
            });
            match read_back {
                Ok(()) => preserved = true,
                Err(_) => {
                    self.sink
                        .note("NOTE: Preserving NVRAM failed, default settings will be used.");
                }
            }
        }

        // The programming pass may run for minutes; stream the tool's own
        // progress output instead of capturing it.
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.sink.note(&format!("Writing {name} ..."));
        let image_arg = image.display().to_string();
        let args = ["-f", "-E", "-p", image_arg.as_str()];
        let status = self.runner.status(&self.cfg.pflash, &args)?;
        if status != 0 {
            return Err(UpdateError::tool(
                format!("{} -f -E -p {name}", self.cfg.pflash),
                status,
                "see the flash tool output above",
            ));
        }

        if preserved && nvram.is_file() {
            with_task(self.sink.as_ref(), "Recover NVRAM configuration", || {
                let nvram_arg = nvram.display().to_string();
                let args = ["-f", "-e", "-P", "NVRAM", "-p", nvram_arg.as_str()];
                self.runner
                    .output(&self.cfg.pflash, &args)?
                    .expect_success(&format!("{} -f -e -P NVRAM -p", self.cfg.pflash))?;
                Ok(())
            })?;
        }

        Ok(())
    }

    fn install_management(&self, image: &Path, hooks: &CustomizationHooks) -> Result<()> {
        let outcome =
            hooks.pre_install(&self.runner, FirmwareTarget::Management, image, self.opts)?;
        match outcome {
            PreInstallOutcome::AlreadyApplied => {
                // The hook owns the whole write, including any reboot it
                // needs; the default path and its reboot are skipped.
                debug!("management write performed by pre-install hook");
                hooks.post_install(&self.runner)?;
                Ok(())
            }
            PreInstallOutcome::NotApplied => self.write_management(image),
        }
    }

    /// Default management write: stage the verified image where the next
    /// boot stage expects it, then reboot. This path is the last action of
    /// an update run.
    fn write_management(&self, image: &Path) -> Result<()> {
        with_task(self.sink.as_ref(), "Prepare BMC firmware image", || {
            let destination = self
                .cfg
                .staging_dir
                .join(FirmwareTarget::Management.image_file());
            move_file(image, &destination)
        })?;

        if self.opts.clean_install {
            self.clear_allowlist()?;
        }

        self.reboot()
    }

    fn clear_allowlist(&self) -> Result<()> {
        with_task(self.sink.as_ref(), "Clear allow list", || {
            let path = self.cfg.staging_dir.join(&self.cfg.allowlist_file);
            std::fs::File::create(path)?;
            Ok(())
        })
    }

    fn reboot(&self) -> Result<()> {
        with_task(self.sink.as_ref(), "Reboot BMC system", || {
            self.runner
                .output(&self.cfg.reboot_cmd, &[])?
                .expect_success(&self.cfg.reboot_cmd)?;
            Ok(())
        })
    }
}

/// Move a file across filesystems if a plain rename is not possible.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)?;
    Ok(())
}
