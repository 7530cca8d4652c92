//! Vendor customization hooks
//!
//! An update package may carry one sub-archive per firmware target with
//! deployment-specific install logic. The sub-archive is signature-checked
//! with the same anchor as the parent package, extracted into an isolated
//! subdirectory and probed for two fixed executable names.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::InstallOptions;
use crate::error::{Result, UpdateError};
use crate::exec::CommandRunner;
use crate::package::Scratch;
use crate::progress::{ProgressSink, with_task};
use crate::signature::Verifier;
use crate::target::FirmwareTarget;

/// Fixed hook executable names inside an extracted customization bundle
const PREINSTALL: &str = "preinstall";
const POSTINSTALL: &str = "postinstall";

/// Exit code by which a pre-install hook signals "image already written"
const EALREADY: i32 = 114;

/// Result of a pre-install hook run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreInstallOutcome {
    /// The hook did not write the image; the default write path must run
    NotApplied,
    /// The hook performed the full write; the default path must be skipped
    AlreadyApplied,
}

/// Discovered hooks for one firmware target
#[derive(Debug, Default)]
pub struct CustomizationHooks {
    /// Pre-install executable, if the bundle ships one
    pub preinstall: Option<PathBuf>,
    /// Post-install executable, if the bundle ships one
    pub postinstall: Option<PathBuf>,
}

impl CustomizationHooks {
    /// Discover and extract the customization bundle for `target`.
    ///
    /// A missing bundle is not an error: both hooks come back absent and
    /// the default write path is used.
    ///
    /// # Errors
    ///
    /// Verification or extraction failures of a present bundle abort the
    /// update.
    pub fn prepare(
        scratch: &Scratch,
        target: FirmwareTarget,
        verifier: &Verifier,
        sink: &dyn ProgressSink,
    ) -> Result<Self> {
        let name = target.bundle_name();
        let Some(bundle) = scratch.optional_file(name) else {
            return Ok(Self::default());
        };

        with_task(sink, &format!("Check signature of {name}"), || {
            verifier.verify(&bundle)
        })?;

        let dest = scratch.dir().join(format!("upack_{name}"));
        with_task(sink, &format!("Unpack updater {name}"), || {
            scratch.unpack_into(&bundle, &dest)
        })?;

        Ok(Self {
            preinstall: executable_in(&dest, PREINSTALL),
            postinstall: executable_in(&dest, POSTINSTALL),
        })
    }

    /// Run the pre-install hook, mapping its exit status to the tri-state
    /// contract.
    ///
    /// The hook receives the image path, the install mode (`clean` /
    /// `full`) and the interactivity flag (`interactive` / `silent`).
    ///
    /// # Errors
    ///
    /// [`UpdateError::HookFailed`] for any status other than success or
    /// the already-applied sentinel.
    pub fn pre_install(
        &self,
        runner: &Arc<dyn CommandRunner>,
        target: FirmwareTarget,
        image: &Path,
        opts: InstallOptions,
    ) -> Result<PreInstallOutcome> {
        let Some(hook) = &self.preinstall else {
            return Ok(PreInstallOutcome::NotApplied);
        };

        let image_arg = image.display().to_string();
        let mode = if opts.clean_install { "clean" } else { "full" };
        let interactivity = if opts.interactive { "interactive" } else { "silent" };
        let hook_path = hook.display().to_string();

        let status = runner.status(
            hook_path.as_str(),
            &[image_arg.as_str(), mode, interactivity],
        )?;

        match status {
            0 => Ok(PreInstallOutcome::NotApplied),
            EALREADY => Ok(PreInstallOutcome::AlreadyApplied),
            other => Err(UpdateError::HookFailed {
                target: target.label().to_string(),
                status: other,
            }),
        }
    }

    /// Run the post-install hook, if present.
    ///
    /// Only completion is awaited; the exit status never gates control
    /// flow.
    ///
    /// # Errors
    ///
    /// Returns an error only when the hook cannot be spawned at all.
    pub fn post_install(&self, runner: &Arc<dyn CommandRunner>) -> Result<()> {
        if let Some(hook) = &self.postinstall {
            let hook_path = hook.display().to_string();
            let _status = runner.status(hook_path.as_str(), &[])?;
        }
        Ok(())
    }
}

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CmdOutput;
    use std::cell::Cell;

    struct ExitWith(Cell<i32>);

    impl CommandRunner for ExitWith {
        fn output(&self, _program: &str, _args: &[&str]) -> Result<CmdOutput> {
            Ok(CmdOutput {
                status: 0,
                output: String::new(),
            })
        }
        fn status(&self, _program: &str, _args: &[&str]) -> Result<i32> {
            Ok(self.0.get())
        }
    }

    fn hooks_with_preinstall() -> CustomizationHooks {
        CustomizationHooks {
            preinstall: Some(PathBuf::from("/hooks/preinstall")),
            postinstall: None,
        }
    }

    #[test]
    fn test_pre_install_zero_means_not_applied() -> Result<()> {
        let runner: Arc<dyn CommandRunner> = Arc::new(ExitWith(Cell::new(0)));
        let outcome = hooks_with_preinstall().pre_install(
            &runner,
            FirmwareTarget::Host,
            Path::new("/img"),
            InstallOptions::default(),
        )?;
        assert_eq!(outcome, PreInstallOutcome::NotApplied);
        Ok(())
    }

    #[test]
    fn test_pre_install_sentinel_means_already_applied() -> Result<()> {
        let runner: Arc<dyn CommandRunner> = Arc::new(ExitWith(Cell::new(114)));
        let outcome = hooks_with_preinstall().pre_install(
            &runner,
            FirmwareTarget::Host,
            Path::new("/img"),
            InstallOptions::default(),
        )?;
        assert_eq!(outcome, PreInstallOutcome::AlreadyApplied);
        Ok(())
    }

    #[test]
    fn test_pre_install_other_status_is_hook_failure() {
        let runner: Arc<dyn CommandRunner> = Arc::new(ExitWith(Cell::new(3)));
        let err = hooks_with_preinstall().pre_install(
            &runner,
            FirmwareTarget::Management,
            Path::new("/img"),
            InstallOptions::default(),
        );
        assert!(matches!(
            err,
            Err(UpdateError::HookFailed { status: 3, .. })
        ));
    }

    #[test]
    fn test_absent_preinstall_defaults_to_not_applied() -> Result<()> {
        let runner: Arc<dyn CommandRunner> = Arc::new(ExitWith(Cell::new(99)));
        let outcome = CustomizationHooks::default().pre_install(
            &runner,
            FirmwareTarget::Host,
            Path::new("/img"),
            InstallOptions::default(),
        )?;
        assert_eq!(outcome, PreInstallOutcome::NotApplied);
        Ok(())
    }

    #[test]
    fn test_post_install_ignores_exit_status() -> Result<()> {
        let runner: Arc<dyn CommandRunner> = Arc::new(ExitWith(Cell::new(17)));
        let hooks = CustomizationHooks {
            preinstall: None,
            postinstall: Some(PathBuf::from("/hooks/postinstall")),
        };
        hooks.post_install(&runner)?;
        Ok(())
    }
}
