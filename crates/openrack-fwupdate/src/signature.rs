//! Chain-of-trust signature verification
//!
//! Images are signed with a package-specific key; trust in that key is
//! attested by the host's provisioned trust roots. The digest work itself
//! is delegated to the external `openssl` binary, so this module only
//! orchestrates the manifest/key/signature chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, UpdateError};
use crate::exec::CommandRunner;
use crate::manifest;

/// Fixed file names at the package root and inside each trust key type
pub const MANIFEST_FILE: &str = "MANIFEST";
/// Bundled package public key, also the name of each key type's anchor key
pub const PUBLICKEY_FILE: &str = "publickey";
/// Digest-algorithm selector file inside each key type directory
pub const HASHFUNC_FILE: &str = "hashfunc";

/// Signature file suffix for per-package trust bundles
const SIG_SUFFIX: &str = ".sig";
/// Signature file suffix for the static-anchor variant
const DIGEST_SUFFIX: &str = ".digest";

/// Verification strategy, selected by configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum VerifyMode {
    /// Operator override: trust everything, verify nothing
    Disabled,
    /// Single fixed public key and digest algorithm
    Static {
        /// Path to the provisioned public key
        key: PathBuf,
        /// Digest algorithm name as understood by `openssl dgst`
        digest: String,
    },
    /// Per-package trust: anchors discovered under a directory of key types
    #[default]
    PackageTrust,
}

/// The anchor all subsequent file verifications are checked against
#[derive(Debug, Clone)]
struct Anchor {
    key: PathBuf,
    digest: String,
    sig_suffix: &'static str,
}

/// Signature verifier for one engine invocation
pub struct Verifier {
    runner: Arc<dyn CommandRunner>,
    mode: VerifyMode,
    trust_root: PathBuf,
    anchor: Option<Anchor>,
}

impl Verifier {
    /// Create a verifier with the given strategy.
    ///
    /// `trust_root` is the directory of key-type subdirectories consulted
    /// in [`VerifyMode::PackageTrust`].
    pub fn new(runner: Arc<dyn CommandRunner>, mode: VerifyMode, trust_root: PathBuf) -> Self {
        let anchor = match &mode {
            VerifyMode::Static { key, digest } => Some(Anchor {
                key: key.clone(),
                digest: digest.clone(),
                sig_suffix: DIGEST_SUFFIX,
            }),
            VerifyMode::Disabled | VerifyMode::PackageTrust => None,
        };
        Self {
            runner,
            mode,
            trust_root,
            anchor,
        }
    }

    /// Whether verification is enabled at all.
    pub fn enabled(&self) -> bool {
        !matches!(self.mode, VerifyMode::Disabled)
    }

    /// Run one `openssl dgst -verify` invocation.
    fn verify_with(&self, key: &Path, digest: &str, file: &Path, sig: &Path) -> Result<()> {
        let digest_flag = format!("-{digest}");
        let key_arg = key.display().to_string();
        let sig_arg = sig.display().to_string();
        let file_arg = file.display().to_string();
        let args = [
            "dgst",
            digest_flag.as_str(),
            "-verify",
            key_arg.as_str(),
            "-signature",
            sig_arg.as_str(),
            file_arg.as_str(),
        ];

        let out = self.runner.output("openssl", &args)?;
        if out.status != 0 {
            return Err(UpdateError::VerificationFailed(format!(
                "{}: {}",
                file.display(),
                out.output.trim()
            )));
        }
        Ok(())
    }

    fn existing(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        if !path.is_file() {
            return Err(UpdateError::PackageInvalid(format!(
                "{} not found",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Establish trust in the package using the host's provisioned anchors.
    ///
    /// Iterates key types under the trust root until one verifies **both**
    /// the package manifest and the package's bundled public key; the first
    /// success selects that bundled key (with the manifest's `HashType`) as
    /// the anchor for all subsequent [`Verifier::verify`] calls. Zero
    /// successes rejects the whole package.
    ///
    /// # Errors
    ///
    /// [`UpdateError::VerificationFailed`] when no key type validates the
    /// chain; [`UpdateError::PackageInvalid`] when the manifest or bundled
    /// key is missing.
    pub fn system_level_verify(&mut self, package_dir: &Path) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        if let VerifyMode::Static { .. } = self.mode {
            // Static anchors need no per-package chain.
            return Ok(());
        }

        let manifest_file = self.existing(package_dir, MANIFEST_FILE)?;
        let package_key = self.existing(package_dir, PUBLICKEY_FILE)?;

        let entries = std::fs::read_dir(&self.trust_root).map_err(|e| {
            UpdateError::VerificationFailed(format!(
                "trust root {} unreadable: {e}",
                self.trust_root.display()
            ))
        })?;

        for entry in entries.flatten() {
            let key_type = entry.path();
            if !key_type.is_dir() {
                continue;
            }

            // Any failure inside one key type moves on to the next.
            let attempt = || -> Result<()> {
                let anchor_key = self.existing(&key_type, PUBLICKEY_FILE)?;
                let hashfunc = self.existing(&key_type, HASHFUNC_FILE)?;
                let digest = manifest::require_tag(&hashfunc, "HashType")?;

                self.verify_with(
                    &anchor_key,
                    &digest,
                    &manifest_file,
                    &manifest_file.with_file_name(format!("{MANIFEST_FILE}{SIG_SUFFIX}")),
                )?;
                self.verify_with(
                    &anchor_key,
                    &digest,
                    &package_key,
                    &package_key.with_file_name(format!("{PUBLICKEY_FILE}{SIG_SUFFIX}")),
                )?;
                Ok(())
            };

            match attempt() {
                Ok(()) => {
                    let digest = manifest::require_tag(&manifest_file, "HashType")?;
                    debug!(key_type = %key_type.display(), %digest, "trust anchor selected");
                    self.anchor = Some(Anchor {
                        key: package_key,
                        digest,
                        sig_suffix: SIG_SUFFIX,
                    });
                    return Ok(());
                }
                Err(err) => {
                    debug!(key_type = %key_type.display(), %err, "key type rejected");
                }
            }
        }

        Err(UpdateError::VerificationFailed(
            "no provisioned trust anchor validates the package".to_string(),
        ))
    }

    /// Verify one file against the active anchor.
    ///
    /// The signature file defaults to the file path plus the anchor's
    /// suffix (`.sig` for package trust, `.digest` for static anchors).
    ///
    /// # Errors
    ///
    /// [`UpdateError::VerificationFailed`] on mismatch, with the raw tool
    /// output attached, or when no anchor has been established.
    pub fn verify(&self, file: &Path) -> Result<()> {
        self.verify_signed_by(file, None)
    }

    /// Verify one file against the active anchor with an explicit
    /// signature file.
    ///
    /// # Errors
    ///
    /// Same contract as [`Verifier::verify`].
    pub fn verify_signed_by(&self, file: &Path, signature: Option<&Path>) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }

        let Some(anchor) = &self.anchor else {
            return Err(UpdateError::VerificationFailed(
                "no trust anchor established for this package".to_string(),
            ));
        };

        if !file.is_file() {
            return Err(UpdateError::PackageInvalid(format!(
                "{} not found",
                file.display()
            )));
        }

        let default_sig;
        let sig = match signature {
            Some(path) => path,
            None => {
                let mut name = file.as_os_str().to_os_string();
                name.push(anchor.sig_suffix);
                default_sig = PathBuf::from(name);
                &default_sig
            }
        };

        self.verify_with(&anchor.key, &anchor.digest, file, sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CmdOutput;
    use std::cell::RefCell;

    /// Runner that records openssl invocations and scripts their results.
    struct ScriptedRunner {
        calls: RefCell<Vec<Vec<String>>>,
        verdict: Box<dyn Fn(&[&str]) -> i32>,
    }

    impl ScriptedRunner {
        fn new(verdict: impl Fn(&[&str]) -> i32 + 'static) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                verdict: Box::new(verdict),
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn output(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().map(|a| (*a).to_string()));
            self.calls.borrow_mut().push(call);
            let status = (self.verdict)(args);
            Ok(CmdOutput {
                status,
                output: if status == 0 {
                    "Verified OK".to_string()
                } else {
                    "Verification failure".to_string()
                },
            })
        }

        fn status(&self, _program: &str, _args: &[&str]) -> Result<i32> {
            Ok(0)
        }
    }

    fn touch(path: &Path, content: &str) -> std::io::Result<()> {
        std::fs::write(path, content)
    }

    /// Build a package dir plus a trust root with the given key types.
    fn fixture(key_types: &[&str]) -> std::io::Result<(tempfile::TempDir, PathBuf, PathBuf)> {
        let tmp = tempfile::tempdir()?;
        let pkg = tmp.path().join("pkg");
        let root = tmp.path().join("activationdata");
        std::fs::create_dir_all(&pkg)?;
        touch(&pkg.join(MANIFEST_FILE), "HashType=sha256\n")?;
        touch(&pkg.join("MANIFEST.sig"), "sig")?;
        touch(&pkg.join(PUBLICKEY_FILE), "key")?;
        touch(&pkg.join("publickey.sig"), "sig")?;
        for kt in key_types {
            let dir = root.join(kt);
            std::fs::create_dir_all(&dir)?;
            touch(&dir.join(PUBLICKEY_FILE), "anchor")?;
            touch(&dir.join(HASHFUNC_FILE), "HashType=sha256\n")?;
        }
        Ok((tmp, pkg, root))
    }

    #[test]
    fn test_first_valid_key_type_wins_and_short_circuits() -> Result<()> {
        let (_tmp, pkg, root) = fixture(&["alpha", "beta"])?;
        let runner = Arc::new(ScriptedRunner::new(|_| 0));
        let mut verifier = Verifier::new(runner.clone(), VerifyMode::PackageTrust, root);

        verifier.system_level_verify(&pkg)?;

        // Both manifest and bundled key checked exactly once: two calls.
        assert_eq!(runner.calls.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn test_fails_closed_when_no_key_type_validates() -> Result<()> {
        let (_tmp, pkg, root) = fixture(&["alpha", "beta"])?;
        let runner = Arc::new(ScriptedRunner::new(|_| 1));
        let mut verifier = Verifier::new(runner, VerifyMode::PackageTrust, root);

        let err = verifier.system_level_verify(&pkg);
        assert!(matches!(err, Err(UpdateError::VerificationFailed(_))));

        // No anchor selected: later verify calls must also fail.
        let image = pkg.join("host.pnor");
        touch(&image, "image").map_err(UpdateError::from)?;
        assert!(matches!(
            verifier.verify(&image),
            Err(UpdateError::VerificationFailed(_))
        ));
        Ok(())
    }

    #[test]
    fn test_second_key_type_succeeds_after_first_fails() -> Result<()> {
        let (_tmp, pkg, root) = fixture(&["alpha", "beta"])?;
        // Reject anchors under "alpha", accept the rest.
        let runner = Arc::new(ScriptedRunner::new(|args: &[&str]| {
            if args.iter().any(|a| a.contains("alpha")) { 1 } else { 0 }
        }));
        let mut verifier = Verifier::new(runner, VerifyMode::PackageTrust, root);
        verifier.system_level_verify(&pkg)?;
        Ok(())
    }

    #[test]
    fn test_verify_uses_package_key_and_sig_suffix() -> Result<()> {
        let (_tmp, pkg, root) = fixture(&["alpha"])?;
        let runner = Arc::new(ScriptedRunner::new(|_| 0));
        let mut verifier = Verifier::new(runner.clone(), VerifyMode::PackageTrust, root);
        verifier.system_level_verify(&pkg)?;

        let image = pkg.join("image-bmc");
        touch(&image, "image").map_err(UpdateError::from)?;
        touch(&pkg.join("image-bmc.sig"), "sig").map_err(UpdateError::from)?;
        verifier.verify(&image)?;

        let calls = runner.calls.borrow();
        let last = calls
            .last()
            .ok_or_else(|| UpdateError::PackageInvalid("no openssl call recorded".to_string()))?;
        assert!(last.iter().any(|a| a.ends_with("image-bmc.sig")));
        assert!(
            last.iter()
                .any(|a| a.ends_with("pkg/publickey") || a.ends_with("publickey"))
        );
        Ok(())
    }

    #[test]
    fn test_static_anchor_defaults_to_digest_suffix() -> Result<()> {
        let tmp = tempfile::tempdir().map_err(UpdateError::from)?;
        let key = tmp.path().join("pubkey.pem");
        touch(&key, "key").map_err(UpdateError::from)?;
        let file = tmp.path().join("image");
        touch(&file, "image").map_err(UpdateError::from)?;

        let runner = Arc::new(ScriptedRunner::new(|_| 0));
        let verifier = Verifier::new(
            runner.clone(),
            VerifyMode::Static {
                key,
                digest: "sha256".to_string(),
            },
            tmp.path().join("unused"),
        );

        verifier.verify(&file)?;
        let calls = runner.calls.borrow();
        let only = calls
            .first()
            .ok_or_else(|| UpdateError::PackageInvalid("no openssl call recorded".to_string()))?;
        assert!(only.iter().any(|a| a.ends_with("image.digest")));
        Ok(())
    }

    #[test]
    fn test_disabled_mode_verifies_nothing() -> Result<()> {
        let runner = Arc::new(ScriptedRunner::new(|_| 1));
        let mut verifier = Verifier::new(
            runner.clone(),
            VerifyMode::Disabled,
            PathBuf::from("/nonexistent"),
        );
        verifier.system_level_verify(Path::new("/nonexistent"))?;
        verifier.verify(Path::new("/nonexistent/file"))?;
        assert!(runner.calls.borrow().is_empty());
        Ok(())
    }
}
