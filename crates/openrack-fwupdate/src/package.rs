//! Update package handling: scratch directory and archive extraction
//!
//! The package is consumed once per invocation: the scratch directory is
//! deleted and recreated on every run, and removed again when the run's
//! [`Scratch`] is dropped. Nothing persists across runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, UpdateError};
use crate::exec::CommandRunner;

/// Scratch extraction directory for one engine run
pub struct Scratch {
    dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Scratch {
    /// Delete and recreate the scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the directory cannot be recreated.
    pub fn recreate(dir: &Path, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            runner,
        })
    }

    /// Path of the scratch directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Extract a tar archive into the scratch root.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ExternalToolFailed`] when extraction fails.
    pub fn unpack(&self, archive: &Path) -> Result<()> {
        self.unpack_into(archive, &self.dir)
    }

    /// Extract a tar archive into a subdirectory (created if needed).
    ///
    /// # Errors
    ///
    /// Same contract as [`Scratch::unpack`].
    pub fn unpack_into(&self, archive: &Path, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        let archive_arg = archive.display().to_string();
        let dest_arg = dest.display().to_string();
        let args = ["-xf", archive_arg.as_str(), "-C", dest_arg.as_str()];
        self.runner
            .output("tar", &args)?
            .expect_success(&format!("tar -xf {archive_arg}"))?;
        Ok(())
    }

    /// Path of an expected file inside the scratch root.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::PackageInvalid`] when the file is absent.
    pub fn file(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(UpdateError::PackageInvalid(format!("{name} not found")));
        }
        Ok(path)
    }

    /// Path of an optional file inside the scratch root.
    pub fn optional_file(&self, name: &str) -> Option<PathBuf> {
        let path = self.dir.join(name);
        path.is_file().then_some(path)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!(%err, dir = %self.dir.display(), "scratch cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CmdOutput;

    struct NullRunner;

    impl CommandRunner for NullRunner {
        fn output(&self, _program: &str, _args: &[&str]) -> Result<CmdOutput> {
            Ok(CmdOutput {
                status: 0,
                output: String::new(),
            })
        }
        fn status(&self, _program: &str, _args: &[&str]) -> Result<i32> {
            Ok(0)
        }
    }

    #[test]
    fn test_recreate_wipes_previous_content() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("scratch");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("stale"), "old run")?;

        let scratch = Scratch::recreate(&dir, Arc::new(NullRunner))?;
        assert!(scratch.dir().exists());
        assert!(!scratch.dir().join("stale").exists());
        Ok(())
    }

    #[test]
    fn test_scratch_removed_on_drop() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("scratch");
        {
            let _scratch = Scratch::recreate(&dir, Arc::new(NullRunner))?;
            assert!(dir.exists());
        }
        assert!(!dir.exists());
        Ok(())
    }

    #[test]
    fn test_missing_file_is_package_invalid() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("scratch");
        let scratch = Scratch::recreate(&dir, Arc::new(NullRunner))?;

        std::fs::write(scratch.dir().join("host.pnor"), "image")?;
        assert!(scratch.file("host.pnor").is_ok());
        assert!(scratch.optional_file("bmc.update").is_none());
        assert!(matches!(
            scratch.file("image-bmc"),
            Err(UpdateError::PackageInvalid(_))
        ));
        Ok(())
    }
}
