//! Exclusive flash access guard
//!
//! Combines an advisory file lock, a flashing-tool liveness check, a
//! chassis power gate and suspension of the flash mediation daemon into a
//! single scoped acquisition. Release is guaranteed on every exit path:
//! the guard's `Drop` performs the same best-effort cleanup as an explicit
//! [`FlashGuard::release`].

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::exec::CommandRunner;
use crate::progress::{ProgressSink, with_task};
use crate::sysbus::{MediatorState, PowerState, SystemBus};

/// Try to take an exclusive advisory lock on a file without blocking.
///
/// Returns `Ok(true)` when the lock was acquired, `Ok(false)` when another
/// process holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call; fd is a valid descriptor
        // owned by `file` for the duration of the call.
        let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

/// Factory for [`FlashGuard`] acquisitions
pub struct FlashLock {
    runner: Arc<dyn CommandRunner>,
    bus: Arc<dyn SystemBus>,
}

impl FlashLock {
    /// Create a lock factory over the given seams.
    pub fn new(runner: Arc<dyn CommandRunner>, bus: Arc<dyn SystemBus>) -> Self {
        Self { runner, bus }
    }

    /// Acquire exclusive access to the flash hardware.
    ///
    /// Steps, in order: advisory file lock (no retry), conflicting-tool
    /// liveness check, chassis-off gate, mediation daemon suspension,
    /// reboot inhibit. Any failure triggers a full release before the
    /// error propagates, so no partial guard state survives.
    ///
    /// With `lock_enabled = false` the returned guard performs no actions
    /// at all (operator override).
    ///
    /// # Errors
    ///
    /// [`UpdateError::LockUnavailable`] describing the first gate that
    /// refused.
    pub fn acquire(
        &self,
        cfg: &UpdateConfig,
        sink: &dyn ProgressSink,
    ) -> Result<FlashGuard> {
        let mut guard = FlashGuard {
            bus: self.bus.clone(),
            lock_path: cfg.lock_file.clone(),
            lock_file: None,
            suspended: false,
            reboot_inhibited: false,
            reboot_guard_disable: cfg.reboot_guard_disable.clone(),
        };

        if !cfg.lock_enabled {
            return Ok(guard);
        }

        let acquired = with_task(sink, "Lock flash access", || {
            self.acquire_steps(cfg, &mut guard)
        });
        if let Err(err) = acquired {
            guard.release();
            return Err(err);
        }

        Ok(guard)
    }

    fn acquire_steps(&self, cfg: &UpdateConfig, guard: &mut FlashGuard) -> Result<()> {
        // (a) advisory lock, non-blocking, no retry
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&cfg.lock_file)
            .map_err(|e| {
                UpdateError::LockUnavailable(format!(
                    "cannot open {}: {e}",
                    cfg.lock_file.display()
                ))
            })?;
        match try_flock_exclusive(&file) {
            Ok(true) => guard.lock_file = Some(file),
            Ok(false) => {
                return Err(UpdateError::LockUnavailable(
                    "another update is already in progress".to_string(),
                ));
            }
            Err(e) => {
                return Err(UpdateError::LockUnavailable(format!("flock failed: {e}")));
            }
        }

        // (b) no conflicting flash tool may be running
        let pidof = self.runner.output("pidof", &[cfg.flash_tool_name.as_str()])?;
        if pidof.status == 0 {
            return Err(UpdateError::LockUnavailable(format!(
                "{} is running",
                cfg.flash_tool_name
            )));
        }

        // (c) chassis must be powered off; unknown state fails closed
        let state = self.bus.chassis_power_state().map_err(|e| {
            UpdateError::LockUnavailable(format!("unable to determine the chassis state: {e}"))
        })?;
        match state {
            PowerState::Off => {}
            PowerState::On => {
                return Err(UpdateError::LockUnavailable(
                    "chassis state is not OFF".to_string(),
                ));
            }
            PowerState::Other(raw) => {
                return Err(UpdateError::LockUnavailable(format!(
                    "chassis state is not OFF ({raw})"
                )));
            }
        }

        // (d) suspend the mediation daemon, but only from idle
        let mediator = self.bus.mediator_state().map_err(|e| {
            UpdateError::LockUnavailable(format!("mediation daemon unreachable: {e}"))
        })?;
        match mediator {
            MediatorState::Idle => {
                self.bus.mediator_suspend().map_err(|e| {
                    UpdateError::LockUnavailable(format!("daemon suspend failed: {e}"))
                })?;
                guard.suspended = true;
            }
            MediatorState::Suspended => {
                return Err(UpdateError::LockUnavailable(
                    "mediation daemon already suspended".to_string(),
                ));
            }
            MediatorState::Other(raw) => {
                return Err(UpdateError::LockUnavailable(format!(
                    "mediation daemon not idle (state {raw})"
                )));
            }
        }

        // (e) keep the management controller from rebooting mid-write
        self.bus
            .start_unit(&cfg.reboot_guard_enable)
            .map_err(|e| UpdateError::LockUnavailable(format!("reboot inhibit failed: {e}")))?;
        guard.reboot_inhibited = true;

        Ok(())
    }
}

/// Live exclusive flash access
///
/// Holds the advisory lock for its lifetime. Dropping the guard releases
/// everything it acquired; release is idempotent and never fails.
pub struct FlashGuard {
    bus: Arc<dyn SystemBus>,
    lock_path: PathBuf,
    lock_file: Option<File>,
    suspended: bool,
    reboot_inhibited: bool,
    reboot_guard_disable: String,
}

impl FlashGuard {
    /// Release everything this guard acquired, in reverse order.
    ///
    /// Safe to call at any point, any number of times, including after a
    /// partially failed acquisition. Failures are logged and swallowed so
    /// release can never mask the error that triggered it.
    pub fn release(&mut self) {
        if self.suspended {
            if let Err(err) = self.bus.mediator_resume() {
                warn!(%err, "failed to resume the flash mediation daemon");
            }
            self.suspended = false;
        }

        if self.reboot_inhibited {
            if let Err(err) = self.bus.start_unit(&self.reboot_guard_disable) {
                warn!(%err, "failed to release the reboot inhibit");
            }
            self.reboot_inhibited = false;
        }

        if let Some(file) = self.lock_file.take() {
            // Closing the descriptor drops the flock; removing the file is
            // cosmetic and may race with a waiting acquirer.
            drop(file);
            if let Err(err) = std::fs::remove_file(&self.lock_path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(%err, "failed to remove the lock file");
                }
            }
        }
    }
}

impl Drop for FlashGuard {
    fn drop(&mut self) {
        self.release();
    }
}
