//! Step reporting and operator interaction seams
//!
//! Every discrete step of an update run is bracketed through a
//! [`ProgressSink`] so the operator gets an audit trail of which steps
//! completed before an abort. The engine itself stays silent on stdout;
//! the CLI installs a console sink.

use tracing::{error, info};

use crate::error::Result;

/// Receives step lifecycle events as the sequencer works
pub trait ProgressSink {
    /// A step has started.
    fn task_started(&self, title: &str);
    /// The step finished successfully.
    fn task_done(&self, title: &str);
    /// The step failed; the error itself propagates separately.
    fn task_failed(&self, title: &str);

    /// Out-of-band note for the operator (non-fatal conditions).
    fn note(&self, message: &str) {
        info!("{message}");
    }
}

/// Default sink that routes step events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn task_started(&self, title: &str) {
        info!(task = %title, "started");
    }

    fn task_done(&self, title: &str) {
        info!(task = %title, "done");
    }

    fn task_failed(&self, title: &str) {
        error!(task = %title, "failed");
    }
}

/// Run `f` as a reported step: started, then done or failed.
///
/// # Errors
///
/// Propagates the error returned by `f` unchanged.
pub fn with_task<T>(
    sink: &dyn ProgressSink,
    title: &str,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    sink.task_started(title);
    match f() {
        Ok(value) => {
            sink.task_done(title);
            Ok(value)
        }
        Err(err) => {
            sink.task_failed(title);
            Err(err)
        }
    }
}

/// Operator confirmation seam
pub trait Prompt {
    /// Ask the operator to confirm a destructive sequence.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UpdateError::UserAborted`] when the prompt itself
    /// is interrupted.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Prompt used for suppressed-confirmation runs: always consents
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Prompt for AssumeYes {
    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        events: RefCell<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn task_started(&self, title: &str) {
            self.events.borrow_mut().push(format!("start:{title}"));
        }
        fn task_done(&self, title: &str) {
            self.events.borrow_mut().push(format!("done:{title}"));
        }
        fn task_failed(&self, title: &str) {
            self.events.borrow_mut().push(format!("fail:{title}"));
        }
    }

    #[test]
    fn test_with_task_reports_done_on_success() -> Result<()> {
        let sink = RecordingSink::default();
        let value = with_task(&sink, "Unpack", || Ok(7))?;
        assert_eq!(value, 7);
        assert_eq!(*sink.events.borrow(), vec!["start:Unpack", "done:Unpack"]);
        Ok(())
    }

    #[test]
    fn test_with_task_reports_failure_and_propagates() {
        let sink = RecordingSink::default();
        let result: Result<()> = with_task(&sink, "Verify", || Err(UpdateError::UserAborted));
        assert!(matches!(result, Err(UpdateError::UserAborted)));
        assert_eq!(*sink.events.borrow(), vec!["start:Verify", "fail:Verify"]);
    }
}
