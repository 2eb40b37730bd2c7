//! Expectation mismatches and the result of one test run.
//!
//! A mismatch never aborts a run. Every one is recorded so that a failing
//! test reports all of its problems together.

use crate::resource::ErrorCode;
use crate::setup::TestSetup;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// One observed deviation from the expected outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("{url}: expected {expected} responses, got {actual}")]
    ResponseCount {
        url: String,
        expected: u32,
        actual: u32,
    },

    #[error("{url}: expected {expected} success queries, got {actual}")]
    SuccessQueryCount {
        url: String,
        expected: u32,
        actual: u32,
    },

    #[error("{url}: expected {expected} failure queries, got {actual}")]
    FailureQueryCount {
        url: String,
        expected: u32,
        actual: u32,
    },

    #[error("{url}: expected status {expected}, got {actual}")]
    Status {
        url: String,
        expected: u16,
        actual: u16,
    },

    #[error("{url}: expected load error {expected}, got {actual}")]
    LoadError {
        url: String,
        expected: ErrorCode,
        actual: ErrorCode,
    },

    /// The request's `Origin` header did not match the expectation. An empty
    /// `expected` means the header must be absent.
    #[error("{url}: expected Origin header {expected:?}, got {actual:?}")]
    OriginHeader {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("no resource matches {0}")]
    UnknownUrl(String),

    #[error("Unexpected console message: {0}")]
    UnexpectedConsoleMessage(String),

    #[error("Did not receive expected console message: {0}")]
    MissingConsoleMessage(String),

    #[error("test was torn down before every expectation was met")]
    NotShuttingDown,

    #[error("test timed out after {0:?}")]
    Timeout(Duration),
}

/// Shared, append-only mismatch log.
#[derive(Debug, Clone, Default)]
pub struct Failures {
    inner: Arc<Mutex<Vec<Mismatch>>>,
}

impl Failures {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, mismatch: Mismatch) {
        tracing::warn!(%mismatch, "expectation mismatch");
        self.inner.lock().push(mismatch);
    }

    /// Records `result`'s error, if any.
    pub fn check(&self, result: Result<(), Mismatch>) {
        if let Err(mismatch) = result {
            self.record(mismatch);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Mismatch> {
        self.inner.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<Mismatch> {
        std::mem::take(&mut *self.inner.lock())
    }
}

/// Final state of a completed run.
#[derive(Debug)]
pub struct TestOutcome {
    setup: TestSetup,
    failures: Vec<Mismatch>,
}

impl TestOutcome {
    #[must_use]
    pub fn new(setup: TestSetup, failures: Vec<Mismatch>) -> Self {
        Self { setup, failures }
    }

    /// The setup with its actual counters filled in.
    #[must_use]
    pub fn setup(&self) -> &TestSetup {
        &self.setup
    }

    #[must_use]
    pub fn failures(&self) -> &[Mismatch] {
        &self.failures
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Panics listing every mismatch if the run failed.
    #[track_caller]
    pub fn assert_passed(&self) {
        if self.passed() {
            return;
        }

        let mut report = format!("{} expectation mismatch(es):", self.failures.len());
        for mismatch in &self.failures {
            let _ = write!(report, "\n  - {mismatch}");
        }
        panic!("{report}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_shared_between_clones() {
        let failures = Failures::new();
        let clone = failures.clone();
        clone.record(Mismatch::UnknownUrl("http://x/".into()));
        failures.check(Ok(()));
        failures.check(Err(Mismatch::NotShuttingDown));

        assert_eq!(failures.snapshot().len(), 2);
        assert_eq!(clone.take().len(), 2);
        assert!(failures.is_empty());
    }

    #[test]
    #[should_panic(expected = "Did not receive expected console message: Blocked")]
    fn assert_passed_lists_every_mismatch() {
        let outcome = TestOutcome::new(
            TestSetup::default(),
            vec![
                Mismatch::Status {
                    url: "http://a/".into(),
                    expected: 200,
                    actual: 404,
                },
                Mismatch::MissingConsoleMessage("Blocked".into()),
            ],
        );
        assert!(!outcome.passed());
        outcome.assert_passed();
    }
}
