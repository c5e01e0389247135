//! Per-record outcomes of batch lifecycle operations.

use std::fmt;

use crate::gateway::GatewayError;
use crate::record::Kind;

/// Lifecycle step a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Loading the reference through the gateway.
    Load,
    /// Wiring an installed record's dependencies.
    Resolve,
    /// Starting a resolved record.
    Activate,
    /// Stopping an active record.
    Deactivate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Resolve => "resolve",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        })
    }
}

/// One record that failed during a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleFailure {
    /// Registry of the record.
    pub kind: Kind,
    /// The record's reference.
    pub reference: String,
    /// Step that failed.
    pub stage: Stage,
    /// Gateway error.
    pub error: GatewayError,
}

impl fmt::Display for LifecycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} {} {}: {}",
            self.stage, self.kind, self.reference, self.error
        )
    }
}

/// Outcome of [`Runtime::start`](crate::Runtime::start) or
/// [`Runtime::stop`](crate::Runtime::stop).
///
/// A batch never stops at the first failure; every record is attempted and
/// reported either as succeeded or in [`failures`](Self::failures).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    succeeded: Vec<(Kind, String)>,
    failures: Vec<LifecycleFailure>,
}

impl LifecycleReport {
    pub(crate) fn record_success(&mut self, kind: Kind, reference: &str) {
        self.succeeded.push((kind, reference.to_owned()));
    }

    pub(crate) fn record_failure(
        &mut self,
        kind: Kind,
        reference: &str,
        stage: Stage,
        error: GatewayError,
    ) {
        self.failures.push(LifecycleFailure {
            kind,
            reference: reference.to_owned(),
            stage,
            error,
        });
    }

    /// Whether every attempted record succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Records that reached their target state, in processing order.
    #[must_use]
    pub fn succeeded(&self) -> &[(Kind, String)] {
        &self.succeeded
    }

    /// Records that did not, in processing order.
    #[must_use]
    pub fn failures(&self) -> &[LifecycleFailure] {
        &self.failures
    }

    /// Number of failed records.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// References of the failed records.
    #[must_use]
    pub fn failed_references(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.reference.as_str()).collect()
    }
}

impl fmt::Display for LifecycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            write!(f, "all {} records succeeded", self.succeeded.len())
        } else {
            write!(f, "completed with {} failures", self.failures.len())
        }
    }
}
