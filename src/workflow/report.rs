//! Outcome of a best-effort teardown.

use std::fmt;

use crate::backend::ServerHandle;

/// A server whose deletion request failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownFailure {
    /// Server the deletion was attempted on.
    pub server: ServerHandle,
    /// Error reported by the provider.
    pub message: String,
}

/// A companion resource removed after the servers that used it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CleanupStep {
    /// Kind and identifier of the resource, such as `security group sg-1`.
    pub resource: String,
    /// Error reported by the provider when removal failed.
    pub error: Option<String>,
}

impl CleanupStep {
    /// Returns `true` when the resource was removed.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a best-effort teardown.
///
/// Every matching server is attempted independently; one failure never
/// prevents the others from being deleted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownReport {
    /// Servers whose deletion was accepted and which are gone.
    pub deleted: Vec<ServerHandle>,
    /// Servers whose deletion request failed.
    pub failures: Vec<TeardownFailure>,
    /// Servers whose deletion was accepted but which were still listed when
    /// the teardown wait ran out.
    pub residual: Vec<ServerHandle>,
    /// Companion resources removed once the servers were handled, in the
    /// order they were attempted.
    pub cleanup: Vec<CleanupStep>,
}

impl TeardownReport {
    /// Returns `true` when every matching server and companion resource is
    /// gone.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.residual.is_empty()
            && self.cleanup.iter().all(CleanupStep::succeeded)
    }

    /// Number of servers the teardown attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failures.len() + self.residual.len()
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deleted {}, failed {}, still present {}",
            self.deleted.len(),
            self.failures.len(),
            self.residual.len()
        )?;
        if self.cleanup.is_empty() {
            return Ok(());
        }
        let removed = self.cleanup.iter().filter(|step| step.succeeded()).count();
        write!(
            f,
            "; cleaned up {removed}, cleanup failed {}",
            self.cleanup.len() - removed
        )
    }
}
