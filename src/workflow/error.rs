//! Errors surfaced by the provisioning workflows.

use thiserror::Error;

use crate::backend::BackendError;
use crate::conditions::ConditionError;
use crate::remote::RemoteError;

/// Errors surfaced while running a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when a request built from the inputs is invalid.
    #[error("invalid request: {0}")]
    Request(#[from] BackendError),
    /// Raised when a provider call fails.
    #[error("failed {action}: {source}")]
    Backend {
        /// What the workflow was doing.
        action: &'static str,
        /// Provider-specific error.
        #[source]
        source: E,
    },
    /// Raised when a wait is aborted because its condition failed.
    #[error("failed {action}: {source}")]
    Condition {
        /// What the workflow was waiting for.
        action: &'static str,
        /// Condition failure.
        #[source]
        source: ConditionError<E>,
    },
    /// Raised when a wait runs out of time.
    #[error("timed out {action}: {resource}")]
    Timeout {
        /// What the workflow was waiting for.
        action: &'static str,
        /// Resources that never reached the expected state.
        resource: String,
    },
    /// Raised when a resource the workflow depends on does not exist.
    #[error("{what} not found. {hint}")]
    NotFound {
        /// Description of the missing resource.
        what: String,
        /// Suggested remedy.
        hint: String,
    },
    /// Raised when the SSH client cannot be run.
    #[error("remote command failed: {0}")]
    Remote(#[from] RemoteError),
    /// Raised when a remote script exits unsuccessfully.
    #[error("remote script on {host} {status}: {stderr}")]
    RemoteExit {
        /// Host the script ran on.
        host: String,
        /// Human-readable exit status.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Describes a process exit code for error messages.
pub(super) fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(
        || String::from("was terminated by a signal"),
        |value| format!("exited with status {value}"),
    )
}
