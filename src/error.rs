//! Error taxonomy for a reconciliation cycle.
//!
//! Every variant is fatal to the current cycle and nothing is retried.
//! Each one carries the resource name plus the path or command line
//! involved, so the operator can diagnose without re-running.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of reconciliation errors, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed deployment or manifest
    Configuration,
    /// The command binary itself was missing
    NotFound,
    /// The script signaled a functional warning
    Warning,
    /// Audit and apply disagreed
    UnexpectedApply,
    /// Any other failing exit
    Command,
    /// The script ran past its deadline
    Timeout,
    /// Filesystem failure
    Io,
    /// Ownership or mode could not be set
    Permission,
    /// User lookup or privilege switch failed
    Identity,
}

impl ErrorCategory {
    /// Get actionable advice for this category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Fix the deployment configuration and run `validate`",
            Self::NotFound => "Check the script's interpreter line and that the script was deployed",
            Self::Warning => "Read the script output above; the script asked to stop",
            Self::UnexpectedApply => {
                "Something changed between audit and apply; run `inspect` again"
            }
            Self::Command => "Read the script output above for the failure reason",
            Self::Timeout => "Raise `timeout` or find out why the script hangs",
            Self::Io => "Check the path exists and is writable",
            Self::Permission | Self::Identity => {
                "Run with enough privilege to act as the configured owner"
            }
        }
    }
}

/// Errors raised while inspecting or committing a deployment.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Deployment or manifest violates an invariant
    #[error("invalid configuration for {resource}: {message}")]
    Configuration { resource: String, message: String },

    /// Exit status 127, or the executable could not be found at spawn
    #[error("{resource}: command not found: {command}\n{output}")]
    NotFound {
        resource: String,
        command: String,
        output: String,
    },

    /// Exit status in the configured warning codes
    #[error("{resource}: command `{command}` returned warning code {code}:\n{output}")]
    Warning {
        resource: String,
        command: String,
        code: i32,
        output: String,
    },

    /// A change code returned while applying
    #[error(
        "{resource}: unexpected return when applying changes with `{command}` (exit {code}):\n{output}"
    )]
    UnexpectedApply {
        resource: String,
        command: String,
        code: i32,
        output: String,
    },

    /// Any other non-zero exit, or death by signal
    #[error("{resource}: command `{command}` exited with error ({status}):\n{output}")]
    CommandFailed {
        resource: String,
        command: String,
        status: String,
        output: String,
    },

    /// The script exceeded its wall-clock bound
    #[error("{resource}: command `{command}` timed out after {seconds}s:\n{output}")]
    Timeout {
        resource: String,
        command: String,
        seconds: u64,
        output: String,
    },

    /// File read, write or directory failure
    #[error("{resource}: {action} {}: {source}", .path.display())]
    Io {
        resource: String,
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Mode or ownership assignment failure
    #[error("{resource}: failed to set permissions on {}: {message}", .path.display())]
    PermissionSetup {
        resource: String,
        path: PathBuf,
        message: String,
    },

    /// User could not be resolved or assumed
    #[error("{resource}: cannot act as user `{user}`: {message}")]
    Identity {
        resource: String,
        user: String,
        message: String,
    },
}

impl ReconcileError {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Warning { .. } => ErrorCategory::Warning,
            Self::UnexpectedApply { .. } => ErrorCategory::UnexpectedApply,
            Self::CommandFailed { .. } => ErrorCategory::Command,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Io { .. } => ErrorCategory::Io,
            Self::PermissionSetup { .. } => ErrorCategory::Permission,
            Self::Identity { .. } => ErrorCategory::Identity,
        }
    }

    pub(crate) fn config(resource: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(
        resource: &str,
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            resource: resource.to_string(),
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn permission(
        resource: &str,
        path: impl Into<PathBuf>,
        err: &anyhow::Error,
    ) -> Self {
        Self::PermissionSetup {
            resource: resource.to_string(),
            path: path.into(),
            message: format!("{err:#}"),
        }
    }

    /// Attach the resource name to a manifest read failure
    pub(crate) fn from_manifest(resource: &str, err: manifest::Error) -> Self {
        match err {
            manifest::Error::Io { path, source } => Self::io(resource, "failed to read", path, source),
            other => Self::config(resource, other.to_string()),
        }
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, ReconcileError>;
