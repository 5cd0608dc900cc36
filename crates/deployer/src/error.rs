use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline step a deploy failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Build,
    Validate,
    Sync,
    Invalidate,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Build => "build",
            Step::Validate => "validate",
            Step::Sync => "sync",
            Step::Invalidate => "invalidate",
        };
        f.write_str(name)
    }
}

/// Errors that abort a deploy. Nothing is rolled back.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Missing or invalid local input
    #[error("configuration error: {0}")]
    Config(String),

    /// Build command failed, timed out or could not start
    #[error("build failed: {0}")]
    Build(String),

    /// Credentials were rejected
    #[error("authentication failed during {step}: {message}")]
    Auth { step: Step, message: String },

    /// Upload, delete or listing failed
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// CDN rejected the invalidation request
    #[error("invalidation failed: {0}")]
    Invalidation(String),
}

impl DeployError {
    pub fn step(&self) -> Step {
        match self {
            DeployError::Config(_) => Step::Validate,
            DeployError::Build(_) => Step::Build,
            DeployError::Auth { step, .. } => *step,
            DeployError::Transfer(_) => Step::Sync,
            DeployError::Invalidation(_) => Step::Invalidate,
        }
    }

    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            DeployError::Config(_) => 2,
            DeployError::Build(_) => 3,
            DeployError::Auth { .. } => 4,
            DeployError::Transfer(_) => 5,
            DeployError::Invalidation(_) => 6,
        }
    }

    /// Map a port failure raised while syncing
    pub(crate) fn from_sync(err: PortError) -> Self {
        match err.kind {
            PortErrorKind::Auth => DeployError::Auth {
                step: Step::Sync,
                message: err.message,
            },
            _ => DeployError::Transfer(err.message),
        }
    }

    /// Map a port failure raised while invalidating
    pub(crate) fn from_invalidation(err: PortError) -> Self {
        match err.kind {
            PortErrorKind::Auth => DeployError::Auth {
                step: Step::Invalidate,
                message: err.message,
            },
            _ => DeployError::Invalidation(err.message),
        }
    }
}

impl From<shipfront_core::Error> for DeployError {
    fn from(err: shipfront_core::Error) -> Self {
        DeployError::Config(err.to_string())
    }
}

/// How a port failure should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortErrorKind {
    /// Credentials missing, expired or denied. Never retried.
    Auth,
    /// Timeouts, connection failures, throttling, 5xx. Retried.
    Transient,
    /// The service refused the request. Never retried.
    Rejected,
}

/// Error returned by the storage, CDN and build ports
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PortError {
    pub kind: PortErrorKind,
    pub message: String,
}

impl PortError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: PortErrorKind::Auth,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: PortErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: PortErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == PortErrorKind::Transient
    }
}
