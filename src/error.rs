// src/error.rs

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, FleetError>;

/// Coarse classification shared by every failure the orchestrator can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    Conflict,
    Transport,
    Command,
    RateLimit,
    ProviderServer,
    SafetyAbort,
    Internal,
}

#[derive(Error, Debug)]
pub enum FleetError {
    /// Local pre-flight rejection. Never issued after a network call.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The remote channel itself failed (refused, timed out, key rejected).
    #[error("transport failure: {message}")]
    Transport { code: Option<String>, message: String },

    /// A remote command ran but exited non-zero.
    #[error("remote command failed with exit code {exit_code}{}: {stderr}",
        failed_step.as_ref().map(|s| format!(" at step '{s}'")).unwrap_or_default())]
    Command {
        exit_code: i32,
        failed_step: Option<String>,
        stderr: String,
    },

    /// Non-2xx answer from a provider API.
    #[error("provider API returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("{0}")]
    SafetyAbort(String),

    /// Corrupted or unreadable local state. Propagated, never normalized away.
    #[error("inventory error: {0}")]
    Inventory(String),

    #[error("IO::{:?}: {}", .0.kind(), .0)]
    Io(#[from] std::io::Error),
}

impl FleetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FleetError::Validation(_) => ErrorKind::Validation,
            FleetError::Auth(_) => ErrorKind::Auth,
            FleetError::NotFound(_) => ErrorKind::NotFound,
            FleetError::Conflict(_) => ErrorKind::Conflict,
            FleetError::Transport { .. } => ErrorKind::Transport,
            FleetError::Command { .. } => ErrorKind::Command,
            FleetError::Http { status, .. } => kind_for_status(*status),
            FleetError::SafetyAbort(_) => ErrorKind::SafetyAbort,
            FleetError::Inventory(_) | FleetError::Io(_) => ErrorKind::Internal,
        }
    }

    /// True when a provider reports the resource is already gone.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Corrupted or unreadable local state; the only errors operations propagate.
    pub fn is_local_defect(&self) -> bool {
        matches!(self, FleetError::Inventory(_) | FleetError::Io(_))
    }
}

pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        400 | 422 => ErrorKind::Validation,
        401 | 403 => ErrorKind::Auth,
        404 => ErrorKind::NotFound,
        409 | 423 => ErrorKind::Conflict,
        429 => ErrorKind::RateLimit,
        500..=599 => ErrorKind::ProviderServer,
        _ => ErrorKind::Internal,
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(e: serde_json::Error) -> Self {
        FleetError::Inventory(e.to_string())
    }
}
