//! RBAC Error Types

use thiserror::Error;

use super::policy::{Action, Role};

/// Errors from parsing role and action names
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Why a policy load fell back to defaults
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Policy endpoint returned status {0}")]
    Status(u16),

    #[error("Malformed policy payload: {0}")]
    Malformed(String),

    #[error("Policy payload is empty")]
    Empty,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Malformed(err.to_string())
    }
}

/// Why a policy write was rejected. Never recovered locally.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Policy endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not authorized to change permissions (status {0})")]
    Unauthorized(u16),

    #[error("Invalid policy: {0}")]
    Validation(String),

    #[error("Failed to encode policy: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Refusal returned by a gate check
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{role} may not {action} {module}")]
pub struct AccessDenied {
    pub role: Role,
    pub module: String,
    pub action: Action,
}
