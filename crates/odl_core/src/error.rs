//! Error surface for the lifecycle engine.
//!
//! Every failure carries one of the stable code strings so callers (and the
//! HTTP layer) can branch without string-matching messages. `retryable` marks
//! transport-level failures the caller may resubmit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::ValidationIssue;

/// Stable error code strings.
pub mod codes {
    pub const INVALID_STRUCTURE: &str = "INVALID_STRUCTURE";
    pub const INVALID_REFERENCE: &str = "INVALID_REFERENCE";
    pub const DUPLICATE_CONTENT: &str = "DUPLICATE_CONTENT";
    pub const GATE_FAILED: &str = "GATE_FAILED";
    pub const COMPILE_FAILED: &str = "COMPILE_FAILED";
    pub const VERIFY_FAILED: &str = "VERIFY_FAILED";
    pub const DEPLOY_FAILED: &str = "DEPLOY_FAILED";
    pub const ROLLBACK_UNAVAILABLE: &str = "ROLLBACK_UNAVAILABLE";
    pub const DRIFT_DETECTED: &str = "DRIFT_DETECTED";
    pub const REGRESSION_FAILED: &str = "REGRESSION_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CANCELED: &str = "CANCELED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

#[derive(Debug, Error)]
pub enum OdlError {
    #[error("invalid structure: {} issue(s)", .0.len())]
    InvalidStructure(Vec<ValidationIssue>),

    #[error("invalid reference: {} issue(s)", .0.len())]
    InvalidReference(Vec<ValidationIssue>),

    #[error("duplicate content: {0}")]
    DuplicateContent(String),

    #[error("gate failed: {0}")]
    GateFailed(String),

    #[error("compile failed: {0}")]
    CompileFailed(String),

    #[error("verify failed: {0}")]
    VerifyFailed(String),

    #[error("deploy failed: {0}")]
    DeployFailed(String),

    #[error("regression failed: {0}")]
    RegressionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Transport-level failure from the warehouse adapter (network, capacity).
    #[error("transport: {0}")]
    Transport(String),

    #[error("canceled")]
    Canceled,

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OdlError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidStructure(_) => codes::INVALID_STRUCTURE,
            Self::InvalidReference(_) => codes::INVALID_REFERENCE,
            Self::DuplicateContent(_) => codes::DUPLICATE_CONTENT,
            Self::GateFailed(_) => codes::GATE_FAILED,
            Self::CompileFailed(_) => codes::COMPILE_FAILED,
            Self::VerifyFailed(_) => codes::VERIFY_FAILED,
            Self::DeployFailed(_) => codes::DEPLOY_FAILED,
            Self::RegressionFailed(_) => codes::REGRESSION_FAILED,
            Self::NotFound(_) => codes::NOT_FOUND,
            Self::Conflict(_) => "CONFLICT",
            Self::Timeout(_) => codes::TIMEOUT,
            Self::Transport(_) => codes::TIMEOUT,
            Self::Canceled => codes::CANCELED,
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether resubmitting the same operation may succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidStructure(_) | Self::InvalidReference(_) => 400,
            Self::DuplicateContent(_) | Self::Conflict(_) => 409,
            Self::GateFailed(_) | Self::RegressionFailed(_) => 422,
            Self::NotFound(_) => 404,
            Self::Timeout(_) | Self::Transport(_) => 504,
            Self::Canceled => 409,
            Self::CompileFailed(_)
            | Self::VerifyFailed(_)
            | Self::DeployFailed(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Wire shape for task records and HTTP bodies.
    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            Self::InvalidStructure(issues) | Self::InvalidReference(issues) => {
                serde_json::to_value(issues).ok()
            }
            _ => None,
        };
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
            retryable: self.retryable(),
        }
    }
}

/// Serialized error: `{code, message, details?, retryable}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub retryable: bool,
}

pub type Result<T> = std::result::Result<T, OdlError>;
