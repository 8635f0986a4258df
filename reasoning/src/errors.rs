//! Gateway error types

use crate::capability::CapabilityError;
use crate::retry::RetryClassifiable;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a gateway call that produced no verdicts.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("reasoning call timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("reasoning capability unavailable after {attempts} attempt(s): {message}")]
    Unavailable {
        attempts: u32,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("reasoning capability rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Malformed query or empty candidate set. Never retried.
    #[error("invalid reasoning request: {0}")]
    InvalidRequest(String),

    /// The response could not be parsed at all; every candidate of the call
    /// is lost.
    #[error("invalid capability response: {0}")]
    InvalidResponse(String),

    #[error("reasoning call cancelled")]
    Cancelled,

    #[error("query deadline exceeded")]
    DeadlineExceeded,
}

impl GatewayError {
    /// Stable short label used in trace notes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "unavailable",
            Self::Rejected { .. } => "rejected",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }

    pub(crate) fn from_capability(err: CapabilityError, attempts: u32) -> Self {
        match err {
            CapabilityError::Timeout => Self::Timeout { attempts },
            CapabilityError::Unavailable {
                message,
                retry_after,
            } => Self::Unavailable {
                attempts,
                message,
                retry_after,
            },
            CapabilityError::Rejected { status, message } => Self::Rejected { status, message },
            CapabilityError::Malformed(message) => Self::InvalidResponse(message),
        }
    }
}

impl RetryClassifiable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }

    fn suggested_backoff(&self) -> Option<Duration> {
        match self {
            Self::Unavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl RetryClassifiable for CapabilityError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable { .. })
    }

    fn suggested_backoff(&self) -> Option<Duration> {
        match self {
            Self::Unavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
