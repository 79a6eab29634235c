use thiserror::Error;

use crate::domain::CandidateSummary;

/// Failures raised by the gateway, the resolver and inbound validation.
///
/// `NotFound` and `MultipleCandidates` are control-flow outcomes of
/// resolution; the remaining variants are genuine failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CrmError {
    #[error("contact not found: {identifier}")]
    NotFound { identifier: String },
    #[error("found {} matching contacts", candidates.len())]
    MultipleCandidates { candidates: Vec<CandidateSummary> },
    #[error("upstream CRM returned status {status}")]
    Upstream { status: u16, body: String },
    #[error("could not reach upstream CRM: {cause}")]
    Connection { cause: String },
    #[error("validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },
}

impl CrmError {
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound { identifier: identifier.into() }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Stable machine-readable class used in logs and error bodies.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::MultipleCandidates { .. } => "multiple_candidates",
            Self::Upstream { .. } => "upstream_error",
            Self::Connection { .. } => "connection_error",
            Self::Validation { .. } => "validation_error",
        }
    }

    /// Whether repeating the same idempotent call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
