use uuid::Uuid;

use redline_core::error::codes;

use crate::store::StoreError;

/// Errors surfaced by session operations. Every variant is scoped to a
/// single user action — nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Rejected locally before anything reached the ledger or store.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
    /// The contract already carries a terminal committed event.
    #[error("contract {0} is already committed")]
    AlreadyCommitted(Uuid),
    #[error("clause {0} not found")]
    ClauseNotFound(Uuid),
    /// Agree/query attempted on a header or an uncertified clause.
    #[error("clause {0} is not actionable")]
    NotActionable(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("assistant request failed: {0}")]
    Assistant(String),
    #[error("certifier trigger failed: {0}")]
    Certifier(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Machine-readable error code for callers that render or log errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => codes::VALIDATION_FAILED,
            Self::AlreadyCommitted(_) => codes::ALREADY_COMMITTED,
            Self::ClauseNotFound(_) => codes::NOT_FOUND,
            Self::NotActionable(_) => codes::NOT_ACTIONABLE,
            Self::Store(_) => codes::STORE_UNAVAILABLE,
            Self::Assistant(_) => codes::ASSISTANT_FAILED,
            Self::Certifier(_) => codes::CERTIFIER_FAILED,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}
