use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::forms::models::FormStatus;

/// Postgres SQLSTATE for `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Every failure the form lifecycle core can report.
/// Callers distinguish the kinds through the variant (or `code()`), never the message.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Form not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot {action} a form in status {status}")]
    InvalidState {
        status: FormStatus,
        action: &'static str,
    },

    #[error("Form {0} was modified concurrently; reload and retry")]
    ConcurrentModification(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FormError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            FormError::Validation(_) => "VALIDATION_ERROR",
            FormError::NotFound(_) => "NOT_FOUND",
            FormError::InvalidState { .. } => "INVALID_STATE",
            FormError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            FormError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Whether re-running the whole command against fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FormError::ConcurrentModification(_) | FormError::Storage(_)
        )
    }

    /// Renders the error envelope handed back to callers.
    pub fn to_body(&self) -> Value {
        if let FormError::Storage(msg) = self {
            tracing::error!("Storage error: {msg}");
        }

        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string()
            }
        })
    }

    /// Maps a unique violation on the history table to a lost submission race.
    pub(crate) fn from_append(err: sqlx::Error, form_id: Uuid) -> Self {
        let unique_violation = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == PG_UNIQUE_VIOLATION);

        if unique_violation {
            FormError::ConcurrentModification(form_id)
        } else {
            FormError::from(err)
        }
    }
}

impl From<sqlx::Error> for FormError {
    fn from(err: sqlx::Error) -> Self {
        FormError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for FormError {
    fn from(err: serde_json::Error) -> Self {
        FormError::Storage(format!("payload serialization failed: {err}"))
    }
}
