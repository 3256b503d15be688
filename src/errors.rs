use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Database errors ──────────────────────────────────────────────────────
    #[error("Database connection failed: {0}")]
    DatabaseConnectionFailed(#[source] sqlx::Error),

    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Chat '{id}' not found")]
    ChatNotFound { id: String },

    // ── Upstream query service errors ────────────────────────────────────────
    #[error("Query service transport failed: {message}")]
    Transport { message: String },

    #[error("Query service responded with status {status}")]
    UpstreamStatus { status: u16 },

    #[error("No chunk received from the query service within {seconds}s")]
    StreamTimeout { seconds: u64 },

    #[error("Ingestion cancelled")]
    Cancelled,

    // ── Ingestion lifecycle errors ───────────────────────────────────────────
    #[error("An answer is already being received for chat '{chat_id}'")]
    IngestionInFlight { chat_id: String },

    #[error("Ingestion session already finalized")]
    SessionClosed,

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        AppError::Transport { message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::ChatNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::EmptyField { .. } | AppError::FieldTooLong { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::IngestionInFlight { .. })
    }

    /// Failures of the upstream stream. The ingestion state machine folds
    /// these into the fixed error message instead of propagating them.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Transport { .. }
                | AppError::UpstreamStatus { .. }
                | AppError::StreamTimeout { .. }
                | AppError::Cancelled
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AppError::UpstreamStatus { status: status.as_u16() },
            None => AppError::transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_family_is_classified() {
        assert!(AppError::transport("reset").is_transport());
        assert!(AppError::StreamTimeout { seconds: 5 }.is_transport());
        assert!(AppError::Cancelled.is_transport());
        assert!(!AppError::SessionClosed.is_transport());
    }

    #[test]
    fn in_flight_is_a_conflict() {
        let err = AppError::IngestionInFlight { chat_id: "c1".into() };
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "An answer is already being received for chat 'c1'");
    }
}
