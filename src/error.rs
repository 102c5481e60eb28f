//! Error types for the prediction service and its store.

use thiserror::Error;

/// Failures reported by a prediction store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored row: {0}")]
    InvalidRow(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Errors surfaced to callers of the service boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> ServiceError {
        move |source| ServiceError::Store { context, source }
    }

    /// HTTP-style status for the failure envelope.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::MalformedRequest(_) | ServiceError::UnknownAction(_) => 400,
            ServiceError::Store { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_context_prefix() {
        let err = ServiceError::store("Failed to store prediction")(StoreError::Unavailable(
            "connection refused".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "Failed to store prediction: connection refused"
        );
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(ServiceError::UnknownAction("x".into()).status(), 400);
        assert_eq!(ServiceError::MalformedRequest("x".into()).status(), 400);
        assert_eq!(
            ServiceError::UnknownAction("explode".into()).to_string(),
            "Unknown action: explode"
        );
    }
}
