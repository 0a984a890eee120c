// packages/observer/src/utils/errors.rs
//! Error types for the observer crate

use thiserror::Error;

/// Observer errors
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The dedicated file task executor could not be started
    #[error("Failed to start file task executor: {0}")]
    ExecutorStartFailed(String),

    /// An event could not be encoded to JSON
    #[error("Failed to encode event: {0}")]
    EncodeFailed(String),
}

/// Result type alias for observer operations
pub type Result<T> = std::result::Result<T, ObserverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ObserverError::ExecutorStartFailed("no threads left".to_string());
        assert!(err.to_string().contains("no threads left"));
    }
}
