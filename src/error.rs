use thiserror::Error;

/// Custom error types for the quiz session server
#[derive(Debug, Error)]
pub enum QuizError {
    /// Session and identity errors
    #[error("No session bound to connection {0}")]
    SessionNotFound(u64),

    #[error("Session token rejected")]
    InvalidSession,

    #[error("Connection {0} not authorized for this operation")]
    Unauthorized(u64),

    #[error("Quiz {quiz_id} is not owned by user {user_id}")]
    QuizNotOwned { quiz_id: u64, user_id: u64 },

    #[error("Quiz {0} does not match the room's bound quiz")]
    QuizMismatch(u64),

    /// Room and roster errors
    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Display name {0} already taken in this room")]
    DuplicateName(String),

    #[error("Connection {0} is already bound to a room")]
    AlreadyInRoom(u64),

    /// Signaling errors
    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using QuizError
pub type Result<T> = std::result::Result<T, QuizError>;

impl QuizError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        QuizError::Internal(msg.into())
    }

    /// True for failures that are dropped without echoing anything back to
    /// the offending client. Covers the whole authorization taxonomy.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            QuizError::SessionNotFound(_)
                | QuizError::InvalidSession
                | QuizError::Unauthorized(_)
                | QuizError::QuizNotOwned { .. }
                | QuizError::QuizMismatch(_)
                | QuizError::AlreadyInRoom(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuizError::RoomNotFound("483920".to_string());
        assert_eq!(err.to_string(), "Room 483920 not found");
    }

    #[test]
    fn test_error_helpers() {
        let err = QuizError::internal("Something went wrong");
        assert!(matches!(err, QuizError::Internal(_)));
    }

    #[test]
    fn test_silent_classification() {
        assert!(QuizError::Unauthorized(7).is_silent());
        assert!(QuizError::QuizNotOwned { quiz_id: 5, user_id: 2 }.is_silent());
        assert!(!QuizError::RoomNotFound("000000".to_string()).is_silent());
        assert!(!QuizError::DuplicateName("bob".to_string()).is_silent());
    }
}
