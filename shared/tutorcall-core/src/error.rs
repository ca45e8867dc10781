//! Error types for TutorCall services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TutorCallError>;

#[derive(Error, Debug)]
pub enum TutorCallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl TutorCallError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Unavailable(_) => 503,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Timeout(_) => "TIMEOUT",
        }
    }
}

impl From<std::io::Error> for TutorCallError {
    fn from(err: std::io::Error) -> Self {
        TutorCallError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TutorCallError::Validation("x".into()).status_code(), 400);
        assert_eq!(TutorCallError::NotFound("x".into()).status_code(), 404);
        assert_eq!(TutorCallError::Internal("x".into()).status_code(), 500);
        assert_eq!(TutorCallError::Timeout("x".into()).error_code(), "TIMEOUT");
    }

    #[test]
    fn test_io_error_is_network() {
        let err: TutorCallError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy").into();
        assert!(matches!(err, TutorCallError::Network(_)));
    }
}
