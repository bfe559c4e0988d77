use thiserror::Error;

use crate::crypto::CryptoError;
use crate::repository::Backend;

/// HTTP status categories reported by networked backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Server(u16),
    Other(u16),
}

impl BackendStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            500..=599 => Self::Server(code),
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Server(code) | Self::Other(code) => *code,
        }
    }
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not signed in to {0}")]
    AuthRequired(Backend),

    #[error("{backend} returned {status}: {message}")]
    Backend {
        backend: Backend,
        status: BackendStatus,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Password required for {0}")]
    PasswordRequired(String),

    #[error("Invalid password or corrupted file: {0}")]
    InvalidPassword(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Confirmation required before deleting {0}")]
    ConfirmationRequired(String),

    #[error("Another operation is in progress")]
    Busy,
}

impl StorageError {
    /// Status category, when the error came back from a networked backend.
    pub fn backend_status(&self) -> Option<BackendStatus> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_categories() {
        assert_eq!(BackendStatus::from_code(401), BackendStatus::Unauthorized);
        assert_eq!(BackendStatus::from_code(403), BackendStatus::Forbidden);
        assert_eq!(BackendStatus::from_code(404), BackendStatus::NotFound);
        assert_eq!(BackendStatus::from_code(400), BackendStatus::BadRequest);
        assert_eq!(BackendStatus::from_code(503), BackendStatus::Server(503));
        assert_eq!(BackendStatus::from_code(418), BackendStatus::Other(418));
        assert_eq!(BackendStatus::Server(502).code(), 502);
    }
}
