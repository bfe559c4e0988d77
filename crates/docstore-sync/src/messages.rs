//! Mapping of storage errors to user-facing messages.
//!
//! The stores and adapters propagate errors unmodified; this is the only
//! place they are classified.

use docstore_core::{BackendStatus, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Auth,
    Permission,
    BadRequest,
    NotFound,
    Server,
    Password,
    Validation,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub category: ErrorCategory,
    pub text: String,
}

impl std::fmt::Display for UserMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

pub fn classify_error(err: &StorageError) -> UserMessage {
    let (category, text) = match err {
        StorageError::AuthRequired(backend) => (
            ErrorCategory::Auth,
            format!("Please sign in to use {}.", backend),
        ),
        StorageError::Backend {
            backend, status, ..
        } => match status {
            BackendStatus::Unauthorized => (
                ErrorCategory::Auth,
                format!("Your {} session has expired. Please sign in again.", backend),
            ),
            BackendStatus::Forbidden => (
                ErrorCategory::Permission,
                format!("You do not have permission to perform this action on {}.", backend),
            ),
            BackendStatus::BadRequest => (
                ErrorCategory::BadRequest,
                "The request was rejected. Check the file name and try again.".to_string(),
            ),
            BackendStatus::NotFound => (
                ErrorCategory::NotFound,
                format!("The file was not found on {}.", backend),
            ),
            BackendStatus::Server(_) => (
                ErrorCategory::Server,
                format!("{} is unavailable right now. Please try again later.", backend),
            ),
            BackendStatus::Other(_) => (
                ErrorCategory::Generic,
                format!("The operation on {} failed.", backend),
            ),
        },
        StorageError::PasswordRequired(_) => (
            ErrorCategory::Password,
            "This file is password protected. Enter the password to continue.".to_string(),
        ),
        StorageError::InvalidPassword(_) | StorageError::Crypto(_) => (
            ErrorCategory::Password,
            "Invalid password or corrupted file.".to_string(),
        ),
        StorageError::Validation(msg) => (ErrorCategory::Validation, capitalize(msg)),
        StorageError::NotFound(name) => (ErrorCategory::NotFound, format!("{} was not found.", name)),
        _ => (
            ErrorCategory::Generic,
            "Something went wrong. Please try again.".to_string(),
        ),
    };
    UserMessage { category, text }
}

fn capitalize(msg: &str) -> String {
    let mut chars = msg.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{Backend, CryptoError};

    fn backend_err(code: u16) -> StorageError {
        StorageError::Backend {
            backend: Backend::S3,
            status: BackendStatus::from_code(code),
            message: "x".to_string(),
        }
    }

    #[test]
    fn status_categories() {
        assert_eq!(classify_error(&backend_err(401)).category, ErrorCategory::Auth);
        assert_eq!(classify_error(&backend_err(403)).category, ErrorCategory::Permission);
        assert_eq!(classify_error(&backend_err(400)).category, ErrorCategory::BadRequest);
        assert_eq!(classify_error(&backend_err(404)).category, ErrorCategory::NotFound);
        assert_eq!(classify_error(&backend_err(502)).category, ErrorCategory::Server);
        assert_eq!(classify_error(&backend_err(409)).category, ErrorCategory::Generic);
    }

    #[test]
    fn crypto_distinct_from_backend() {
        let msg = classify_error(&StorageError::Crypto(CryptoError::DecryptionFailed));
        assert_eq!(msg.category, ErrorCategory::Password);
        let msg = classify_error(&StorageError::AuthRequired(Backend::Dropbox));
        assert_eq!(msg.category, ErrorCategory::Auth);
        assert!(msg.text.contains("dropbox"));
    }

    #[test]
    fn fallback_is_generic() {
        let msg = classify_error(&StorageError::Io("disk".into()));
        assert_eq!(msg.category, ErrorCategory::Generic);
        let msg = classify_error(&StorageError::Validation("file name must not be empty".into()));
        assert_eq!(msg.text, "File name must not be empty");
    }
}
