use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::protection::{classify, Protection};

/// Key under which the last-opened document name is stored.
pub const LAST_OPENED_KEY: &str = "__last_opened_file__";

/// Names that can never be used for a document.
pub const RESERVED_NAMES: [&str; 2] = ["default", LAST_OPENED_KEY];

/// A named document as persisted by the local store.
///
/// Serialized field names follow the on-disk record layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "modified")]
    pub modified_at: DateTime<Utc>,
    pub content: String,
    #[serde(rename = "billType", default)]
    pub bill_type: u8,
    #[serde(rename = "isPasswordProtected", default)]
    pub is_password_protected: bool,
    #[serde(default)]
    pub password: Option<String>,
}

impl Document {
    /// A new unprotected document stamped with the current time.
    pub fn new(name: impl Into<String>, content: impl Into<String>, bill_type: u8) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            created_at: now,
            modified_at: now,
            content: content.into(),
            bill_type,
            is_password_protected: false,
            password: None,
        }
    }

    /// Mark the document as protected by `password`.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.is_password_protected = true;
        self.password = Some(password.into());
        self
    }

    pub fn protection(&self) -> Protection {
        classify(self.is_password_protected, &self.content)
    }
}

/// Reject names that are empty, whitespace-only or reserved.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.trim().is_empty() {
        return Err(StorageError::Validation("file name must not be empty".to_string()));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(StorageError::Validation(format!("'{}' is a reserved name", name)));
    }
    Ok(())
}
