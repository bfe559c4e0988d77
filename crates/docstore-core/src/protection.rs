//! Detection of password-protected content across both storage formats.

use serde::{Deserialize, Serialize};

/// Literal prefix carried by content written in the legacy protected format.
pub const LEGACY_MARKER: &str = "PROTECTED:";

/// How protected content is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherFormat {
    /// Ciphertext prefixed with [`LEGACY_MARKER`].
    Legacy,
    /// Bare ciphertext; protection is carried by the record flag.
    Current,
}

/// Classification of a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "format")]
pub enum Protection {
    Unprotected,
    Protected(CipherFormat),
}

impl Protection {
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Protected(_))
    }
}

/// True iff `content` starts with the legacy marker.
pub fn is_protected_content(content: &str) -> bool {
    content.starts_with(LEGACY_MARKER)
}

/// Classify a record from its out-of-band flag and its content.
///
/// The legacy prefix decides the format whenever it is present, even if the
/// flag was never set on the record.
pub fn classify(flag: bool, content: &str) -> Protection {
    if is_protected_content(content) {
        Protection::Protected(CipherFormat::Legacy)
    } else if flag {
        Protection::Protected(CipherFormat::Current)
    } else {
        Protection::Unprotected
    }
}

/// Remove the legacy marker if present.
pub fn strip_legacy_marker(content: &str) -> &str {
    content.strip_prefix(LEGACY_MARKER).unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_prefix_detection() {
        assert!(is_protected_content("PROTECTED:abc"));
        assert!(is_protected_content("PROTECTED:"));
        assert!(!is_protected_content("protected:abc"));
        assert!(!is_protected_content(" PROTECTED:abc"));
        assert!(!is_protected_content(""));
    }

    #[test]
    fn classification() {
        assert_eq!(classify(false, "plain"), Protection::Unprotected);
        assert_eq!(
            classify(true, "c2VhbGVk"),
            Protection::Protected(CipherFormat::Current)
        );
        assert_eq!(
            classify(false, "PROTECTED:c2VhbGVk"),
            Protection::Protected(CipherFormat::Legacy)
        );
        assert_eq!(
            classify(true, "PROTECTED:c2VhbGVk"),
            Protection::Protected(CipherFormat::Legacy)
        );
        assert!(!classify(false, "x").is_protected());
    }

    #[test]
    fn strip_marker() {
        assert_eq!(strip_legacy_marker("PROTECTED:abc"), "abc");
        assert_eq!(strip_legacy_marker("abc"), "abc");
    }
}
