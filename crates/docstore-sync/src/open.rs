//! Decrypt-on-open flow shared by local and remote documents.

use docstore_core::Backend;

/// The editing engine, seen only through its load/serialize hooks.
pub trait EditorBridge: Send + Sync {
    /// Serialize the document currently in the editor.
    fn serialize_current(&self) -> String;

    /// Local name of the document currently in the editor, if it has one.
    fn current_name(&self) -> Option<String>;

    /// Replace the editor contents with `content`.
    fn load_document(&self, name: &str, content: &str);
}

/// Where a pending document was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOrigin {
    Local,
    Remote(Backend),
}

/// A protected document held as ciphertext until a password is supplied.
///
/// Only the name is meant for display; the ciphertext is never interpreted
/// before decryption succeeds.
#[derive(Clone)]
pub struct PendingDecryption {
    pub name: String,
    pub origin: OpenOrigin,
    pub(crate) ciphertext: String,
}

impl std::fmt::Debug for PendingDecryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDecryption")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum OpenOutcome {
    /// Content was handed to the editor.
    Loaded { name: String },
    /// A password is needed before the content can be loaded.
    NeedsPassword(PendingDecryption),
}
