//! Core types and traits shared by the docstore crates.
//!
//! - `Document`: the persisted record and name validation
//! - `crypto`: passphrase encryption of document content
//! - `protection`: detection of protected content in both formats
//! - `RemoteRepository`: uniform contract for remote backends
//! - `CredentialProvider`: source of the bearer credential

pub mod crypto;
mod credential;
mod document;
mod error;
pub mod protection;
mod repository;

pub use credential::{Credential, CredentialProvider, StaticCredentials};
pub use crypto::CryptoError;
pub use document::{validate_name, Document, LAST_OPENED_KEY, RESERVED_NAMES};
pub use error::{BackendStatus, StorageError};
pub use protection::{classify, is_protected_content, CipherFormat, Protection};
pub use repository::{Ack, Backend, RemoteFile, RemoteFileRef, RemoteListing, RemoteRepository};
