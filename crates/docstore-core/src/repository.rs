use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::StorageError;

/// Remote storage destinations.
///
/// Every backend except [`Backend::Ipfs`] is reached over authenticated HTTP.
/// `Ipfs` is served by a local embedded database and needs no credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    S3,
    R2,
    Dropbox,
    GoogleDrive,
    OneDrive,
    Ipfs,
}

impl Backend {
    pub const ALL: [Backend; 6] = [
        Backend::S3,
        Backend::R2,
        Backend::Dropbox,
        Backend::GoogleDrive,
        Backend::OneDrive,
        Backend::Ipfs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::S3 => "s3",
            Backend::R2 => "r2",
            Backend::Dropbox => "dropbox",
            Backend::GoogleDrive => "google_drive",
            Backend::OneDrive => "onedrive",
            Backend::Ipfs => "ipfs",
        }
    }

    /// Tag used to build RPC names, e.g. `listGoogleDriveFiles`.
    pub fn rpc_tag(&self) -> &'static str {
        match self {
            Backend::S3 => "S3",
            Backend::R2 => "R2",
            Backend::Dropbox => "Dropbox",
            Backend::GoogleDrive => "GoogleDrive",
            Backend::OneDrive => "OneDrive",
            Backend::Ipfs => "Ipfs",
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, Backend::Ipfs)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Backend::ALL
            .into_iter()
            .find(|b| b.as_str() == normalized)
            .ok_or_else(|| StorageError::InvalidArgument(format!("unknown backend: {}", s)))
    }
}

/// One file as reported by a backend listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRef {
    pub file_name: String,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub password_protected: bool,
}

/// Raw listing: regular and password-protected files, name -> timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteListing {
    #[serde(default)]
    pub files: BTreeMap<String, i64>,
    #[serde(default)]
    pub password_protected_files: BTreeMap<String, i64>,
}

impl RemoteListing {
    /// Merge both listings, ordered by name. The protected entry wins when a
    /// name appears in both.
    pub fn merged(&self) -> Vec<RemoteFileRef> {
        let mut merged: BTreeMap<&str, RemoteFileRef> = BTreeMap::new();
        for (name, ts) in &self.files {
            merged.insert(
                name.as_str(),
                RemoteFileRef {
                    file_name: name.clone(),
                    last_modified: *ts,
                    password_protected: false,
                },
            );
        }
        for (name, ts) in &self.password_protected_files {
            merged.insert(
                name.as_str(),
                RemoteFileRef {
                    file_name: name.clone(),
                    last_modified: *ts,
                    password_protected: true,
                },
            );
        }
        merged.into_values().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name) || self.password_protected_files.contains_key(name)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.password_protected_files.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.files.keys().chain(self.password_protected_files.keys())
    }

    pub fn len(&self) -> usize {
        self.merged().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.password_protected_files.is_empty()
    }
}

/// Content of a fetched file, exactly as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub file_name: String,
    pub content: String,
}

/// Acknowledgement of an upload or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}

/// Uniform contract implemented by every remote backend adapter.
///
/// The credential is passed explicitly on every call. Adapters for networked
/// backends must fail with [`StorageError::AuthRequired`] before doing any
/// I/O when it is `None`. This layer is transport only: content is stored and
/// returned verbatim, and the protection flag is whatever the caller says.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// The backend served by this adapter.
    fn backend(&self) -> Backend;

    /// List regular and password-protected files.
    async fn list_all(&self, credential: Option<&Credential>) -> Result<RemoteListing, StorageError>;

    /// Fetch a file's stored content.
    async fn get_file(
        &self,
        credential: Option<&Credential>,
        file_name: &str,
        is_password_protected: bool,
    ) -> Result<RemoteFile, StorageError>;

    /// Store content under `file_name`, replacing any existing file.
    async fn upload_file(
        &self,
        credential: Option<&Credential>,
        file_name: &str,
        content: &str,
        is_password_protected: bool,
    ) -> Result<Ack, StorageError>;

    /// Delete a file.
    async fn delete_file(
        &self,
        credential: Option<&Credential>,
        file_name: &str,
        is_password_protected: bool,
    ) -> Result<Ack, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_listing_prefers_protected() {
        let listing = RemoteListing {
            files: BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)]),
            password_protected_files: BTreeMap::from([("b".to_string(), 3), ("c".to_string(), 4)]),
        };
        let merged = listing.merged();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].file_name, "a");
        assert!(!merged[0].password_protected);
        assert_eq!(merged[1].file_name, "b");
        assert!(merged[1].password_protected);
        assert_eq!(merged[1].last_modified, 3);
        assert!(merged[2].password_protected);
        assert_eq!(listing.len(), 3);
        assert!(listing.contains("c"));
        assert!(!listing.contains("d"));
    }

    #[test]
    fn listing_wire_shape() {
        let raw = r#"{"files":{"x.txt":10},"passwordProtectedFiles":{"y.txt":20}}"#;
        let listing: RemoteListing = serde_json::from_str(raw).unwrap();
        assert!(listing.is_protected("y.txt"));
        assert!(!listing.is_protected("x.txt"));

        let empty: RemoteListing = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("s3".parse::<Backend>().unwrap(), Backend::S3);
        assert_eq!("Google-Drive".parse::<Backend>().unwrap(), Backend::GoogleDrive);
        assert!("ftp".parse::<Backend>().is_err());
        assert!(!Backend::Ipfs.requires_credential());
        assert!(Backend::ALL
            .iter()
            .filter(|b| **b != Backend::Ipfs)
            .all(|b| b.requires_credential()));
    }
}
