use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docstore_core::protection::{self, classify};
use docstore_core::{crypto, validate_name, Document, StorageError, LAST_OPENED_KEY};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, instrument, warn};

const ENTRY_EXT: &str = "json";

/// Encrypted key/value document store on the local filesystem.
///
/// Every key is one file in a single directory:
/// ```text
/// {base_dir}/
///   {sha256(name)}.json     # document record (JSON)
///   {sha256(pointer)}.json  # last-opened pointer (plain string)
/// ```
///
/// File names are fixed-length digests of the key; the record's `name` field
/// is the source of truth for listing. Protected documents are kept as
/// ciphertext; `get` never decrypts.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `base_dir`. The directory is created lazily.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.base_dir.join(format!("{}.{}", digest, ENTRY_EXT))
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            StorageError::Io(format!(
                "Failed to create store dir {}: {}",
                self.base_dir.display(),
                e
            ))
        })
    }

    /// Write a key atomically via temp file.
    async fn write_key(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_dir().await?;
        let path = self.key_path(key);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, value).await.map_err(|e| {
            StorageError::Io(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        fs::rename(&temp_path, &path).await.map_err(|e| {
            StorageError::Io(format!("Failed to rename to {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    async fn read_key(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::read_path(&self.key_path(key)).await
    }

    async fn read_path(path: &Path) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn remove_key(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.key_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Persist a document.
    ///
    /// When the document is protected, carries a password and
    /// `encrypt_on_write` is set, the content is replaced by its ciphertext.
    /// Content fetched from a remote backend is saved with
    /// `encrypt_on_write = false` so it lands exactly as fetched.
    ///
    /// `created_at` of an existing record is preserved; `modified_at` is
    /// always bumped. Returns the record as written.
    #[instrument(skip(self, document), level = "debug", fields(name = %document.name, content_len = document.content.len()))]
    pub async fn save(
        &self,
        document: &Document,
        encrypt_on_write: bool,
    ) -> Result<Document, StorageError> {
        validate_name(&document.name)?;

        let mut record = document.clone();
        match self.try_get(&document.name).await {
            Ok(Some(existing)) => record.created_at = existing.created_at,
            Ok(None) | Err(StorageError::Serialization(_)) => {}
            Err(e) => return Err(e),
        }
        record.modified_at = Utc::now();

        if record.is_password_protected && encrypt_on_write {
            if let Some(password) = record.password.as_deref() {
                record.content = crypto::encrypt(&record.content, password)?;
            }
        }

        let json = serde_json::to_string(&record).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize {}: {}", record.name, e))
        })?;
        self.write_key(&record.name, &json).await?;

        debug!(
            "Saved {} ({} bytes, protected: {})",
            record.name,
            record.content.len(),
            record.is_password_protected
        );
        Ok(record)
    }

    /// Read a record; `Ok(None)` when the key is absent, error when unparseable.
    async fn try_get(&self, name: &str) -> Result<Option<Document>, StorageError> {
        match self.read_key(name).await? {
            Some(json) => parse_record(name, &json).map(Some),
            None => Ok(None),
        }
    }

    /// Stored record verbatim; protected content stays ciphertext.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, name: &str) -> Result<Document, StorageError> {
        match self.try_get(name).await {
            Ok(Some(doc)) => Ok(doc),
            Ok(None) => Err(StorageError::NotFound(name.to_string())),
            Err(StorageError::Serialization(msg)) => {
                warn!("Unreadable record {}: {}", name, msg);
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Read a record and decrypt it if it is protected (either format).
    #[instrument(skip(self, password), level = "debug")]
    pub async fn get_with_password(
        &self,
        name: &str,
        password: Option<&str>,
    ) -> Result<Document, StorageError> {
        let mut doc = self.get(name).await?;
        if !classify(doc.is_password_protected, &doc.content).is_protected() {
            return Ok(doc);
        }

        let password = password.ok_or_else(|| StorageError::PasswordRequired(name.to_string()))?;
        doc.content = crypto::decrypt(&doc.content, password).map_err(|e| {
            debug!("Decryption of {} failed: {}", name, e);
            StorageError::InvalidPassword(name.to_string())
        })?;
        doc.is_password_protected = true;
        doc.password = Some(password.to_string());
        Ok(doc)
    }

    /// Like [`get_with_password`](Self::get_with_password) with a mandatory password.
    pub async fn get_protected(&self, name: &str, password: &str) -> Result<Document, StorageError> {
        self.get_with_password(name, Some(password)).await
    }

    /// Every stored document name with its modification time.
    ///
    /// The last-opened pointer is never reported. Entries that cannot be
    /// parsed are skipped.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_all(&self) -> Result<BTreeMap<String, DateTime<Utc>>, StorageError> {
        let mut listing = BTreeMap::new();
        let pointer = self.key_path(LAST_OPENED_KEY);
        if !self.base_dir.exists() {
            return Ok(listing);
        }

        let mut entries = fs::read_dir(&self.base_dir).await.map_err(|e| {
            StorageError::Io(format!(
                "Failed to read dir {}: {}",
                self.base_dir.display(),
                e
            ))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io(format!("Failed to read dir entry: {}", e)))?
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
                continue;
            }
            if path == pointer {
                continue;
            }

            let parsed = match Self::read_path(&path).await {
                Ok(Some(json)) => parse_record(&path.display().to_string(), &json),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            match parsed {
                Ok(doc) => {
                    listing.insert(doc.name, doc.modified_at);
                }
                Err(e) => warn!("Skipping unreadable entry {}: {}", path.display(), e),
            }
        }

        debug!("Listed {} local documents", listing.len());
        Ok(listing)
    }

    /// Delete a document. Returns whether it existed.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        validate_name(name)?;
        let existed = self.remove_key(name).await?;
        debug!("Deleted {} (existed: {})", name, existed);
        Ok(existed)
    }

    pub async fn check_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.key_path(name).exists())
    }

    // =========================================================================
    // Last-Opened Pointer
    // =========================================================================

    pub async fn save_last_opened(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        self.write_key(LAST_OPENED_KEY, name).await
    }

    pub async fn get_last_opened(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .read_key(LAST_OPENED_KEY)
            .await?
            .filter(|name| !name.is_empty()))
    }

    pub async fn clear_last_opened(&self) -> Result<(), StorageError> {
        self.remove_key(LAST_OPENED_KEY).await?;
        Ok(())
    }

    // =========================================================================
    // Protection
    // =========================================================================

    /// Pure textual test for the legacy protected format.
    pub fn is_protected_content(content: &str) -> bool {
        protection::is_protected_content(content)
    }

    /// Whether a stored document is protected. Read failures count as
    /// unprotected.
    pub async fn is_file_protected(&self, name: &str) -> bool {
        match self.get(name).await {
            Ok(doc) => doc.protection().is_protected(),
            Err(e) => {
                debug!("Protection check for {} failed: {}", name, e);
                false
            }
        }
    }

    /// Change, add or remove the password of a stored document.
    ///
    /// `current_password` is required when the document is protected.
    /// `new_password = None` stores the plaintext unprotected.
    #[instrument(skip(self, current_password, new_password), level = "debug")]
    pub async fn set_protection(
        &self,
        name: &str,
        current_password: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<Document, StorageError> {
        let mut doc = self.get_with_password(name, current_password).await?;
        match new_password {
            Some(password) if !password.is_empty() => {
                doc = doc.with_password(password);
                self.save(&doc, true).await
            }
            Some(_) => Err(StorageError::Validation("password must not be empty".to_string())),
            None => {
                doc.is_password_protected = false;
                doc.password = None;
                self.save(&doc, false).await
            }
        }
    }
}

fn parse_record(name: &str, json: &str) -> Result<Document, StorageError> {
    serde_json::from_str(json)
        .map_err(|e| StorageError::Serialization(format!("Failed to parse {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::protection::LEGACY_MARKER;
    use tempfile::TempDir;

    fn setup() -> (LocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().join("docs"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_document_crud() {
        let (store, _temp) = setup();

        assert!(!store.check_exists("inv-1").await.unwrap());
        assert!(matches!(store.get("inv-1").await, Err(StorageError::NotFound(_))));

        let saved = store
            .save(&Document::new("inv-1", "<bill/>", 1), true)
            .await
            .unwrap();
        assert_eq!(saved.content, "<bill/>");
        assert!(store.check_exists("inv-1").await.unwrap());

        let loaded = store.get("inv-1").await.unwrap();
        assert_eq!(loaded.content, "<bill/>");
        assert_eq!(loaded.bill_type, 1);

        assert!(store.delete("inv-1").await.unwrap());
        assert!(!store.delete("inv-1").await.unwrap());
        assert!(!store.check_exists("inv-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_resave_preserves_created() {
        let (store, _temp) = setup();
        let first = store.save(&Document::new("a", "v1", 0), true).await.unwrap();

        let mut second = Document::new("a", "v2", 0);
        second.created_at = Utc::now() + chrono::Duration::days(1);
        let second = store.save(&second, true).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.modified_at >= first.modified_at);
        assert_eq!(store.get("a").await.unwrap().content, "v2");
    }

    #[tokio::test]
    async fn test_reserved_names_rejected() {
        let (store, _temp) = setup();
        for name in ["", "default", LAST_OPENED_KEY] {
            let result = store.save(&Document::new(name, "x", 0), true).await;
            assert!(matches!(result, Err(StorageError::Validation(_))), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_protected_save_and_read() {
        let (store, _temp) = setup();
        let doc = Document::new("secret", "total: 100", 0).with_password("pw");
        store.save(&doc, true).await.unwrap();

        let raw = store.get("secret").await.unwrap();
        assert!(raw.is_password_protected);
        assert_ne!(raw.content, "total: 100");
        assert_eq!(raw.password.as_deref(), Some("pw"));

        let opened = store.get_with_password("secret", Some("pw")).await.unwrap();
        assert_eq!(opened.content, "total: 100");
        assert_eq!(store.get_protected("secret", "pw").await.unwrap().content, "total: 100");

        assert!(matches!(
            store.get_with_password("secret", None).await,
            Err(StorageError::PasswordRequired(_))
        ));
        assert!(matches!(
            store.get_with_password("secret", Some("nope")).await,
            Err(StorageError::InvalidPassword(_))
        ));
        assert!(store.is_file_protected("secret").await);
    }

    #[tokio::test]
    async fn test_save_without_encryption_keeps_content() {
        let (store, _temp) = setup();
        let sealed = crypto::encrypt("fetched", "pw").unwrap();
        let mut doc = Document::new("remote", sealed.clone(), 0);
        doc.is_password_protected = true;

        store.save(&doc, false).await.unwrap();
        assert_eq!(store.get("remote").await.unwrap().content, sealed);
        assert_eq!(
            store.get_protected("remote", "pw").await.unwrap().content,
            "fetched"
        );
    }

    #[tokio::test]
    async fn test_legacy_format_detected_and_decrypted() {
        let (store, _temp) = setup();
        let legacy = crypto::encrypt_legacy("old bill", "pw").unwrap();
        // legacy records never carried the flag
        store
            .save(&Document::new("old", legacy, 0), true)
            .await
            .unwrap();

        assert!(store.is_file_protected("old").await);
        assert!(LocalStore::is_protected_content(&store.get("old").await.unwrap().content));
        let opened = store.get_with_password("old", Some("pw")).await.unwrap();
        assert_eq!(opened.content, "old bill");
    }

    #[tokio::test]
    async fn test_is_file_protected_on_missing() {
        let (store, _temp) = setup();
        assert!(!store.is_file_protected("ghost").await);
        assert!(LocalStore::is_protected_content(&format!("{}abc", LEGACY_MARKER)));
        assert!(!LocalStore::is_protected_content("abc"));
    }

    #[tokio::test]
    async fn test_list_all_skips_pointer_and_corrupt_entries() {
        let (store, _temp) = setup();
        store.save(&Document::new("good.txt", "ok", 0), true).await.unwrap();
        store.save_last_opened("good.txt").await.unwrap();
        fs::write(store.key_path("broken.txt"), "{not json").await.unwrap();

        let listing = store.list_all().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing.contains_key("good.txt"));
        assert!(!listing.contains_key(LAST_OPENED_KEY));
        assert!(matches!(store.get("broken.txt").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_all_on_missing_dir() {
        let (store, _temp) = setup();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_names_with_separators() {
        let (store, _temp) = setup();
        let name = "2024/Q1 report?.txt";
        store.save(&Document::new(name, "q1", 0), true).await.unwrap();
        assert_eq!(store.get(name).await.unwrap().content, "q1");
        assert!(store.list_all().await.unwrap().contains_key(name));
    }

    #[tokio::test]
    async fn test_long_non_ascii_name() {
        let (store, _temp) = setup();
        let name = "é".repeat(50) + &"प्रतिवेदन".repeat(10);
        store.save(&Document::new(name.clone(), "x", 0), true).await.unwrap();

        assert!(store.check_exists(&name).await.unwrap());
        assert_eq!(store.get(&name).await.unwrap().content, "x");
        assert!(store.list_all().await.unwrap().contains_key(&name));
        assert!(store.delete(&name).await.unwrap());
        assert!(!store.check_exists(&name).await.unwrap());
    }

    #[tokio::test]
    async fn test_names_differing_in_case_are_distinct() {
        let (store, _temp) = setup();
        store.save(&Document::new("Report.txt", "upper", 0), true).await.unwrap();
        store.save(&Document::new("report.txt", "lower", 0), true).await.unwrap();

        assert_eq!(store.get("Report.txt").await.unwrap().content, "upper");
        assert_eq!(store.get("report.txt").await.unwrap().content, "lower");
        let listing = store.list_all().await.unwrap();
        assert_eq!(listing.len(), 2);
    }

    #[tokio::test]
    async fn test_last_opened_pointer() {
        let (store, _temp) = setup();
        assert_eq!(store.get_last_opened().await.unwrap(), None);

        store.save_last_opened("inv-7").await.unwrap();
        assert_eq!(store.get_last_opened().await.unwrap().as_deref(), Some("inv-7"));
        let raw = fs::read_to_string(store.key_path(LAST_OPENED_KEY)).await.unwrap();
        assert_eq!(raw, "inv-7");

        store.clear_last_opened().await.unwrap();
        assert_eq!(store.get_last_opened().await.unwrap(), None);
        store.clear_last_opened().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_protection() {
        let (store, _temp) = setup();
        store.save(&Document::new("n", "plain", 0), true).await.unwrap();

        store.set_protection("n", None, Some("one")).await.unwrap();
        assert!(store.is_file_protected("n").await);
        assert_eq!(store.get_protected("n", "one").await.unwrap().content, "plain");

        store.set_protection("n", Some("one"), Some("two")).await.unwrap();
        assert!(matches!(
            store.get_protected("n", "one").await,
            Err(StorageError::InvalidPassword(_))
        ));

        let cleared = store.set_protection("n", Some("two"), None).await.unwrap();
        assert!(!cleared.is_password_protected);
        assert_eq!(store.get("n").await.unwrap().content, "plain");
        assert!(store.get("n").await.unwrap().password.is_none());
    }
}
