use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docstore_core::{
    Ack, Backend, BackendStatus, Credential, RemoteFile, RemoteListing, RemoteRepository,
    StorageError,
};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    fileName            TEXT PRIMARY KEY NOT NULL,
    fileContent         TEXT NOT NULL,
    isPasswordProtected INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    modified_at         TEXT NOT NULL
);
";

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Io(format!("Embedded store error: {}", e))
}

/// Local indexed database standing in for the decentralized backend.
///
/// One record per file name:
/// `{fileName, fileContent, isPasswordProtected, created_at, modified_at}`.
/// No credential is needed; calls go straight to SQLite.
pub struct EmbeddedRepository {
    backend: Backend,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for EmbeddedRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedRepository")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl EmbeddedRepository {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        Self::from_connection(Connection::open(path).map_err(db_err)?)
    }

    /// Volatile database, used by tests and dry runs.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            backend: Backend::Ipfs,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Io("Embedded store lock poisoned".to_string()))
    }

    fn not_found(&self, file_name: &str) -> StorageError {
        StorageError::Backend {
            backend: self.backend,
            status: BackendStatus::NotFound,
            message: format!("{} does not exist", file_name),
        }
    }
}

fn to_millis(raw: &str) -> i64 {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

#[async_trait]
impl RemoteRepository for EmbeddedRepository {
    fn backend(&self) -> Backend {
        self.backend
    }

    #[instrument(skip(self, _credential), level = "debug")]
    async fn list_all(&self, _credential: Option<&Credential>) -> Result<RemoteListing, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT fileName, isPasswordProtected, modified_at FROM files")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut listing = RemoteListing::default();
        for row in rows {
            let (name, protected, modified) = row.map_err(db_err)?;
            let target = if protected {
                &mut listing.password_protected_files
            } else {
                &mut listing.files
            };
            target.insert(name, to_millis(&modified));
        }

        debug!("Listed {} embedded files", listing.len());
        Ok(listing)
    }

    #[instrument(skip(self, _credential), level = "debug")]
    async fn get_file(
        &self,
        _credential: Option<&Credential>,
        file_name: &str,
        _is_password_protected: bool,
    ) -> Result<RemoteFile, StorageError> {
        let conn = self.conn()?;
        let content: Option<String> = conn
            .query_row(
                "SELECT fileContent FROM files WHERE fileName = ?1",
                params![file_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let content = content.ok_or_else(|| self.not_found(file_name))?;
        Ok(RemoteFile {
            file_name: file_name.to_string(),
            content,
        })
    }

    #[instrument(skip(self, _credential, content), level = "debug", fields(content_len = content.len()))]
    async fn upload_file(
        &self,
        _credential: Option<&Credential>,
        file_name: &str,
        content: &str,
        is_password_protected: bool,
    ) -> Result<Ack, StorageError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (fileName, fileContent, isPasswordProtected, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(fileName) DO UPDATE SET
                fileContent = excluded.fileContent,
                isPasswordProtected = excluded.isPasswordProtected,
                modified_at = excluded.modified_at",
            params![file_name, content, is_password_protected, now],
        )
        .map_err(db_err)?;

        debug!("Stored {} in embedded store ({} bytes)", file_name, content.len());
        Ok(Ack::ok(format!("{} stored", file_name)))
    }

    #[instrument(skip(self, _credential), level = "debug")]
    async fn delete_file(
        &self,
        _credential: Option<&Credential>,
        file_name: &str,
        _is_password_protected: bool,
    ) -> Result<Ack, StorageError> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM files WHERE fileName = ?1", params![file_name])
            .map_err(db_err)?;
        if removed == 0 {
            return Err(self.not_found(file_name));
        }
        debug!("Deleted {} from embedded store", file_name);
        Ok(Ack::ok(format!("{} deleted", file_name)))
    }
}
