use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docstore_core::Backend;
use docstore_sync::Resolution;

/// Configuration for the docstore CLI.
#[derive(Parser, Debug, Clone)]
#[command(name = "docstore")]
#[command(about = "Move documents between the local store and remote backends")]
pub struct Config {
    /// Base directory of the local document store
    #[arg(long, env = "DOCSTORE_DIR")]
    pub dir: Option<PathBuf>,

    /// SQLite database backing the embedded (ipfs) backend
    #[arg(long, env = "DOCSTORE_EMBEDDED_DB")]
    pub embedded_db: Option<PathBuf>,

    /// Bearer token for the networked backends
    #[arg(long, env = "DOCSTORE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Base URL of the S3 storage endpoint
    #[arg(long, env = "DOCSTORE_S3_URL")]
    pub s3_url: Option<String>,

    /// Base URL of the R2 storage endpoint
    #[arg(long, env = "DOCSTORE_R2_URL")]
    pub r2_url: Option<String>,

    /// Base URL of the Dropbox storage endpoint
    #[arg(long, env = "DOCSTORE_DROPBOX_URL")]
    pub dropbox_url: Option<String>,

    /// Base URL of the Google Drive storage endpoint
    #[arg(long, env = "DOCSTORE_GOOGLE_DRIVE_URL")]
    pub google_drive_url: Option<String>,

    /// Base URL of the OneDrive storage endpoint
    #[arg(long, env = "DOCSTORE_ONEDRIVE_URL")]
    pub onedrive_url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30", env = "DOCSTORE_HTTP_TIMEOUT")]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Get the effective local store directory.
    pub fn effective_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docstore")
                .join("documents")
        })
    }

    /// Get the effective embedded database path.
    pub fn effective_embedded_db(&self) -> PathBuf {
        self.embedded_db.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docstore")
                .join("embedded.db")
        })
    }

    /// Networked backends that have a base URL configured.
    pub fn backend_urls(&self) -> Vec<(Backend, &str)> {
        [
            (Backend::S3, &self.s3_url),
            (Backend::R2, &self.r2_url),
            (Backend::Dropbox, &self.dropbox_url),
            (Backend::GoogleDrive, &self.google_drive_url),
            (Backend::OneDrive, &self.onedrive_url),
        ]
        .into_iter()
        .filter_map(|(backend, url)| url.as_deref().map(|url| (backend, url)))
        .collect()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the files of a backend
    List { backend: Backend },

    /// List the documents of the local store
    LocalList,

    /// Move files from a backend to the local store (all when none named)
    Download {
        backend: Backend,
        names: Vec<String>,
        #[arg(long, default_value = "cancel")]
        on_conflict: OnConflict,
    },

    /// Move local documents to a backend (all when none named)
    Upload {
        backend: Backend,
        names: Vec<String>,
        #[arg(long, default_value = "cancel")]
        on_conflict: OnConflict,
    },

    /// Upload a file from disk to a backend under a document name
    Push {
        backend: Backend,
        path: PathBuf,
        /// Document name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },

    /// Copy files from one backend to another (all when none named)
    Migrate {
        from: Backend,
        to: Backend,
        names: Vec<String>,
        #[arg(long, default_value = "cancel")]
        on_conflict: OnConflict,
    },

    /// Delete a file from a backend
    Delete {
        backend: Backend,
        name: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Print a document, from the local store or from a backend
    Open {
        name: String,
        #[arg(long)]
        backend: Option<Backend>,
        #[arg(long, env = "DOCSTORE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

/// Resolution applied when a batch collides with its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OnConflict {
    Skip,
    Overwrite,
    Cancel,
}

impl From<OnConflict> for Resolution {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Skip => Resolution::SkipConflicts,
            OnConflict::Overwrite => Resolution::OverwriteAll,
            OnConflict::Cancel => Resolution::Cancel,
        }
    }
}

impl std::fmt::Display for OnConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnConflict::Skip => write!(f, "skip"),
            OnConflict::Overwrite => write!(f, "overwrite"),
            OnConflict::Cancel => write!(f, "cancel"),
        }
    }
}
