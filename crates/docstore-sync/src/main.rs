mod config;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use docstore_core::{Backend, StaticCredentials, StorageError};
use docstore_local::LocalStore;
use docstore_remote::{EmbeddedRepository, HttpRepository, RepositoryRegistry};
use docstore_sync::{
    classify_error, BatchOutcome, BatchPlan, EditorBridge, OpenOutcome, Resolution,
    SyncOrchestrator,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Command, Config, OnConflict};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let dir = config.effective_dir();
    debug!("Local store dir: {}", dir.display());
    let local = LocalStore::new(&dir);
    let registry = build_registry(&config)?;
    info!("Configured backends: {:?}", registry.backends());

    let credentials = Arc::new(StaticCredentials::new(config.token.clone()));
    let mut orchestrator = SyncOrchestrator::new(local, registry, credentials);

    // Ctrl+C stops a running batch after the current file
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current file");
            cancel.cancel();
        }
    });

    let outcome = match run(config.command, &mut orchestrator).await {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!("Command failed: {:?}", e);
            anyhow::bail!("{}", classify_error(&e));
        }
    };
    match outcome {
        Some(outcome) => report(&outcome),
        None => Ok(()),
    }
}

fn build_registry(config: &Config) -> anyhow::Result<RepositoryRegistry> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut registry = RepositoryRegistry::new();
    for (backend, url) in config.backend_urls() {
        registry.register(Arc::new(HttpRepository::with_timeout(backend, url, timeout)?));
    }

    let db = config.effective_embedded_db();
    debug!("Embedded database: {}", db.display());
    registry.register(Arc::new(EmbeddedRepository::open(&db)?));
    Ok(registry)
}

/// Run one subcommand. Batch subcommands return their outcome.
async fn run(
    command: Command,
    orchestrator: &mut SyncOrchestrator,
) -> Result<Option<BatchOutcome>, StorageError> {
    let outcome = match command {
        Command::List { backend } => {
            orchestrator.switch_backend(backend).await?;
            for file in orchestrator.files() {
                let modified = chrono::DateTime::from_timestamp_millis(file.last_modified)
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_default();
                let marker = if file.password_protected { "protected" } else { "" };
                println!("{}\t{}\t{}", file.file_name, modified, marker);
            }
            None
        }
        Command::LocalList => {
            for (name, modified) in orchestrator.local().list_all().await? {
                println!("{}\t{}", name, modified.to_rfc3339());
            }
            None
        }
        Command::Download {
            backend,
            names,
            on_conflict,
        } => {
            orchestrator.switch_backend(backend).await?;
            select(orchestrator, &names)?;
            let plan = orchestrator.prepare_move_to_local().await?;
            commit(orchestrator, plan, on_conflict).await?
        }
        Command::Upload {
            backend,
            names,
            on_conflict,
        } => {
            orchestrator.switch_backend(backend).await?;
            let names = if names.is_empty() {
                orchestrator.local().list_all().await?.into_keys().collect()
            } else {
                names
            };
            let plan = orchestrator.prepare_move_to_server(&names).await?;
            commit(orchestrator, plan, on_conflict).await?
        }
        Command::Push {
            backend,
            path,
            name,
        } => {
            let name = match name {
                Some(name) => name,
                None => file_name_of(&path)?,
            };
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let editor = FileEditor {
                name: name.clone(),
                content,
            };
            orchestrator.switch_backend(backend).await?;
            orchestrator.upload_current(&editor, &name).await?;
            info!("Uploaded {} to {}", name, backend);
            None
        }
        Command::Migrate {
            from,
            to,
            names,
            on_conflict,
        } => {
            orchestrator.switch_backend(from).await?;
            select(orchestrator, &names)?;
            let plan = orchestrator.prepare_migration(to).await?;
            commit(orchestrator, plan, on_conflict).await?
        }
        Command::Delete { backend, name, yes } => {
            orchestrator.switch_backend(backend).await?;
            orchestrator.delete(&name, yes).await?;
            info!("Deleted {} from {}", name, backend);
            None
        }
        Command::Open {
            name,
            backend,
            password,
        } => {
            open(orchestrator, &name, backend, password).await?;
            None
        }
    };
    Ok(outcome)
}

/// Select `names` on the active backend, or every file when empty.
fn select(orchestrator: &mut SyncOrchestrator, names: &[String]) -> Result<(), StorageError> {
    if names.is_empty() {
        return orchestrator.select_all();
    }
    for name in names {
        orchestrator.toggle_selection(name)?;
    }
    Ok(())
}

async fn commit(
    orchestrator: &mut SyncOrchestrator,
    plan: BatchPlan,
    on_conflict: OnConflict,
) -> Result<Option<BatchOutcome>, StorageError> {
    let resolution = if plan.has_conflicts() {
        warn!(
            "{} file(s) already exist at the destination: {}",
            plan.conflicts.len(),
            plan.conflicts.names().join(", ")
        );
        info!("Applying --on-conflict {}", on_conflict);
        Resolution::from(on_conflict)
    } else {
        Resolution::OverwriteAll
    };

    let outcome = orchestrator.execute(plan, resolution).await?;
    if outcome.is_none() {
        info!("Nothing transferred");
    }
    Ok(outcome)
}

/// Print per-file results. A batch with failed or unstarted files is an error.
fn report(outcome: &BatchOutcome) -> anyhow::Result<()> {
    for name in &outcome.succeeded {
        println!("ok\t{}", name);
    }
    for failure in &outcome.failed {
        println!("failed\t{}\t{}", failure.name, failure.message);
    }
    for name in &outcome.skipped {
        println!("skipped\t{}", name);
    }
    if !outcome.is_complete_success() {
        anyhow::bail!(
            "{} succeeded, {} failed, {} not started",
            outcome.succeeded_count(),
            outcome.failed_count(),
            outcome.skipped.len()
        );
    }
    Ok(())
}

async fn open(
    orchestrator: &mut SyncOrchestrator,
    name: &str,
    backend: Option<Backend>,
    password: Option<String>,
) -> Result<(), StorageError> {
    let editor = StdoutEditor;
    let outcome = match backend {
        Some(backend) => {
            orchestrator.switch_backend(backend).await?;
            let file = orchestrator
                .files()
                .into_iter()
                .find(|f| f.file_name == name)
                .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
            orchestrator.open_remote(&editor, &file).await?
        }
        None => orchestrator.open_local(&editor, name).await?,
    };

    if let OpenOutcome::NeedsPassword(pending) = outcome {
        let password = password.ok_or_else(|| StorageError::PasswordRequired(name.to_string()))?;
        orchestrator
            .submit_password(&editor, &pending, &password)
            .await?;
    }
    Ok(())
}

fn file_name_of(path: &Path) -> Result<String, StorageError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            StorageError::InvalidArgument(format!("{} has no file name", path.display()))
        })
}

/// Editor backed by a file read from disk.
struct FileEditor {
    name: String,
    content: String,
}

impl EditorBridge for FileEditor {
    fn serialize_current(&self) -> String {
        self.content.clone()
    }

    fn current_name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn load_document(&self, _name: &str, _content: &str) {}
}

/// Editor that prints loaded documents.
struct StdoutEditor;

impl EditorBridge for StdoutEditor {
    fn serialize_current(&self) -> String {
        String::new()
    }

    fn current_name(&self) -> Option<String> {
        None
    }

    fn load_document(&self, _name: &str, content: &str) {
        println!("{}", content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_sync::BatchFailure;

    #[test]
    fn complete_batch_reports_success() {
        let outcome = BatchOutcome {
            succeeded: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert!(report(&outcome).is_ok());
    }

    #[test]
    fn partial_batch_reports_failure() {
        let outcome = BatchOutcome {
            succeeded: vec!["one".to_string(), "three".to_string()],
            failed: vec![BatchFailure {
                name: "two".to_string(),
                message: "unavailable".to_string(),
            }],
            skipped: Vec::new(),
        };
        let err = report(&outcome).unwrap_err();
        assert_eq!(err.to_string(), "2 succeeded, 1 failed, 0 not started");
    }

    #[test]
    fn cancelled_batch_reports_failure() {
        let outcome = BatchOutcome {
            succeeded: vec!["a".to_string()],
            skipped: vec!["b".to_string()],
            ..Default::default()
        };
        assert!(report(&outcome).is_err());
    }
}
