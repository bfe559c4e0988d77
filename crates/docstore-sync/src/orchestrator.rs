use std::collections::BTreeSet;
use std::sync::Arc;

use docstore_core::{
    crypto, validate_name, Ack, Backend, Credential, CredentialProvider, Document, RemoteFileRef,
    RemoteListing, RemoteRepository, StorageError,
};
use docstore_local::LocalStore;
use docstore_remote::RepositoryRegistry;
use tracing::{debug, info, instrument, warn};

use crate::batch::{run_sequential, BatchItem, BatchKind, BatchOutcome, BatchPlan, CancelHandle};
use crate::conflict::{detect_conflicts, Resolution};
use crate::open::{EditorBridge, OpenOrigin, OpenOutcome, PendingDecryption};

/// Long-running operation in progress on the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Uploading,
    Downloading,
    Migrating,
    Deleting,
}

/// Session state of the orchestrator.
///
/// ```text
/// Idle -> Loading(b) -> Loaded(b) -> Busy(b, op) -> Loaded(b)
///                       Loaded(x) -> Loading(y) -> Loaded(y)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Loading(Backend),
    Loaded {
        backend: Backend,
        listing: RemoteListing,
    },
    Busy {
        backend: Backend,
        operation: Operation,
        listing: RemoteListing,
    },
}

impl SessionState {
    pub fn backend(&self) -> Option<Backend> {
        match self {
            SessionState::Idle => None,
            SessionState::Loading(b) => Some(*b),
            SessionState::Loaded { backend, .. } | SessionState::Busy { backend, .. } => {
                Some(*backend)
            }
        }
    }

    pub fn listing(&self) -> Option<&RemoteListing> {
        match self {
            SessionState::Loaded { listing, .. } | SessionState::Busy { listing, .. } => {
                Some(listing)
            }
            _ => None,
        }
    }
}

/// Coordinates the local store with the remote backends.
///
/// Owns the session state machine and the Selection Set of the active
/// backend tab. Every operation runs to completion before the next one
/// starts, and batch items are processed one at a time.
pub struct SyncOrchestrator {
    local: LocalStore,
    registry: RepositoryRegistry,
    credentials: Arc<dyn CredentialProvider>,
    state: SessionState,
    selection: BTreeSet<String>,
    cancel: CancelHandle,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("local", &self.local)
            .field("registry", &self.registry)
            .field("state", &self.state)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    pub fn new(
        local: LocalStore,
        registry: RepositoryRegistry,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            local,
            registry,
            credentials,
            state: SessionState::Idle,
            selection: BTreeSet::new(),
            cancel: CancelHandle::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn is_signed_in(&self) -> bool {
        self.credentials.is_signed_in()
    }

    /// Handle to cancel the running batch between items.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Files of the active backend, merged and ordered by name.
    pub fn files(&self) -> Vec<RemoteFileRef> {
        self.state.listing().map(RemoteListing::merged).unwrap_or_default()
    }

    fn credential(&self) -> Option<Credential> {
        self.credentials.credential()
    }

    fn active_backend(&self) -> Result<Backend, StorageError> {
        match &self.state {
            SessionState::Loaded { backend, .. } => Ok(*backend),
            SessionState::Busy { .. } => Err(StorageError::Busy),
            _ => Err(StorageError::InvalidArgument("no backend is loaded".to_string())),
        }
    }

    fn active_listing(&self) -> Result<&RemoteListing, StorageError> {
        self.active_backend()?;
        self.state
            .listing()
            .ok_or_else(|| StorageError::InvalidArgument("no backend is loaded".to_string()))
    }

    /// `Loaded(b)` -> `Busy(b, op)`.
    fn begin(&mut self, operation: Operation) -> Result<Backend, StorageError> {
        match std::mem::take(&mut self.state) {
            SessionState::Loaded { backend, listing } => {
                self.state = SessionState::Busy {
                    backend,
                    operation,
                    listing,
                };
                Ok(backend)
            }
            other => {
                let err = if matches!(other, SessionState::Busy { .. }) {
                    StorageError::Busy
                } else {
                    StorageError::InvalidArgument("no backend is loaded".to_string())
                };
                self.state = other;
                Err(err)
            }
        }
    }

    /// `Busy(b, op)` -> `Loaded(b)`.
    fn finish(&mut self) {
        if let SessionState::Busy {
            backend, listing, ..
        } = std::mem::take(&mut self.state)
        {
            self.state = SessionState::Loaded { backend, listing };
        }
    }

    // =========================================================================
    // Tabs and Listing
    // =========================================================================

    /// Switch to `backend` and list it. Clears the Selection Set.
    ///
    /// A failed listing leaves the session `Idle` and returns the error.
    #[instrument(skip(self), level = "debug")]
    pub async fn switch_backend(&mut self, backend: Backend) -> Result<&RemoteListing, StorageError> {
        if matches!(self.state, SessionState::Busy { .. }) {
            return Err(StorageError::Busy);
        }
        self.selection.clear();
        self.load(backend).await?;
        self.active_listing()
    }

    /// Re-list the active backend.
    pub async fn refresh(&mut self) -> Result<&RemoteListing, StorageError> {
        let backend = self.active_backend()?;
        self.load(backend).await?;
        self.selection.retain(|name| {
            self.state
                .listing()
                .is_some_and(|listing| listing.contains(name))
        });
        self.active_listing()
    }

    async fn load(&mut self, backend: Backend) -> Result<(), StorageError> {
        self.state = SessionState::Loading(backend);
        let repo = self.registry.get(backend);
        let listed = match repo {
            Ok(repo) => repo.list_all(self.credential().as_ref()).await,
            Err(e) => Err(e),
        };
        match listed {
            Ok(listing) => {
                debug!("Loaded {} files from {}", listing.len(), backend);
                self.state = SessionState::Loaded { backend, listing };
                Ok(())
            }
            Err(e) => {
                warn!("Listing {} failed: {}", backend, e);
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// Re-list after a mutation; the operation already succeeded, so a failed
    /// listing only keeps the previous one.
    async fn refresh_after_mutation(&mut self) {
        let previous = self.state.clone();
        if let Err(e) = self.refresh().await {
            warn!("Refresh after mutation failed, keeping previous listing: {}", e);
            self.state = previous;
        }
    }

    // =========================================================================
    // Selection Set
    // =========================================================================

    /// Toggle `name` in the Selection Set. Returns whether it is now selected.
    pub fn toggle_selection(&mut self, name: &str) -> Result<bool, StorageError> {
        let listing = self.active_listing()?;
        if !listing.contains(name) {
            return Err(StorageError::NotFound(name.to_string()));
        }
        if self.selection.remove(name) {
            Ok(false)
        } else {
            self.selection.insert(name.to_string());
            Ok(true)
        }
    }

    /// Select every listed file, or clear the selection when all of them
    /// are already selected.
    pub fn select_all(&mut self) -> Result<(), StorageError> {
        let all: BTreeSet<String> = self.active_listing()?.names().cloned().collect();
        if !all.is_empty() && all == self.selection {
            self.selection.clear();
        } else {
            self.selection = all;
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selected(&self) -> Vec<String> {
        self.selection.iter().cloned().collect()
    }

    fn selected_items(&self, listing: &RemoteListing) -> Result<Vec<BatchItem>, StorageError> {
        if self.selection.is_empty() {
            return Err(StorageError::Validation("no files selected".to_string()));
        }
        Ok(self
            .selection
            .iter()
            .map(|name| BatchItem {
                name: name.clone(),
                protected: listing.is_protected(name),
            })
            .collect())
    }

    // =========================================================================
    // Single-file Operations
    // =========================================================================

    /// Upload the document open in the editor to the active backend under
    /// `target_name`.
    ///
    /// The protection flag comes from the local copy of the open document.
    /// Protected content is encrypted with the stored password before upload.
    #[instrument(skip(self, editor), level = "debug")]
    pub async fn upload_current(
        &mut self,
        editor: &dyn EditorBridge,
        target_name: &str,
    ) -> Result<Ack, StorageError> {
        validate_name(target_name)?;
        let content = editor.serialize_current();
        if content.is_empty() {
            return Err(StorageError::Validation("document is empty".to_string()));
        }

        let mut password = None;
        if let Some(name) = editor.current_name() {
            if self.local.is_file_protected(&name).await {
                let stored = self.local.get(&name).await?;
                password = Some(stored.password.ok_or(StorageError::PasswordRequired(name))?);
            }
        }
        let protected = password.is_some();
        let payload = match &password {
            Some(password) => crypto::encrypt(&content, password)?,
            None => content,
        };

        let backend = self.begin(Operation::Uploading)?;
        let result = match self.registry.get(backend) {
            Ok(repo) => {
                repo.upload_file(self.credential().as_ref(), target_name, &payload, protected)
                    .await
            }
            Err(e) => Err(e),
        };
        self.finish();

        let ack = result?;
        info!("Uploaded {} to {} (protected: {})", target_name, backend, protected);
        self.refresh_after_mutation().await;
        Ok(ack)
    }

    /// Delete one file from the active backend, then re-list it.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&mut self, name: &str, confirmed: bool) -> Result<Ack, StorageError> {
        if !confirmed {
            return Err(StorageError::ConfirmationRequired(name.to_string()));
        }
        let protected = self.active_listing()?.is_protected(name);

        let backend = self.begin(Operation::Deleting)?;
        let result = match self.registry.get(backend) {
            Ok(repo) => {
                repo.delete_file(self.credential().as_ref(), name, protected)
                    .await
            }
            Err(e) => Err(e),
        };
        self.finish();

        let ack = result?;
        info!("Deleted {} from {}", name, backend);
        self.selection.remove(name);
        self.refresh_after_mutation().await;
        Ok(ack)
    }

    // =========================================================================
    // Batch Planning
    // =========================================================================

    /// Plan moving the selected files of the active backend to the local store.
    #[instrument(skip(self), level = "debug")]
    pub async fn prepare_move_to_local(&self) -> Result<BatchPlan, StorageError> {
        let backend = self.active_backend()?;
        let items = self.selected_items(self.active_listing()?)?;

        let local_names: Vec<String> = self.local.list_all().await?.into_keys().collect();
        let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        let conflicts = detect_conflicts(&names, &local_names);

        debug!(
            "Planned {} -> local: {} files, {} conflicts",
            backend,
            items.len(),
            conflicts.len()
        );
        Ok(BatchPlan {
            kind: BatchKind::Download { source: backend },
            items,
            conflicts,
        })
    }

    /// Plan moving local documents to the active backend.
    ///
    /// The destination is re-listed so conflicts reflect its current state.
    #[instrument(skip(self), level = "debug")]
    pub async fn prepare_move_to_server(&mut self, names: &[String]) -> Result<BatchPlan, StorageError> {
        let backend = self.active_backend()?;
        if names.is_empty() {
            return Err(StorageError::Validation("no files selected".to_string()));
        }

        let mut items = Vec::with_capacity(names.len());
        for name in names {
            validate_name(name)?;
            items.push(BatchItem {
                name: name.clone(),
                protected: self.local.is_file_protected(name).await,
            });
        }

        self.refresh().await?;
        let remote_names: Vec<String> = self.active_listing()?.names().cloned().collect();
        let conflicts = detect_conflicts(names, &remote_names);

        Ok(BatchPlan {
            kind: BatchKind::Upload { target: backend },
            items,
            conflicts,
        })
    }

    /// Plan migrating the selected files of the active backend to `target`.
    ///
    /// Listing the target is part of setup, so its failure is returned.
    #[instrument(skip(self), level = "debug")]
    pub async fn prepare_migration(&self, target: Backend) -> Result<BatchPlan, StorageError> {
        let source = self.active_backend()?;
        if source == target {
            return Err(StorageError::Validation(
                "source and target backends are the same".to_string(),
            ));
        }
        let items = self.selected_items(self.active_listing()?)?;

        let target_repo = self.registry.get(target)?;
        let target_listing = target_repo.list_all(self.credential().as_ref()).await?;
        let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        let target_names: Vec<String> = target_listing.names().cloned().collect();
        let conflicts = detect_conflicts(&names, &target_names);

        Ok(BatchPlan {
            kind: BatchKind::Migrate { source, target },
            items,
            conflicts,
        })
    }

    // =========================================================================
    // Batch Execution
    // =========================================================================

    /// Commit a plan under `resolution`.
    ///
    /// Returns `None` when cancelled. Otherwise the outcome lists every file
    /// that moved and every file that failed; individual failures never abort
    /// the batch.
    #[instrument(skip(self, plan), level = "debug", fields(kind = %plan.kind, items = plan.items.len()))]
    pub async fn execute(
        &mut self,
        plan: BatchPlan,
        resolution: Resolution,
    ) -> Result<Option<BatchOutcome>, StorageError> {
        let kind = plan.kind;
        let Some(items) = plan.resolve(resolution) else {
            info!("[{}] cancelled by user", kind);
            return Ok(None);
        };

        let operation = match kind {
            BatchKind::Download { .. } => Operation::Downloading,
            BatchKind::Upload { .. } => Operation::Uploading,
            BatchKind::Migrate { .. } => Operation::Migrating,
        };
        self.begin(operation)?;
        self.cancel.reset();

        let credential = self.credential();
        let outcome = match self.run_batch(kind, items, credential).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.finish();
                return Err(e);
            }
        };
        self.finish();

        self.selection.clear();
        self.refresh_after_mutation().await;
        Ok(Some(outcome))
    }

    async fn run_batch(
        &self,
        kind: BatchKind,
        items: Vec<BatchItem>,
        credential: Option<Credential>,
    ) -> Result<BatchOutcome, StorageError> {
        let local = &self.local;
        let credential = credential.as_ref();

        let outcome = match kind {
            BatchKind::Download { source } => {
                let repo = self.registry.get(source)?;
                run_sequential(kind, items, &self.cancel, |item| {
                    download_one(repo.as_ref(), local, credential, item)
                })
                .await
            }
            BatchKind::Upload { target } => {
                let repo = self.registry.get(target)?;
                run_sequential(kind, items, &self.cancel, |item| {
                    upload_one(local, repo.as_ref(), credential, item)
                })
                .await
            }
            BatchKind::Migrate { source, target } => {
                let source_repo = self.registry.get(source)?;
                let target_repo = self.registry.get(target)?;
                run_sequential(kind, items, &self.cancel, |item| {
                    migrate_one(source_repo.as_ref(), target_repo.as_ref(), credential, item)
                })
                .await
            }
        };
        Ok(outcome)
    }

    // =========================================================================
    // Decrypt-on-open
    // =========================================================================

    /// Open a local document in the editor, holding it back if it needs a
    /// password.
    #[instrument(skip(self, editor), level = "debug")]
    pub async fn open_local(
        &self,
        editor: &dyn EditorBridge,
        name: &str,
    ) -> Result<OpenOutcome, StorageError> {
        let doc = self.local.get(name).await?;
        if doc.protection().is_protected() {
            return Ok(OpenOutcome::NeedsPassword(PendingDecryption {
                name: doc.name,
                origin: OpenOrigin::Local,
                ciphertext: doc.content,
            }));
        }
        editor.load_document(&doc.name, &doc.content);
        self.local.save_last_opened(&doc.name).await?;
        Ok(OpenOutcome::Loaded { name: doc.name })
    }

    /// Open a file of the active backend in the editor.
    #[instrument(skip(self, editor, file), level = "debug", fields(name = %file.file_name))]
    pub async fn open_remote(
        &self,
        editor: &dyn EditorBridge,
        file: &RemoteFileRef,
    ) -> Result<OpenOutcome, StorageError> {
        let backend = self.active_backend()?;
        let repo = self.registry.get(backend)?;
        let fetched = repo
            .get_file(self.credential().as_ref(), &file.file_name, file.password_protected)
            .await?;

        if docstore_core::classify(file.password_protected, &fetched.content).is_protected() {
            return Ok(OpenOutcome::NeedsPassword(PendingDecryption {
                name: file.file_name.clone(),
                origin: OpenOrigin::Remote(backend),
                ciphertext: fetched.content,
            }));
        }
        editor.load_document(&file.file_name, &fetched.content);
        Ok(OpenOutcome::Loaded {
            name: file.file_name.clone(),
        })
    }

    /// Try `password` on a pending document.
    ///
    /// On success the plaintext goes to the editor. On failure the pending
    /// record stays valid for another attempt; there is no attempt limit.
    #[instrument(skip(self, editor, pending, password), level = "debug", fields(name = %pending.name))]
    pub async fn submit_password(
        &self,
        editor: &dyn EditorBridge,
        pending: &PendingDecryption,
        password: &str,
    ) -> Result<(), StorageError> {
        if password.is_empty() {
            return Err(StorageError::PasswordRequired(pending.name.clone()));
        }
        let plaintext = crypto::decrypt(&pending.ciphertext, password).map_err(|e| {
            debug!("Decryption of {} failed: {}", pending.name, e);
            StorageError::InvalidPassword(pending.name.clone())
        })?;

        editor.load_document(&pending.name, &plaintext);
        if pending.origin == OpenOrigin::Local {
            self.local.save_last_opened(&pending.name).await?;
        }
        Ok(())
    }
}

/// Remote -> local: persist exactly what the backend returned.
async fn download_one(
    repo: &dyn RemoteRepository,
    local: &LocalStore,
    credential: Option<&Credential>,
    item: BatchItem,
) -> Result<(), StorageError> {
    let file = repo.get_file(credential, &item.name, item.protected).await?;
    let mut doc = Document::new(item.name, file.content, 0);
    doc.is_password_protected = item.protected || doc.protection().is_protected();
    local.save(&doc, false).await?;
    Ok(())
}

/// Local -> remote: upload the stored record, ciphertext included.
async fn upload_one(
    local: &LocalStore,
    repo: &dyn RemoteRepository,
    credential: Option<&Credential>,
    item: BatchItem,
) -> Result<(), StorageError> {
    let doc = local.get(&item.name).await?;
    let protected = doc.protection().is_protected();
    repo.upload_file(credential, &item.name, &doc.content, protected)
        .await?;
    Ok(())
}

/// Remote -> remote, same name and protection flag.
async fn migrate_one(
    source: &dyn RemoteRepository,
    target: &dyn RemoteRepository,
    credential: Option<&Credential>,
    item: BatchItem,
) -> Result<(), StorageError> {
    let file = source.get_file(credential, &item.name, item.protected).await?;
    target
        .upload_file(credential, &item.name, &file.content, item.protected)
        .await?;
    Ok(())
}
