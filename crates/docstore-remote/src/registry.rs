use std::collections::BTreeMap;
use std::sync::Arc;

use docstore_core::{Backend, RemoteRepository, StorageError};
use tracing::debug;

/// Maps each configured backend to its adapter.
///
/// Callers dispatch on [`Backend`] only; adding a backend means registering
/// one more adapter, never touching the call sites.
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    repositories: BTreeMap<Backend, Arc<dyn RemoteRepository>>,
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the backend it reports, replacing any
    /// previous one.
    pub fn register(&mut self, repository: Arc<dyn RemoteRepository>) -> &mut Self {
        let backend = repository.backend();
        debug!("Registered repository for {}", backend);
        self.repositories.insert(backend, repository);
        self
    }

    pub fn with(mut self, repository: Arc<dyn RemoteRepository>) -> Self {
        self.register(repository);
        self
    }

    pub fn get(&self, backend: Backend) -> Result<Arc<dyn RemoteRepository>, StorageError> {
        self.repositories.get(&backend).cloned().ok_or_else(|| {
            StorageError::InvalidArgument(format!("backend {} is not configured", backend))
        })
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.repositories.contains_key(&backend)
    }

    /// Configured backends, in declaration order.
    pub fn backends(&self) -> Vec<Backend> {
        self.repositories.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmbeddedRepository, HttpRepository};

    #[test]
    fn test_dispatch_by_backend() {
        let registry = RepositoryRegistry::new()
            .with(Arc::new(EmbeddedRepository::in_memory().unwrap()))
            .with(Arc::new(
                HttpRepository::new(Backend::Dropbox, "http://localhost:9").unwrap(),
            ))
            .with(Arc::new(HttpRepository::new(Backend::S3, "http://localhost:9").unwrap()));

        assert_eq!(
            registry.backends(),
            vec![Backend::S3, Backend::Dropbox, Backend::Ipfs]
        );
        assert_eq!(registry.get(Backend::Dropbox).unwrap().backend(), Backend::Dropbox);
        assert!(registry.contains(Backend::Ipfs));
        assert!(matches!(
            registry.get(Backend::OneDrive),
            Err(StorageError::InvalidArgument(_))
        ));
    }
}
