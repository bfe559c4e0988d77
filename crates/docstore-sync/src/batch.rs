use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use docstore_core::{Backend, StorageError};
use tracing::{debug, info, warn};

use crate::conflict::{ConflictRecord, Resolution};

/// Direction of a batch move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Remote backend -> local store.
    Download { source: Backend },
    /// Local store -> remote backend.
    Upload { target: Backend },
    /// Remote backend -> another remote backend.
    Migrate { source: Backend, target: Backend },
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchKind::Download { source } => write!(f, "{} -> local", source),
            BatchKind::Upload { target } => write!(f, "local -> {}", target),
            BatchKind::Migrate { source, target } => write!(f, "{} -> {}", source, target),
        }
    }
}

/// One file scheduled in a batch, with its source protection flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub name: String,
    pub protected: bool,
}

/// A batch awaiting commit, with the conflicts found against its destination.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub kind: BatchKind,
    pub items: Vec<BatchItem>,
    pub conflicts: ConflictRecord,
}

impl BatchPlan {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Items that will run under `resolution`; `None` for [`Resolution::Cancel`].
    pub fn resolve(self, resolution: Resolution) -> Option<Vec<BatchItem>> {
        match resolution {
            Resolution::Cancel => None,
            Resolution::OverwriteAll => Some(self.items),
            Resolution::SkipConflicts => {
                let conflicts = self.conflicts;
                Some(
                    self.items
                        .into_iter()
                        .filter(|item| !conflicts.contains(&item.name))
                        .collect(),
                )
            }
        }
    }
}

/// A file that could not be moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub name: String,
    pub message: String,
}

/// Aggregate result of a batch. Always returned, even when items fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
    /// Items never started because the batch was cancelled.
    pub skipped: Vec<String>,
}

impl BatchOutcome {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Cooperative cancellation for a running batch. Checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run `op` over `items` strictly one after another.
///
/// A failing item is recorded and the loop moves on; nothing aborts the batch
/// except cancellation, which leaves the remaining items unstarted.
pub(crate) async fn run_sequential<F, Fut>(
    kind: BatchKind,
    items: Vec<BatchItem>,
    cancel: &CancelHandle,
    mut op: F,
) -> BatchOutcome
where
    F: FnMut(BatchItem) -> Fut,
    Fut: Future<Output = Result<(), StorageError>>,
{
    let mut outcome = BatchOutcome::default();
    let total = items.len();
    let mut remaining = items.into_iter();

    for item in remaining.by_ref() {
        if cancel.is_cancelled() {
            outcome.skipped.push(item.name);
            break;
        }
        let name = item.name.clone();
        match op(item).await {
            Ok(()) => {
                debug!("[{}] moved {}", kind, name);
                outcome.succeeded.push(name);
            }
            Err(e) => {
                warn!("[{}] failed to move {}: {}", kind, name, e);
                outcome.failed.push(BatchFailure {
                    name,
                    message: e.to_string(),
                });
            }
        }
    }
    outcome.skipped.extend(remaining.map(|item| item.name));

    info!(
        "[{}] batch finished: {}/{} succeeded, {} failed, {} skipped",
        kind,
        outcome.succeeded.len(),
        total,
        outcome.failed.len(),
        outcome.skipped.len()
    );
    outcome
}
