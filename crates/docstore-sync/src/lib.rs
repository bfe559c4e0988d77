//! Sync and migration between the local document store and remote backends.
//!
//! [`SyncOrchestrator`] owns the session state, the Selection Set of the
//! active backend tab, batch moves with conflict resolution, and the
//! decrypt-on-open flow. Errors surface unmodified as
//! [`StorageError`](docstore_core::StorageError); [`classify_error`] turns
//! them into user-facing messages.

mod batch;
mod conflict;
mod messages;
mod open;
mod orchestrator;

pub use batch::{BatchFailure, BatchItem, BatchKind, BatchOutcome, BatchPlan, CancelHandle};
pub use conflict::{detect_conflicts, ConflictRecord, Resolution};
pub use messages::{classify_error, ErrorCategory, UserMessage};
pub use open::{EditorBridge, OpenOrigin, OpenOutcome, PendingDecryption};
pub use orchestrator::{Operation, SessionState, SyncOrchestrator};
