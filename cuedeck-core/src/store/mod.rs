//! Durable library store interface.
//!
//! Defines the contract the session coordinator uses to load the library
//! and persist edit sessions, with a JSON file implementation.

pub mod file_store;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use file_store::JsonFileLibraryStore;
use uuid::Uuid;

use crate::library::{EditOp, Entry};

/// Library contents together with the store revision they were read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredLibrary {
    /// Incremented by the store on every successful commit
    pub revision: u64,
    pub entries: Vec<Entry>,
}

impl StoredLibrary {
    pub fn new(revision: u64, entries: Vec<Entry>) -> Self {
        Self { revision, entries }
    }
}

/// Identifier of one edit session against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditContextId(Uuid);

impl EditContextId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

}

impl fmt::Display for EditContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token for one open, uncommitted edit session.
///
/// Issued by [`LibraryStore::begin_edit_session`] and consumed by exactly one
/// successful commit or one discard. Not `Clone`, so a context cannot be
/// handed out twice.
#[derive(Debug)]
pub struct EditContext {
    id: EditContextId,
    opened_at: DateTime<Utc>,
    base_revision: u64,
    pending: Vec<EditOp>,
}

impl EditContext {
    /// Opens a context for an overlay derived from `base_revision`.
    pub fn new(base_revision: u64) -> Self {
        Self {
            id: EditContextId::generate(),
            opened_at: Utc::now(),
            base_revision,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> EditContextId {
        self.id
    }

    /// Time since the context was opened.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.opened_at
    }

    /// Store revision the overlay was derived from.
    pub fn base_revision(&self) -> u64 {
        self.base_revision
    }

    /// Edits applied so far, in order.
    pub fn pending(&self) -> &[EditOp] {
        &self.pending
    }

    /// Appends an applied batch to the pending log.
    pub fn record(&mut self, edits: &[EditOp]) {
        self.pending.extend_from_slice(edits);
    }
}

/// Persistence operations for the library.
///
/// Implementations must make `commit` cancel-safe: if the returned future
/// is dropped before it resolves, the durable library is left unchanged.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Loads all entries and the revision they belong to.
    ///
    /// # Errors
    ///
    /// - `StoreError::Unavailable` - If the store cannot respond
    /// - `StoreError::Serialization` - If the stored library cannot be
    ///   decoded
    async fn load(&self) -> Result<StoredLibrary, StoreError>;

    /// Opens an edit session for an overlay built from the library as it
    /// was at `base_revision`.
    ///
    /// # Errors
    ///
    /// - `StoreError::SessionAlreadyOpen` - If another context is still open
    /// - `StoreError::Unavailable` - If the store cannot respond
    async fn begin_edit_session(&self, base_revision: u64) -> Result<EditContext, StoreError>;

    /// Persists `overlay` as the new library for `context` and returns the
    /// new store revision.
    ///
    /// Fails if the store has moved past the context's base revision. A
    /// failed commit leaves the context open so the caller may retry or
    /// discard it.
    ///
    /// # Errors
    ///
    /// - `StoreError::PersistenceFailed` - If the write was rejected or the
    ///   library changed since the base revision
    /// - `StoreError::ContextConsumed` - If the context was already committed
    /// - `StoreError::UnknownContext` - If the store never issued the context
    async fn commit(&self, context: &EditContext, overlay: &[Entry]) -> Result<u64, StoreError>;

    /// Releases `context` without persisting anything.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownContext` - If the context is not open
    async fn discard(&self, context: EditContext) -> Result<(), StoreError>;
}

/// Errors that occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached or did not respond
    #[error("Library store unavailable: {reason}")]
    Unavailable {
        /// Description of the failure
        reason: String,
    },

    /// Commit was rejected by the store
    #[error("Commit rejected: {reason}")]
    PersistenceFailed {
        /// Description of the rejection
        reason: String,
    },

    /// Context was already committed or discarded
    #[error("Edit context {context_id} already consumed")]
    ContextConsumed {
        /// Id of the consumed context
        context_id: EditContextId,
    },

    /// Context was not issued by this store or is no longer open
    #[error("Unknown edit context {context_id}")]
    UnknownContext {
        /// Id of the unknown context
        context_id: EditContextId,
    },

    /// Another edit context is still open
    #[error("Edit context {context_id} is still open")]
    SessionAlreadyOpen {
        /// Id of the open context
        context_id: EditContextId,
    },

    /// Stored library could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::EntryId;

    #[test]
    fn test_context_records_pending_edits() {
        let mut context = EditContext::new(4);
        assert_eq!(context.base_revision(), 4);
        assert!(context.pending().is_empty());

        context.record(&[EditOp::Remove { id: EntryId(1) }]);
        context.record(&[EditOp::Move {
            id: EntryId(2),
            to: 0,
        }]);

        assert_eq!(context.pending().len(), 2);
        assert_eq!(context.pending()[0].kind(), "remove");
    }

    #[test]
    fn test_context_ids_are_unique() {
        let first = EditContext::new(0);
        let second = EditContext::new(0);
        assert_ne!(first.id(), second.id());
    }
}
