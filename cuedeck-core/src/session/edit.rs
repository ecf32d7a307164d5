//! Edit-mode state machine.
//!
//! Opens one store edit context per session, accumulates edits in an
//! overlay, and completes the session by committing or discarding it.

use std::sync::Arc;
use std::time::Duration;

use super::{SessionError, SessionMode, SessionRequest, SessionState};
use crate::library::{EditOp, Entry, LibraryModel};
use crate::store::{EditContext, EditContextId, LibraryStore, StoreError};

/// One open edit session: the store context plus the pending overlay.
#[derive(Debug)]
pub struct EditSession {
    context: EditContext,
    base: Arc<[Entry]>,
    overlay: Vec<Entry>,
}

impl EditSession {
    fn new(context: EditContext, base: Arc<[Entry]>) -> Self {
        let overlay = base.to_vec();
        Self {
            context,
            base,
            overlay,
        }
    }

    pub fn context_id(&self) -> EditContextId {
        self.context.id()
    }

    pub fn context(&self) -> &EditContext {
        &self.context
    }

    /// Entries as they would be after saving.
    pub fn overlay(&self) -> &[Entry] {
        &self.overlay
    }

    /// True if the overlay differs from the base snapshot.
    pub fn is_dirty(&self) -> bool {
        self.overlay.as_slice() != &*self.base
    }

    pub(crate) fn into_overlay(self) -> (EditContext, Vec<Entry>) {
        (self.context, self.overlay)
    }
}

/// Validates and performs Browsing ↔ Editing transitions against the store.
#[derive(Debug)]
pub struct EditStateMachine<St: ?Sized> {
    store: Arc<St>,
    commit_timeout: Duration,
}

impl<St: LibraryStore + ?Sized> EditStateMachine<St> {
    pub fn new(store: Arc<St>, commit_timeout: Duration) -> Self {
        Self {
            store,
            commit_timeout,
        }
    }

    /// Opens an edit session over the committed library.
    ///
    /// The store context is pinned to the store revision `library` was read
    /// at, so a commit fails if anyone else wrote to the store since.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionConflict` - Playing, already editing, or the
    ///   store still has a context open
    /// - `SessionError::StoreUnavailable` - Store could not open a context
    pub async fn begin(
        &self,
        state: &SessionState,
        library: &LibraryModel,
    ) -> Result<EditSession, SessionError> {
        if !matches!(state, SessionState::Browsing) {
            return Err(SessionError::SessionConflict {
                request: SessionRequest::EnterEdit,
                active: state.mode(),
            });
        }

        let context = self
            .store
            .begin_edit_session(library.store_revision().unwrap_or(0))
            .await
            .map_err(|e| match e {
                StoreError::SessionAlreadyOpen { .. } => SessionError::SessionConflict {
                    request: SessionRequest::EnterEdit,
                    active: SessionMode::Editing,
                },
                other => SessionError::StoreUnavailable {
                    reason: other.to_string(),
                },
            })?;

        tracing::info!(
            context_id = %context.id(),
            base_revision = context.base_revision(),
            "Edit session opened"
        );
        Ok(EditSession::new(context, library.entries()))
    }

    /// Applies a batch of edits to the session overlay.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidEdit` - Batch rejected; overlay unchanged
    pub fn apply(
        &self,
        session: &mut EditSession,
        library: &LibraryModel,
        edits: &[EditOp],
    ) -> Result<(), SessionError> {
        let next = library.apply(&session.overlay, edits)?;
        session.overlay = next;
        session.context.record(edits);

        tracing::debug!(
            context_id = %session.context.id(),
            batch = edits.len(),
            pending = session.context.pending().len(),
            "Applied edits to overlay"
        );
        Ok(())
    }

    /// Commits the session overlay and returns the new store revision. The
    /// session stays usable on failure.
    ///
    /// # Errors
    ///
    /// - `SessionError::PersistenceFailed` - Store rejected the commit, the
    ///   store moved past the session's base revision, or the commit timed out
    /// - `SessionError::InvalidSessionState` - Context was already consumed
    pub async fn save(&self, session: &EditSession) -> Result<u64, SessionError> {
        let commit = self.store.commit(&session.context, &session.overlay);

        match tokio::time::timeout(self.commit_timeout, commit).await {
            Ok(Ok(revision)) => {
                tracing::debug!(
                    context_id = %session.context.id(),
                    revision,
                    age_ms = session.context.age().num_milliseconds(),
                    "Edit session committed"
                );
                Ok(revision)
            }
            Ok(Err(StoreError::ContextConsumed { .. })) => Err(SessionError::InvalidSessionState {
                request: SessionRequest::SaveEdit,
                mode: SessionMode::Browsing,
            }),
            Ok(Err(e)) => Err(SessionError::PersistenceFailed {
                reason: e.to_string(),
            }),
            Err(_) => Err(SessionError::PersistenceFailed {
                reason: format!("commit timed out after {:?}", self.commit_timeout),
            }),
        }
    }

    /// Discards the session. Store errors are logged; nothing was persisted.
    pub async fn cancel(&self, session: EditSession) {
        let context_id = session.context_id();
        let (context, _) = session.into_overlay();
        let age_ms = context.age().num_milliseconds();

        match self.store.discard(context).await {
            Ok(()) => tracing::info!(%context_id, age_ms, "Edit session discarded"),
            Err(e) => tracing::warn!(%context_id, "Store discard failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ContentLocator, EntryId};
    use crate::session::test_mocks::MockLibraryStore;
    use crate::store::StoredLibrary;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn entry(id: u64) -> Entry {
        Entry::new(
            EntryId(id),
            format!("Entry {id}"),
            ContentLocator::new(format!("https://example.com/{id}.swf")),
        )
    }

    fn library() -> LibraryModel {
        LibraryModel::from_stored(StoredLibrary::new(
            0,
            vec![entry(1).at_position(0), entry(2).at_position(1)],
        ))
    }

    #[tokio::test]
    async fn test_begin_apply_save() {
        let store = Arc::new(MockLibraryStore::new());
        let machine = EditStateMachine::new(Arc::clone(&store), TIMEOUT);
        let library = library();

        let mut session = machine.begin(&SessionState::Browsing, &library).await.unwrap();
        assert!(!session.is_dirty());

        machine
            .apply(
                &mut session,
                &library,
                &[EditOp::Insert {
                    entry: entry(3),
                    position: 1,
                }],
            )
            .unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.context().pending().len(), 1);

        assert_eq!(machine.save(&session).await.unwrap(), 1);
        assert_eq!(store.commit_calls(), 1);
        assert_eq!(store.committed_entries().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_overlay() {
        let store = Arc::new(MockLibraryStore::new_with_commit_failure());
        let machine = EditStateMachine::new(Arc::clone(&store), TIMEOUT);
        let library = library();

        let mut session = machine.begin(&SessionState::Browsing, &library).await.unwrap();
        machine
            .apply(&mut session, &library, &[EditOp::Remove { id: EntryId(1) }])
            .unwrap();

        let result = machine.save(&session).await;
        assert!(matches!(result, Err(SessionError::PersistenceFailed { .. })));
        assert_eq!(session.overlay().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_commit_times_out() {
        let store = Arc::new(MockLibraryStore::new().with_commit_delay(Duration::from_millis(200)));
        let machine = EditStateMachine::new(Arc::clone(&store), Duration::from_millis(20));
        let library = library();

        let session = machine.begin(&SessionState::Browsing, &library).await.unwrap();
        let result = machine.save(&session).await;

        assert!(matches!(result, Err(SessionError::PersistenceFailed { .. })));
        assert!(store.committed_entries().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_batch_rejected() {
        let store = Arc::new(MockLibraryStore::new());
        let machine = EditStateMachine::new(Arc::clone(&store), TIMEOUT);
        let library = library();

        let mut session = machine.begin(&SessionState::Browsing, &library).await.unwrap();
        let result = machine.apply(
            &mut session,
            &library,
            &[EditOp::Move {
                id: EntryId(42),
                to: 0,
            }],
        );

        assert!(matches!(result, Err(SessionError::InvalidEdit(_))));
        assert!(!session.is_dirty());
        assert!(session.context().pending().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_discards_context() {
        let store = Arc::new(MockLibraryStore::new());
        let machine = EditStateMachine::new(Arc::clone(&store), TIMEOUT);

        let session = machine.begin(&SessionState::Browsing, &library()).await.unwrap();
        machine.cancel(session).await;

        assert_eq!(store.discard_calls(), 1);
        assert_eq!(store.commit_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_with_open_context_conflicts() {
        let store = Arc::new(MockLibraryStore::new());
        let machine = EditStateMachine::new(Arc::clone(&store), TIMEOUT);
        let library = library();

        let _leaked = store.begin_edit_session(0).await.unwrap();
        let result = machine.begin(&SessionState::Browsing, &library).await;

        assert!(matches!(
            result,
            Err(SessionError::SessionConflict {
                request: SessionRequest::EnterEdit,
                active: SessionMode::Editing,
            })
        ));
    }

    #[tokio::test]
    async fn test_session_from_outdated_library_fails_to_save() {
        let store = Arc::new(MockLibraryStore::new());
        let machine = EditStateMachine::new(Arc::clone(&store), TIMEOUT);
        let library = library();

        // Someone else commits while this coordinator still holds revision 0.
        let foreign = store.begin_edit_session(0).await.unwrap();
        store.commit(&foreign, &[entry(9)]).await.unwrap();

        let mut session = machine.begin(&SessionState::Browsing, &library).await.unwrap();
        assert_eq!(session.context().base_revision(), 0);
        machine
            .apply(&mut session, &library, &[EditOp::Remove { id: EntryId(2) }])
            .unwrap();

        let result = machine.save(&session).await;
        assert!(matches!(result, Err(SessionError::PersistenceFailed { .. })));
        assert_eq!(store.committed_entries(), vec![entry(9)]);
    }

    #[tokio::test]
    async fn test_unavailable_store_on_begin() {
        let store = Arc::new(MockLibraryStore::new_unavailable());
        let machine = EditStateMachine::new(Arc::clone(&store), TIMEOUT);

        let result = machine.begin(&SessionState::Browsing, &library()).await;
        assert!(matches!(result, Err(SessionError::StoreUnavailable { .. })));
    }
}
