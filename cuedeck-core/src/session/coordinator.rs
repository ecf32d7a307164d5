//! Session coordinator: the single owner of the session state.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::{
    CancelSignal, EditSession, EditStateMachine, SessionError, SessionEvent, SessionMode,
    SessionRequest, SessionSnapshot, SessionState,
};
use crate::config::SessionConfig;
use crate::library::{EditOp, Entry, EntryId, LibraryModel};
use crate::playback::{PlaybackController, PlaybackHandle, PlaybackInfo, PlaybackSurface};
use crate::store::{EditContextId, LibraryStore};

/// Composition root for library, edit and playback.
///
/// Every request takes `&mut self`, so requests resolve one at a time.
/// Reads go through [`snapshot`](Self::snapshot) or the published snapshot
/// channel, which is updated after every transition.
pub struct SessionCoordinator<St: ?Sized, Sf: ?Sized> {
    library: LibraryModel,
    state: SessionState,
    store: Arc<St>,
    edits: EditStateMachine<St>,
    playback: PlaybackController<Sf>,
    cancel: CancelSignal,
    cancelled_by_race: Option<EditContextId>,
    events: broadcast::Sender<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl<St, Sf> SessionCoordinator<St, Sf>
where
    St: LibraryStore + ?Sized,
    Sf: PlaybackSurface + ?Sized,
{
    /// Creates a browsing coordinator with an empty library.
    pub fn new(config: &SessionConfig, store: Arc<St>, surface: Arc<Sf>) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        let (snapshots, _) = watch::channel(SessionSnapshot::default());

        Self {
            library: LibraryModel::new(),
            state: SessionState::Browsing,
            edits: EditStateMachine::new(Arc::clone(&store), config.commit_timeout),
            store,
            playback: PlaybackController::new(surface, config.attach_timeout),
            cancel: CancelSignal::new(),
            cancelled_by_race: None,
            events,
            snapshots,
        }
    }

    /// Reloads the committed library from the store.
    ///
    /// On failure the previous library stays in place.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionConflict` - An edit session is open
    /// - `SessionError::StoreUnavailable` - Store could not be read
    pub async fn load_library(&mut self) -> Result<Arc<[Entry]>, SessionError> {
        let result = self.load_library_inner().await;
        self.finish(SessionRequest::LoadLibrary, result)
    }

    async fn load_library_inner(&mut self) -> Result<Arc<[Entry]>, SessionError> {
        if let SessionState::Editing(_) = self.state {
            return Err(SessionError::SessionConflict {
                request: SessionRequest::LoadLibrary,
                active: self.state.mode(),
            });
        }

        let stored = self
            .store
            .load()
            .await
            .map_err(|e| SessionError::StoreUnavailable {
                reason: e.to_string(),
            })?;

        self.library.load(stored);
        self.library_replaced();
        Ok(self.library.entries())
    }

    /// Enters edit mode.
    ///
    /// A library that was never loaded is read from the store first, so the
    /// overlay always starts from the stored entries.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionConflict` - Playing or already editing
    /// - `SessionError::StoreUnavailable` - Store could not be read or could
    ///   not open a context
    pub async fn enter_edit(&mut self) -> Result<EditContextId, SessionError> {
        let result = self.enter_edit_inner().await;
        self.finish(SessionRequest::EnterEdit, result)
    }

    async fn enter_edit_inner(&mut self) -> Result<EditContextId, SessionError> {
        if matches!(self.state, SessionState::Browsing) && !self.library.is_loaded() {
            tracing::debug!("Library not loaded yet, reading store before edit");
            self.load_library_inner().await?;
        }

        let session = self.edits.begin(&self.state, &self.library).await?;
        let context_id = session.context_id();
        self.cancel.reset();
        self.cancelled_by_race = None;
        self.transition(SessionState::Editing(session));
        Ok(context_id)
    }

    /// Applies an edit batch to the overlay and returns the new overlay.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidSessionState` - Not editing
    /// - `SessionError::InvalidEdit` - Batch rejected; overlay unchanged
    pub fn apply_edits(&mut self, edits: &[EditOp]) -> Result<Vec<Entry>, SessionError> {
        let result = self.apply_edits_inner(edits);
        self.finish(SessionRequest::ApplyEdits, result)
    }

    fn apply_edits_inner(&mut self, edits: &[EditOp]) -> Result<Vec<Entry>, SessionError> {
        let SessionState::Editing(session) = &mut self.state else {
            return Err(SessionError::InvalidSessionState {
                request: SessionRequest::ApplyEdits,
                mode: self.state.mode(),
            });
        };

        self.edits.apply(session, &self.library, edits)?;
        let overlay = session.overlay().to_vec();
        let event = SessionEvent::EditApplied {
            context_id: session.context_id(),
            dirty: session.is_dirty(),
        };

        self.emit(event);
        self.publish();
        Ok(overlay)
    }

    /// Commits the overlay and returns to browsing.
    ///
    /// On commit failure the session stays in edit mode with the overlay
    /// intact. A cancel raised through the [`CancelSignal`] before the
    /// commit resolves abandons it.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidSessionState` - Not editing, or the context
    ///   was already consumed
    /// - `SessionError::PersistenceFailed` - Store rejected the commit
    /// - `SessionError::EditCancelled` - Cancel overtook the commit
    pub async fn save_edit(&mut self) -> Result<Arc<[Entry]>, SessionError> {
        let result = self.save_edit_inner().await;
        self.finish(SessionRequest::SaveEdit, result)
    }

    async fn save_edit_inner(&mut self) -> Result<Arc<[Entry]>, SessionError> {
        let SessionState::Editing(session) = &self.state else {
            return Err(SessionError::InvalidSessionState {
                request: SessionRequest::SaveEdit,
                mode: self.state.mode(),
            });
        };
        let context_id = session.context_id();

        let committed = tokio::select! {
            biased;
            result = self.edits.save(session) => Some(result),
            () = self.cancel.requested() => None,
        };
        self.cancel.reset();

        match committed {
            Some(Ok(store_revision)) => {
                if let Some(session) = self.take_edit_session() {
                    let (_, overlay) = session.into_overlay();
                    self.library.replace(overlay, store_revision);
                }
                tracing::info!(
                    %context_id,
                    revision = self.library.revision(),
                    store_revision,
                    "Edit session saved"
                );
                self.library_replaced();
                self.publish_transition(SessionMode::Editing);
                Ok(self.library.entries())
            }
            Some(Err(e)) => Err(e),
            None => {
                tracing::info!(%context_id, "Cancel overtook pending commit");
                if let Some(session) = self.take_edit_session() {
                    self.edits.cancel(session).await;
                }
                self.cancelled_by_race = Some(context_id);
                self.publish_transition(SessionMode::Editing);
                Err(SessionError::EditCancelled)
            }
        }
    }

    /// Discards the overlay and returns to browsing. Always succeeds while
    /// editing.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidSessionState` - Not editing (for example the
    ///   edits were already saved)
    pub async fn cancel_edit(&mut self) -> Result<(), SessionError> {
        let result = self.cancel_edit_inner().await;
        self.finish(SessionRequest::CancelEdit, result)
    }

    async fn cancel_edit_inner(&mut self) -> Result<(), SessionError> {
        self.cancel.reset();
        let Some(session) = self.take_edit_session() else {
            // The cancel already won against a pending commit.
            if self.cancelled_by_race.take().is_some() {
                return Ok(());
            }
            return Err(SessionError::InvalidSessionState {
                request: SessionRequest::CancelEdit,
                mode: self.state.mode(),
            });
        };

        self.edits.cancel(session).await;
        self.publish_transition(SessionMode::Editing);
        Ok(())
    }

    /// Starts playback of a committed entry.
    ///
    /// # Errors
    ///
    /// - `SessionError::EntryNotFound` - No entry with `id`
    /// - `SessionError::SessionConflict` - Editing or already playing
    /// - `SessionError::PlaybackStartFailed` - Surface or content problem;
    ///   still browsing
    pub async fn select_entry(&mut self, id: EntryId) -> Result<PlaybackInfo, SessionError> {
        let result = self.select_entry_inner(id).await;
        self.finish(SessionRequest::SelectEntry, result)
    }

    async fn select_entry_inner(&mut self, id: EntryId) -> Result<PlaybackInfo, SessionError> {
        let entry = self
            .library
            .get(id)
            .cloned()
            .ok_or(SessionError::EntryNotFound { id })?;

        let handle = self.playback.start(&self.state, &entry).await?;
        let info = handle.info();
        self.transition(SessionState::Playing(handle));
        Ok(info)
    }

    /// Stops playback and returns to browsing.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidSessionState` - Nothing is playing
    pub async fn stop_playback(&mut self) -> Result<(), SessionError> {
        let result = self.stop_playback_inner().await;
        self.finish(SessionRequest::StopPlayback, result)
    }

    async fn stop_playback_inner(&mut self) -> Result<(), SessionError> {
        let Some(handle) = self.take_playback() else {
            return Err(SessionError::InvalidSessionState {
                request: SessionRequest::StopPlayback,
                mode: self.state.mode(),
            });
        };

        self.playback.stop(handle).await;
        self.publish_transition(SessionMode::Playing);
        Ok(())
    }

    /// Tears down whatever is active. Used on shutdown.
    pub async fn close(&mut self) {
        match std::mem::take(&mut self.state) {
            SessionState::Browsing => {}
            SessionState::Editing(session) => {
                self.edits.cancel(session).await;
                self.publish_transition(SessionMode::Editing);
            }
            SessionState::Playing(handle) => {
                self.playback.stop(handle).await;
                self.publish_transition(SessionMode::Playing);
            }
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Committed library model.
    pub fn library(&self) -> &LibraryModel {
        &self.library
    }

    /// Entries presentation should show: the overlay while editing.
    pub fn entries(&self) -> Arc<[Entry]> {
        match &self.state {
            SessionState::Editing(session) => Arc::from(session.overlay().to_vec()),
            _ => self.library.entries(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.state.edit_session();
        SessionSnapshot {
            mode: self.state.mode(),
            entries: self.entries(),
            revision: self.library.revision(),
            dirty: session.is_some_and(|s| s.is_dirty()),
            edit_context: session.map(|s| s.context_id()),
            playback: self.state.playback().map(|handle| handle.info()),
        }
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch_snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Signal a caller raises to cancel a pending commit.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    fn take_edit_session(&mut self) -> Option<EditSession> {
        match std::mem::take(&mut self.state) {
            SessionState::Editing(session) => Some(session),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn take_playback(&mut self) -> Option<PlaybackHandle> {
        match std::mem::take(&mut self.state) {
            SessionState::Playing(handle) => Some(handle),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        let from = self.state.mode();
        self.state = next;
        self.publish_transition(from);
    }

    fn publish_transition(&mut self, from: SessionMode) {
        let to = self.state.mode();
        if from != to {
            tracing::info!(%from, %to, "Session state changed");
            self.emit(SessionEvent::StateChanged { from, to });
        }
        self.publish();
    }

    fn library_replaced(&mut self) {
        self.emit(SessionEvent::LibraryReplaced {
            revision: self.library.revision(),
            entries: self.library.len(),
        });
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn finish<T>(
        &self,
        request: SessionRequest,
        result: Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if let Err(e) = &result {
            tracing::warn!(%request, mode = %self.state.mode(), "Request failed: {e}");
            self.emit(SessionEvent::RequestFailed {
                request,
                error: e.to_string(),
            });
        }
        result
    }
}

impl<St: ?Sized, Sf: ?Sized> std::fmt::Debug for SessionCoordinator<St, Sf> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("mode", &self.state.mode())
            .field("entries", &self.library.len())
            .field("revision", &self.library.revision())
            .finish()
    }
}
