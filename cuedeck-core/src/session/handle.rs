//! Handle for communicating with the session coordinator actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::commands::SessionCommand;
use super::{CancelSignal, SessionError, SessionEvent, SessionSnapshot};
use crate::config::TransitionPolicy;
use crate::library::{EditOp, Entry, EntryId};
use crate::playback::PlaybackInfo;
use crate::store::EditContextId;

/// Handle for communicating with the session coordinator actor.
///
/// Cheap to clone. Every clone talks to the same coordinator, so requests
/// from all of them are resolved one at a time in arrival order.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancelSignal,
    in_flight: Arc<AtomicBool>,
    policy: TransitionPolicy,
}

impl SessionHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<SessionCommand>,
        snapshots: watch::Receiver<SessionSnapshot>,
        events: broadcast::Sender<SessionEvent>,
        cancel: CancelSignal,
        in_flight: Arc<AtomicBool>,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            sender,
            snapshots,
            events,
            cancel,
            in_flight,
            policy,
        }
    }

    /// Reloads the committed library from the store.
    ///
    /// # Errors
    /// - `SessionError::SessionConflict` - An edit session is open
    /// - `SessionError::StoreUnavailable` - Store could not be read
    pub async fn load_library(&self) -> Result<Arc<[Entry]>, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.dispatch(SessionCommand::LoadLibrary { responder }, rx).await
    }

    /// Enters edit mode.
    ///
    /// # Errors
    /// - `SessionError::SessionConflict` - Playing or already editing
    /// - `SessionError::StoreUnavailable` - Store could not be read or could
    ///   not open a context
    pub async fn enter_edit(&self) -> Result<EditContextId, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.dispatch(SessionCommand::EnterEdit { responder }, rx).await
    }

    /// Applies a batch of edits to the overlay and returns the new overlay.
    ///
    /// # Errors
    /// - `SessionError::InvalidSessionState` - Not editing
    /// - `SessionError::InvalidEdit` - Batch rejected; overlay unchanged
    pub async fn apply_edits(&self, edits: Vec<EditOp>) -> Result<Vec<Entry>, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.dispatch(SessionCommand::ApplyEdits { edits, responder }, rx).await
    }

    /// Commits the overlay and returns the new committed entries.
    ///
    /// # Errors
    /// - `SessionError::PersistenceFailed` - Store rejected the commit; still
    ///   editing
    /// - `SessionError::EditCancelled` - A cancel overtook the commit
    /// - `SessionError::InvalidSessionState` - Not editing
    pub async fn save_edit(&self) -> Result<Arc<[Entry]>, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.dispatch(SessionCommand::SaveEdit { responder }, rx).await
    }

    /// Discards the overlay.
    ///
    /// Raises the cancel signal before queueing, so a commit that is still
    /// pending is abandoned instead of waited on.
    ///
    /// # Errors
    /// - `SessionError::InvalidSessionState` - Not editing, or the edits were
    ///   already saved
    pub async fn cancel_edit(&self) -> Result<(), SessionError> {
        self.cancel.request();
        let (responder, rx) = oneshot::channel();
        self.dispatch(SessionCommand::CancelEdit { responder }, rx).await
    }

    /// Starts playback of a committed entry.
    ///
    /// # Errors
    /// - `SessionError::EntryNotFound` - No entry with `id`
    /// - `SessionError::SessionConflict` - Editing or already playing
    /// - `SessionError::PlaybackStartFailed` - Surface or content problem
    pub async fn select_entry(&self, id: EntryId) -> Result<PlaybackInfo, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.dispatch(SessionCommand::SelectEntry { id, responder }, rx).await
    }

    /// Stops the active playback.
    ///
    /// # Errors
    /// - `SessionError::InvalidSessionState` - Nothing is playing
    pub async fn stop_playback(&self) -> Result<(), SessionError> {
        let (responder, rx) = oneshot::channel();
        self.dispatch(SessionCommand::StopPlayback { responder }, rx).await
    }

    /// Latest published snapshot. Never waits on a pending transition.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified whenever a new snapshot is published.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns true while the actor is resolving a request.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns true while the actor is accepting commands.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Tears down the active session and stops the actor.
    ///
    /// # Errors
    /// - `SessionError::CoordinatorShutdown` - Actor already stopped
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Shutdown { responder })
            .await
            .map_err(|_| SessionError::CoordinatorShutdown)?;

        rx.await.map_err(|_| SessionError::CoordinatorShutdown)
    }

    async fn dispatch<T>(
        &self,
        command: SessionCommand,
        rx: oneshot::Receiver<Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        if self.policy == TransitionPolicy::Reject && command.is_rejectable() && self.is_busy() {
            tracing::debug!(request = ?command.request(), "Rejecting request while busy");
            return Err(SessionError::Busy);
        }

        self.sender
            .send(command)
            .await
            .map_err(|_| SessionError::CoordinatorShutdown)?;

        rx.await.map_err(|_| SessionError::CoordinatorShutdown)?
    }
}
