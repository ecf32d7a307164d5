//! Command definitions for the session coordinator actor.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{SessionError, SessionRequest};
use crate::library::{EditOp, Entry, EntryId};
use crate::playback::PlaybackInfo;
use crate::store::EditContextId;

/// Commands that can be sent to the session coordinator actor.
///
/// Each command carries a response channel for the result. The actor
/// resolves one command fully before it receives the next.
#[derive(Debug)]
pub enum SessionCommand {
    /// Reload the committed library from the store.
    LoadLibrary {
        responder: oneshot::Sender<Result<Arc<[Entry]>, SessionError>>,
    },
    /// Open an edit session.
    EnterEdit {
        responder: oneshot::Sender<Result<EditContextId, SessionError>>,
    },
    /// Apply a batch of edits to the open overlay.
    ApplyEdits {
        edits: Vec<EditOp>,
        responder: oneshot::Sender<Result<Vec<Entry>, SessionError>>,
    },
    /// Commit the overlay and leave edit mode.
    SaveEdit {
        responder: oneshot::Sender<Result<Arc<[Entry]>, SessionError>>,
    },
    /// Discard the overlay and leave edit mode.
    CancelEdit {
        responder: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Start playback of an entry.
    SelectEntry {
        id: EntryId,
        responder: oneshot::Sender<Result<PlaybackInfo, SessionError>>,
    },
    /// Stop the active playback.
    StopPlayback {
        responder: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Tear down the active session and stop the actor.
    Shutdown { responder: oneshot::Sender<()> },
}

impl SessionCommand {
    /// The request this command carries, or `None` for shutdown.
    pub fn request(&self) -> Option<SessionRequest> {
        match self {
            SessionCommand::LoadLibrary { .. } => Some(SessionRequest::LoadLibrary),
            SessionCommand::EnterEdit { .. } => Some(SessionRequest::EnterEdit),
            SessionCommand::ApplyEdits { .. } => Some(SessionRequest::ApplyEdits),
            SessionCommand::SaveEdit { .. } => Some(SessionRequest::SaveEdit),
            SessionCommand::CancelEdit { .. } => Some(SessionRequest::CancelEdit),
            SessionCommand::SelectEntry { .. } => Some(SessionRequest::SelectEntry),
            SessionCommand::StopPlayback { .. } => Some(SessionRequest::StopPlayback),
            SessionCommand::Shutdown { .. } => None,
        }
    }

    /// Returns true if the command may be turned away with `Busy` while
    /// another transition is in flight. Cancel and shutdown never are.
    pub fn is_rejectable(&self) -> bool {
        !matches!(
            self,
            SessionCommand::CancelEdit { .. } | SessionCommand::Shutdown { .. }
        )
    }

    /// Answers the command with `error` without running it.
    pub fn reject(self, error: SessionError) {
        match self {
            SessionCommand::LoadLibrary { responder } | SessionCommand::SaveEdit { responder } => {
                let _ = responder.send(Err(error));
            }
            SessionCommand::EnterEdit { responder } => {
                let _ = responder.send(Err(error));
            }
            SessionCommand::ApplyEdits { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            SessionCommand::CancelEdit { responder }
            | SessionCommand::StopPlayback { responder } => {
                let _ = responder.send(Err(error));
            }
            SessionCommand::SelectEntry { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            SessionCommand::Shutdown { responder } => {
                let _ = responder.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_and_shutdown_are_never_rejected() {
        let (responder, _rx) = oneshot::channel();
        assert!(!SessionCommand::CancelEdit { responder }.is_rejectable());

        let (responder, _rx) = oneshot::channel();
        assert!(!SessionCommand::Shutdown { responder }.is_rejectable());

        let (responder, _rx) = oneshot::channel();
        let command = SessionCommand::EnterEdit { responder };
        assert!(command.is_rejectable());
        assert_eq!(command.request(), Some(SessionRequest::EnterEdit));
    }

    #[tokio::test]
    async fn test_reject_answers_responder() {
        let (responder, rx) = oneshot::channel();
        SessionCommand::SelectEntry {
            id: EntryId(1),
            responder,
        }
        .reject(SessionError::Busy);

        assert!(matches!(rx.await.unwrap(), Err(SessionError::Busy)));
    }
}
