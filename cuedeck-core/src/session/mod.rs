//! Session coordination: browse, edit and playback modes.
//!
//! [`SessionCoordinator`] owns the single [`SessionState`] and routes
//! requests to the edit-mode state machine and the playback controller.
//! [`spawn_session_coordinator`] runs it as an actor so requests from many
//! callers are resolved one at a time.

pub mod actor;
pub mod cancel;
pub mod commands;
pub mod coordinator;
pub mod edit;
pub mod handle;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

use std::fmt;

pub use actor::spawn_session_coordinator;
pub use cancel::CancelSignal;
pub use commands::SessionCommand;
pub use coordinator::SessionCoordinator;
pub use edit::{EditSession, EditStateMachine};
pub use handle::SessionHandle;
use serde::{Deserialize, Serialize};
pub use state::{SessionSnapshot, SessionState};
#[cfg(any(test, feature = "test-utils"))]
pub use test_mocks::{MockLibraryStore, MockPlaybackSurface};

use crate::library::{EntryId, LibraryError};
use crate::playback::PlaybackError;
use crate::store::EditContextId;

/// Which mode the session is in, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Browsing,
    Editing,
    Playing,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Browsing => write!(f, "browsing"),
            SessionMode::Editing => write!(f, "editing"),
            SessionMode::Playing => write!(f, "playing"),
        }
    }
}

/// Requests the coordinator accepts, used for errors, events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRequest {
    LoadLibrary,
    EnterEdit,
    ApplyEdits,
    SaveEdit,
    CancelEdit,
    SelectEntry,
    StopPlayback,
}

impl fmt::Display for SessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionRequest::LoadLibrary => "load library",
            SessionRequest::EnterEdit => "enter edit mode",
            SessionRequest::ApplyEdits => "apply edits",
            SessionRequest::SaveEdit => "save edits",
            SessionRequest::CancelEdit => "cancel edits",
            SessionRequest::SelectEntry => "start playback",
            SessionRequest::StopPlayback => "stop playback",
        };
        f.write_str(name)
    }
}

/// Notifications for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session moved to a different mode
    StateChanged { from: SessionMode, to: SessionMode },
    /// Committed library snapshot was replaced
    LibraryReplaced { revision: u64, entries: usize },
    /// An edit batch was applied to the overlay
    EditApplied {
        context_id: EditContextId,
        dirty: bool,
    },
    /// A request failed; the session stayed in a valid state
    RequestFailed {
        request: SessionRequest,
        error: String,
    },
}

/// Errors returned to callers of the session coordinator.
///
/// None of these leave the coordinator in an invalid state.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Store could not be reached; retry the request
    #[error("Library store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Commit was rejected; the edit overlay is preserved
    #[error("Failed to persist edits: {reason}")]
    PersistenceFailed { reason: String },

    /// Editing and playback exclude each other, and only one of each runs
    #[error("Cannot {request} while {active}")]
    SessionConflict {
        request: SessionRequest,
        active: SessionMode,
    },

    /// Request does not fit the current state, e.g. saving a consumed context
    #[error("Cannot {request} while {mode}")]
    InvalidSessionState {
        request: SessionRequest,
        mode: SessionMode,
    },

    /// Playback could not start; the session is still browsing
    #[error("Playback of entry {entry_id} failed to start: {source}")]
    PlaybackStartFailed {
        entry_id: EntryId,
        source: PlaybackError,
    },

    /// Another transition is in flight
    #[error("Session is busy with another transition")]
    Busy,

    /// Selected entry is not in the library
    #[error("Entry {id} not found")]
    EntryNotFound { id: EntryId },

    /// Edit batch was rejected; the overlay is unchanged
    #[error("Invalid edit: {0}")]
    InvalidEdit(#[from] LibraryError),

    /// Cancel won the race against a pending commit
    #[error("Edit session was cancelled before the commit resolved")]
    EditCancelled,

    /// Coordinator actor is no longer running
    #[error("Session coordinator has shut down")]
    CoordinatorShutdown,
}

impl SessionError {
    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Busy
                | SessionError::StoreUnavailable { .. }
                | SessionError::PersistenceFailed { .. }
        )
    }
}
