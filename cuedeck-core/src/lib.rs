//! Cuedeck Core - library, edit and playback session coordination
//!
//! A user browses a library of playable entries, edits it (add, remove,
//! reorder) with explicit save or cancel, and plays one entry at a time.
//! Editing and playback never overlap: the session coordinator owns the
//! single session state and resolves requests one at a time.

pub mod config;
pub mod library;
pub mod playback;
pub mod session;
pub mod store;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::CuedeckConfig;
pub use library::{ContentLocator, EditOp, Entry, EntryId, LibraryError, LibraryModel};
pub use playback::{PlaybackError, PlaybackSurface, SurfaceError};
pub use session::{
    SessionError, SessionEvent, SessionHandle, SessionMode, SessionSnapshot,
    spawn_session_coordinator,
};
pub use store::{JsonFileLibraryStore, LibraryStore, StoreError, StoredLibrary};

/// Errors that can bubble up from any Cuedeck subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CuedeckError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CuedeckError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            CuedeckError::Session(e) => match e {
                SessionError::StoreUnavailable { .. } => {
                    "The library could not be read. Try again.".to_string()
                }
                SessionError::PersistenceFailed { .. } => {
                    "Your changes could not be saved. Retry or cancel.".to_string()
                }
                SessionError::SessionConflict { .. } | SessionError::InvalidSessionState { .. } => {
                    e.to_string()
                }
                SessionError::PlaybackStartFailed { entry_id, .. } => {
                    format!("Entry {entry_id} could not be played")
                }
                SessionError::EntryNotFound { id } => format!("Entry {id} not found"),
                SessionError::InvalidEdit(edit) => format!("Edit rejected: {edit}"),
                SessionError::Busy => "Another action is in progress".to_string(),
                SessionError::EditCancelled => "Edits were cancelled".to_string(),
                SessionError::CoordinatorShutdown => "Session has ended".to_string(),
            },
            CuedeckError::Configuration { reason } => format!("Configuration error: {reason}"),
            CuedeckError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CuedeckError::Configuration { .. }
                | CuedeckError::Session(
                    SessionError::InvalidEdit(_) | SessionError::EntryNotFound { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, CuedeckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_for_failed_save() {
        let error = CuedeckError::from(SessionError::PersistenceFailed {
            reason: "disk full".to_string(),
        });
        assert_eq!(
            error.user_message(),
            "Your changes could not be saved. Retry or cancel."
        );
        assert!(!error.is_user_error());
    }

    #[test]
    fn test_invalid_edit_is_user_error() {
        let error = CuedeckError::from(SessionError::InvalidEdit(
            LibraryError::EntryNotFound { id: EntryId(7) },
        ));
        assert!(error.is_user_error());
        assert!(error.user_message().starts_with("Edit rejected"));
    }

    #[test]
    fn test_io_error_has_generic_message() {
        let error = CuedeckError::from(std::io::Error::other("permission denied"));
        assert_eq!(error.user_message(), "File system error occurred");
        assert!(!error.is_user_error());
    }
}
