//! The single authoritative session state.

use std::sync::Arc;

use super::SessionMode;
use super::edit::EditSession;
use crate::library::Entry;
use crate::playback::{PlaybackHandle, PlaybackInfo};
use crate::store::EditContextId;

/// What is happening right now.
///
/// An edit context and a playback handle can never coexist: each lives in
/// its own variant.
#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Browsing,
    Editing(EditSession),
    Playing(PlaybackHandle),
}

impl SessionState {
    pub fn mode(&self) -> SessionMode {
        match self {
            SessionState::Browsing => SessionMode::Browsing,
            SessionState::Editing(_) => SessionMode::Editing,
            SessionState::Playing(_) => SessionMode::Playing,
        }
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        match self {
            SessionState::Editing(session) => Some(session),
            _ => None,
        }
    }

    pub fn playback(&self) -> Option<&PlaybackHandle> {
        match self {
            SessionState::Playing(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Read-only view of the session for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current mode
    pub mode: SessionMode,
    /// Visible entries: the overlay while editing, the committed library otherwise
    pub entries: Arc<[Entry]>,
    /// Committed library revision
    pub revision: u64,
    /// True while editing with uncommitted changes
    pub dirty: bool,
    /// Open edit context, if editing
    pub edit_context: Option<EditContextId>,
    /// Active playback, if playing
    pub playback: Option<PlaybackInfo>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            mode: SessionMode::Browsing,
            entries: Arc::from(Vec::new()),
            revision: 0,
            dirty: false,
            edit_context: None,
            playback: None,
        }
    }
}
