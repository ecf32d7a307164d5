//! Playback session controller.

use std::sync::Arc;
use std::time::Duration;

use super::{PlaybackError, PlaybackHandle, PlaybackSurface, resolve_locator};
use crate::library::Entry;
use crate::session::{SessionError, SessionRequest, SessionState};

/// Mediates start and stop of the single playback attachment.
///
/// The controller never stores the handle itself: a successful `start`
/// hands it to the coordinator, which keeps it inside
/// [`SessionState::Playing`] until it is passed back to `stop`.
#[derive(Debug)]
pub struct PlaybackController<Sf: ?Sized> {
    surface: Arc<Sf>,
    attach_timeout: Duration,
}

impl<Sf: PlaybackSurface + ?Sized> PlaybackController<Sf> {
    pub fn new(surface: Arc<Sf>, attach_timeout: Duration) -> Self {
        Self {
            surface,
            attach_timeout,
        }
    }

    /// Attaches `entry` to the surface.
    ///
    /// Only valid while browsing. On any failure no handle exists and the
    /// caller stays in `Browsing`.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionConflict` - Editing, or already playing
    /// - `SessionError::PlaybackStartFailed` - Locator unresolvable, surface
    ///   refused, or attach timed out
    pub async fn start(
        &self,
        state: &SessionState,
        entry: &Entry,
    ) -> Result<PlaybackHandle, SessionError> {
        if !matches!(state, SessionState::Browsing) {
            return Err(SessionError::SessionConflict {
                request: SessionRequest::SelectEntry,
                active: state.mode(),
            });
        }

        let start_failed = |source: PlaybackError| SessionError::PlaybackStartFailed {
            entry_id: entry.id,
            source,
        };

        let url = resolve_locator(&entry.locator).map_err(start_failed)?;

        let attachment = match tokio::time::timeout(self.attach_timeout, self.surface.attach(&url))
            .await
        {
            Ok(Ok(attachment)) => attachment,
            Ok(Err(e)) => return Err(start_failed(PlaybackError::Surface(e))),
            Err(_) => return Err(start_failed(PlaybackError::TimedOut(self.attach_timeout))),
        };

        let handle = PlaybackHandle::new(entry.id, url, attachment);
        tracing::info!(
            entry_id = %entry.id,
            handle_id = %handle.id(),
            url = %handle.url(),
            "Playback started"
        );
        Ok(handle)
    }

    /// Tears down `handle`. Surface errors are logged, never returned.
    pub async fn stop(&self, handle: PlaybackHandle) {
        let handle_id = handle.id();
        let entry_id = handle.entry_id();

        match self.surface.detach(handle.into_attachment()).await {
            Ok(()) => tracing::info!(%handle_id, %entry_id, "Playback stopped"),
            Err(e) => tracing::warn!(%handle_id, %entry_id, "Playback surface teardown failed: {e}"),
        }
    }
}
