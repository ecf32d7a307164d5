//! Playback surface interface and the at-most-one playback handle.

pub mod controller;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use controller::PlaybackController;
use url::Url;
use uuid::Uuid;

use crate::library::{ContentLocator, EntryId};

/// Surface-side token for one attached piece of content.
///
/// Returned by [`PlaybackSurface::attach`] and handed back on detach.
#[derive(Debug, PartialEq, Eq)]
pub struct SurfaceAttachment {
    slot: u64,
}

impl SurfaceAttachment {
    /// Creates an attachment token for a surface-assigned slot.
    pub fn new(slot: u64) -> Self {
        Self { slot }
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }
}

/// External collaborator that renders attached content.
///
/// `attach` must be cancel-safe: if the future is dropped before resolving,
/// nothing stays attached.
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Attaches resolved content to the surface.
    ///
    /// # Errors
    ///
    /// - `SurfaceError::AttachFailed` - Content could not be attached
    /// - `SurfaceError::SurfaceBusy` - Surface is already presenting content
    async fn attach(&self, content: &Url) -> Result<SurfaceAttachment, SurfaceError>;

    /// Tears down an attachment. Callers treat this as always succeeding.
    ///
    /// # Errors
    ///
    /// - `SurfaceError::DetachFailed` - Underlying teardown reported a problem
    async fn detach(&self, attachment: SurfaceAttachment) -> Result<(), SurfaceError>;
}

/// Errors reported by a playback surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("Attach failed: {reason}")]
    AttachFailed { reason: String },

    #[error("Playback surface is busy")]
    SurfaceBusy,

    #[error("Detach failed: {reason}")]
    DetachFailed { reason: String },
}

/// Why a playback start did not produce a handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// Locator is neither an absolute URL nor an absolute path
    #[error("Content locator '{locator}' cannot be resolved")]
    Unresolvable { locator: ContentLocator },

    /// Surface refused the attachment
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    /// Surface did not answer within the attach timeout
    #[error("Attach timed out after {0:?}")]
    TimedOut(Duration),
}

/// Resolves a content locator into something the surface can attach.
///
/// Absolute URLs are used as-is and absolute filesystem paths become
/// `file://` URLs.
///
/// # Errors
///
/// - `PlaybackError::Unresolvable` - Empty, relative, or malformed locator
pub fn resolve_locator(locator: &ContentLocator) -> Result<Url, PlaybackError> {
    let unresolvable = || PlaybackError::Unresolvable {
        locator: locator.clone(),
    };

    let raw = locator.as_str().trim();
    if raw.is_empty() {
        return Err(unresolvable());
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        return Url::from_file_path(path).map_err(|_| unresolvable());
    }

    Url::parse(raw).map_err(|_| unresolvable())
}

/// Identifier of one playback attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandleId(Uuid);

impl PlaybackHandleId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlaybackHandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The live attachment of an entry to the playback surface.
///
/// Not `Clone`: only one value exists per attachment and it is consumed by
/// [`PlaybackController::stop`]. Presentation reads [`PlaybackInfo`].
#[derive(Debug)]
pub struct PlaybackHandle {
    id: PlaybackHandleId,
    entry_id: EntryId,
    url: Url,
    started_at: DateTime<Utc>,
    attachment: SurfaceAttachment,
}

impl PlaybackHandle {
    pub(crate) fn new(entry_id: EntryId, url: Url, attachment: SurfaceAttachment) -> Self {
        Self {
            id: PlaybackHandleId::generate(),
            entry_id,
            url,
            started_at: Utc::now(),
            attachment,
        }
    }

    pub fn id(&self) -> PlaybackHandleId {
        self.id
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Read-only view for presentation.
    pub fn info(&self) -> PlaybackInfo {
        PlaybackInfo {
            handle_id: self.id,
            entry_id: self.entry_id,
            url: self.url.clone(),
            started_at: self.started_at,
        }
    }

    pub(crate) fn into_attachment(self) -> SurfaceAttachment {
        self.attachment
    }
}

/// Presentation view of the active playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackInfo {
    pub handle_id: PlaybackHandleId,
    pub entry_id: EntryId,
    pub url: Url,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_url() {
        let url = resolve_locator(&ContentLocator::new("https://cdn.example.com/a.swf")).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/a.swf");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_absolute_path() {
        let url = resolve_locator(&ContentLocator::new("/media/games/logo.swf")).unwrap();
        assert_eq!(url.as_str(), "file:///media/games/logo.swf");
    }

    #[test]
    fn test_relative_and_empty_locators_unresolvable() {
        for raw in ["", "   ", "games/logo.swf", "not a url"] {
            let result = resolve_locator(&ContentLocator::new(raw));
            assert!(
                matches!(result, Err(PlaybackError::Unresolvable { .. })),
                "{raw:?} should not resolve"
            );
        }
    }
}
