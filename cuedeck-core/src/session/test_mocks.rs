//! Mock collaborators for testing the session coordinator.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::library::Entry;
use crate::playback::{PlaybackSurface, SurfaceAttachment, SurfaceError};
use crate::store::{EditContext, EditContextId, LibraryStore, StoreError, StoredLibrary};

#[derive(Debug, Default)]
struct MockStoreState {
    entries: Vec<Entry>,
    revision: u64,
    open: Option<EditContextId>,
    last_consumed: Option<EditContextId>,
}

impl MockStoreState {
    fn consume(&mut self, context_id: EditContextId) {
        self.open = None;
        self.last_consumed = Some(context_id);
    }
}

/// In-memory library store with switchable failures.
#[derive(Debug, Default)]
pub struct MockLibraryStore {
    state: Mutex<MockStoreState>,
    unavailable: AtomicBool,
    fail_commits: AtomicBool,
    fail_discards: AtomicBool,
    commit_delay: Option<Duration>,
    load_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    discard_calls: AtomicUsize,
}

impl MockLibraryStore {
    /// Creates an empty, healthy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `entries`.
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        let store = Self::new();
        store.state.lock().entries = entries;
        store
    }

    /// Creates a store whose commits are rejected.
    pub fn new_with_commit_failure() -> Self {
        let store = Self::new();
        store.set_commit_failure(true);
        store
    }

    /// Creates a store that cannot be reached.
    pub fn new_unavailable() -> Self {
        let store = Self::new();
        store.set_unavailable(true);
        store
    }

    /// Delays every commit, to exercise timeouts and cancellation.
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    pub fn set_commit_failure(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn set_discard_failure(&self, fail: bool) {
        self.fail_discards.store(fail, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Entries as last committed.
    pub fn committed_entries(&self) -> Vec<Entry> {
        self.state.lock().entries.clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn discard_calls(&self) -> usize {
        self.discard_calls.load(Ordering::SeqCst)
    }

    /// Returns true while an edit context is open.
    pub fn has_open_context(&self) -> bool {
        self.state.lock().open.is_some()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "mock store offline".to_string(),
            });
        }
        Ok(())
    }
}

fn ensure_open(state: &MockStoreState, context_id: EditContextId) -> Result<(), StoreError> {
    if state.open == Some(context_id) {
        Ok(())
    } else if state.last_consumed == Some(context_id) {
        Err(StoreError::ContextConsumed { context_id })
    } else {
        Err(StoreError::UnknownContext { context_id })
    }
}

#[async_trait]
impl LibraryStore for MockLibraryStore {
    async fn load(&self) -> Result<StoredLibrary, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let state = self.state.lock();
        Ok(StoredLibrary::new(state.revision, state.entries.clone()))
    }

    async fn begin_edit_session(&self, base_revision: u64) -> Result<EditContext, StoreError> {
        self.check_available()?;

        let mut state = self.state.lock();
        if let Some(context_id) = state.open {
            return Err(StoreError::SessionAlreadyOpen { context_id });
        }
        let context = EditContext::new(base_revision);
        state.open = Some(context.id());
        Ok(context)
    }

    async fn commit(&self, context: &EditContext, overlay: &[Entry]) -> Result<u64, StoreError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }

        self.check_available()?;
        let mut state = self.state.lock();
        ensure_open(&state, context.id())?;

        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::PersistenceFailed {
                reason: "mock commit failure".to_string(),
            });
        }

        if state.revision != context.base_revision() {
            return Err(StoreError::PersistenceFailed {
                reason: format!(
                    "mock store at revision {}, context based on {}",
                    state.revision,
                    context.base_revision()
                ),
            });
        }

        state.entries = overlay.to_vec();
        state.revision += 1;
        state.consume(context.id());
        Ok(state.revision)
    }

    async fn discard(&self, context: EditContext) -> Result<(), StoreError> {
        self.discard_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        ensure_open(&state, context.id())?;
        state.consume(context.id());

        if self.fail_discards.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "mock discard failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Playback surface that records attachments.
#[derive(Debug, Default)]
pub struct MockPlaybackSurface {
    attached: Mutex<Vec<(u64, Url)>>,
    next_slot: AtomicU64,
    fail_attach: AtomicBool,
    fail_detach: AtomicBool,
    attach_delay: Option<Duration>,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,
}

impl MockPlaybackSurface {
    /// Creates a surface that accepts every attachment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a surface that refuses every attachment.
    pub fn new_with_attach_failure() -> Self {
        let surface = Self::new();
        surface.set_attach_failure(true);
        surface
    }

    /// Creates a surface whose teardown always reports an error.
    pub fn new_with_detach_failure() -> Self {
        let surface = Self::new();
        surface.fail_detach.store(true, Ordering::SeqCst);
        surface
    }

    /// Delays every attach, to exercise timeouts.
    pub fn with_attach_delay(mut self, delay: Duration) -> Self {
        self.attach_delay = Some(delay);
        self
    }

    pub fn set_attach_failure(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    /// Number of currently attached contents.
    pub fn attached_count(&self) -> usize {
        self.attached.lock().len()
    }

    /// URLs currently attached.
    pub fn attached_urls(&self) -> Vec<Url> {
        self.attached.lock().iter().map(|(_, url)| url.clone()).collect()
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackSurface for MockPlaybackSurface {
    async fn attach(&self, content: &Url) -> Result<SurfaceAttachment, SurfaceError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.attach_delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(SurfaceError::AttachFailed {
                reason: format!("mock surface refused {content}"),
            });
        }

        let slot = self.next_slot.fetch_add(1, Ordering::SeqCst);
        self.attached.lock().push((slot, content.clone()));
        Ok(SurfaceAttachment::new(slot))
    }

    async fn detach(&self, attachment: SurfaceAttachment) -> Result<(), SurfaceError> {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        self.attached
            .lock()
            .retain(|(slot, _)| *slot != attachment.slot());

        if self.fail_detach.load(Ordering::SeqCst) {
            return Err(SurfaceError::DetachFailed {
                reason: "mock teardown failure".to_string(),
            });
        }
        Ok(())
    }
}
