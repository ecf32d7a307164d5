//! Requests from many callers against one coordinator.

use std::sync::Arc;
use std::time::Duration;

use cuedeck_core::config::{SessionConfig, TransitionPolicy};
use cuedeck_core::library::{ContentLocator, EditOp, Entry, EntryId};
use cuedeck_core::session::{
    MockLibraryStore, MockPlaybackSurface, SessionError, SessionEvent, SessionHandle, SessionMode,
    spawn_session_coordinator,
};
use futures::future::join_all;

/// Test fixture for concurrent access through cloned handles.
struct ConcurrencyFixture {
    handle: SessionHandle,
    store: Arc<MockLibraryStore>,
    surface: Arc<MockPlaybackSurface>,
}

impl ConcurrencyFixture {
    async fn new(policy: TransitionPolicy, commit_delay: Duration) -> Self {
        let config = SessionConfig {
            transition_policy: policy,
            ..SessionConfig::default()
        };
        let store = Arc::new(MockLibraryStore::with_entries(entries()).with_commit_delay(commit_delay));
        let surface = Arc::new(MockPlaybackSurface::new());
        let handle = spawn_session_coordinator(&config, Arc::clone(&store), Arc::clone(&surface));
        handle.load_library().await.unwrap();

        Self {
            handle,
            store,
            surface,
        }
    }
}

fn entries() -> Vec<Entry> {
    (1..=4)
        .map(|id| {
            Entry::new(
                EntryId(id),
                format!("Movie {id}"),
                ContentLocator::new(format!("https://example.com/movie-{id}.swf")),
            )
            .at_position(id as usize - 1)
        })
        .collect()
}

#[tokio::test]
async fn test_concurrent_starts_yield_one_playback() {
    let fixture = ConcurrencyFixture::new(TransitionPolicy::Queue, Duration::ZERO).await;

    let starts = (1..=4).map(|id| {
        let handle = fixture.handle.clone();
        async move { handle.select_entry(EntryId(id)).await }
    });
    let results = join_all(starts).await;

    let started = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(started, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SessionError::SessionConflict { .. }))
    );
    assert_eq!(fixture.surface.attached_count(), 1);
    assert_eq!(fixture.handle.snapshot().mode, SessionMode::Playing);
}

#[tokio::test]
async fn test_edit_and_play_race_never_overlap() {
    let fixture = ConcurrencyFixture::new(TransitionPolicy::Queue, Duration::ZERO).await;

    let editor = fixture.handle.clone();
    let player = fixture.handle.clone();
    let (edit, play) = tokio::join!(editor.enter_edit(), player.select_entry(EntryId(2)));

    assert!(edit.is_ok() != play.is_ok());
    let snapshot = fixture.handle.snapshot();
    assert!(!(snapshot.edit_context.is_some() && snapshot.playback.is_some()));
    assert_eq!(fixture.store.has_open_context(), edit.is_ok());
}

#[tokio::test]
async fn test_reject_policy_turns_away_structural_requests() {
    let fixture =
        ConcurrencyFixture::new(TransitionPolicy::Reject, Duration::from_millis(200)).await;
    fixture.handle.enter_edit().await.unwrap();

    let saver = fixture.handle.clone();
    let save = tokio::spawn(async move { saver.save_edit().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(
        fixture.handle.select_entry(EntryId(1)).await,
        Err(SessionError::Busy)
    ));
    assert!(matches!(
        fixture.handle.enter_edit().await,
        Err(SessionError::Busy)
    ));
    assert!(SessionError::Busy.is_retryable());

    // Reads stay available while the commit is pending.
    assert_eq!(fixture.handle.snapshot().mode, SessionMode::Editing);

    save.await.unwrap().unwrap();
    fixture.handle.select_entry(EntryId(1)).await.unwrap();
}

#[tokio::test]
async fn test_cancel_overtakes_slow_commit() {
    let fixture =
        ConcurrencyFixture::new(TransitionPolicy::Reject, Duration::from_millis(500)).await;
    let mut events = fixture.handle.subscribe();

    fixture.handle.enter_edit().await.unwrap();
    fixture
        .handle
        .apply_edits(vec![EditOp::Remove { id: EntryId(4) }])
        .await
        .unwrap();

    let saver = fixture.handle.clone();
    let save = tokio::spawn(async move { saver.save_edit().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Cancel is never rejected, even under the reject policy.
    fixture.handle.cancel_edit().await.unwrap();
    assert!(matches!(
        save.await.unwrap(),
        Err(SessionError::EditCancelled)
    ));

    assert_eq!(fixture.store.committed_entries(), entries());
    assert_eq!(fixture.handle.snapshot().entries.len(), 4);
    assert!(!fixture.store.has_open_context());

    let mut saw_return_to_browsing = false;
    while let Ok(event) = events.try_recv() {
        if event
            == (SessionEvent::StateChanged {
                from: SessionMode::Editing,
                to: SessionMode::Browsing,
            })
        {
            saw_return_to_browsing = true;
        }
    }
    assert!(saw_return_to_browsing);
}

#[tokio::test]
async fn test_watchers_see_every_transition() {
    let fixture = ConcurrencyFixture::new(TransitionPolicy::Queue, Duration::ZERO).await;
    let mut watcher = fixture.handle.watch();
    watcher.mark_unchanged();

    fixture.handle.select_entry(EntryId(3)).await.unwrap();
    watcher.changed().await.unwrap();
    let playing = watcher.borrow_and_update().clone();
    assert_eq!(playing.mode, SessionMode::Playing);
    assert_eq!(
        playing.playback.map(|info| info.entry_id),
        Some(EntryId(3))
    );

    fixture.handle.stop_playback().await.unwrap();
    watcher.changed().await.unwrap();
    assert_eq!(watcher.borrow().mode, SessionMode::Browsing);
}
