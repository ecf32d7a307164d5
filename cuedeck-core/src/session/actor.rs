//! Actor implementation for the session coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::SessionError;
use super::commands::SessionCommand;
use super::coordinator::SessionCoordinator;
use super::handle::SessionHandle;
use crate::config::SessionConfig;
use crate::playback::PlaybackSurface;
use crate::store::LibraryStore;

/// Spawns the session coordinator actor and returns its handle.
///
/// The actor starts browsing an empty library; call
/// [`SessionHandle::load_library`] to populate it.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use std::sync::Arc;
///
/// use async_trait::async_trait;
/// use cuedeck_core::config::CuedeckConfig;
/// use cuedeck_core::playback::{PlaybackSurface, SurfaceAttachment, SurfaceError};
/// use cuedeck_core::session::spawn_session_coordinator;
/// use cuedeck_core::store::JsonFileLibraryStore;
/// use url::Url;
///
/// struct Headless;
///
/// #[async_trait]
/// impl PlaybackSurface for Headless {
///     async fn attach(&self, _content: &Url) -> Result<SurfaceAttachment, SurfaceError> {
///         Ok(SurfaceAttachment::new(0))
///     }
///
///     async fn detach(&self, _attachment: SurfaceAttachment) -> Result<(), SurfaceError> {
///         Ok(())
///     }
/// }
///
/// let config = CuedeckConfig::default();
/// let handle = spawn_session_coordinator(
///     &config.session,
///     Arc::new(JsonFileLibraryStore::from_config(&config.store)),
///     Arc::new(Headless),
/// );
/// let entries = handle.load_library().await;
/// # }
/// ```
pub fn spawn_session_coordinator<St, Sf>(
    config: &SessionConfig,
    store: Arc<St>,
    surface: Arc<Sf>,
) -> SessionHandle
where
    St: LibraryStore + ?Sized + 'static,
    Sf: PlaybackSurface + ?Sized + 'static,
{
    let (sender, receiver) = mpsc::channel(config.command_buffer);
    let coordinator = SessionCoordinator::new(config, store, surface);
    let in_flight = Arc::new(AtomicBool::new(false));

    let handle = SessionHandle::new(
        sender,
        coordinator.watch_snapshots(),
        coordinator.event_sender(),
        coordinator.cancel_signal(),
        Arc::clone(&in_flight),
        config.transition_policy,
    );

    tokio::spawn(async move {
        run_actor_loop(coordinator, receiver, in_flight).await;
    });

    handle
}

/// Runs the actor message loop until shutdown or until every handle is
/// dropped. Commands are resolved strictly one after another.
async fn run_actor_loop<St, Sf>(
    mut coordinator: SessionCoordinator<St, Sf>,
    mut receiver: mpsc::Receiver<SessionCommand>,
    in_flight: Arc<AtomicBool>,
) where
    St: LibraryStore + ?Sized,
    Sf: PlaybackSurface + ?Sized,
{
    tracing::debug!("Session coordinator actor started");

    while let Some(command) = receiver.recv().await {
        in_flight.store(true, Ordering::SeqCst);
        let keep_running = handle_command(&mut coordinator, command, &in_flight).await;
        in_flight.store(false, Ordering::SeqCst);

        if !keep_running {
            break;
        }
    }

    receiver.close();
    while let Ok(command) = receiver.try_recv() {
        command.reject(SessionError::CoordinatorShutdown);
    }
    coordinator.close().await;

    tracing::debug!("Session coordinator actor stopped");
}

/// Handles a single command. Returns false to shut down.
async fn handle_command<St, Sf>(
    coordinator: &mut SessionCoordinator<St, Sf>,
    command: SessionCommand,
    in_flight: &AtomicBool,
) -> bool
where
    St: LibraryStore + ?Sized,
    Sf: PlaybackSurface + ?Sized,
{
    match command {
        SessionCommand::LoadLibrary { responder } => {
            let result = coordinator.load_library().await;
            reply(in_flight, responder, result);
        }

        SessionCommand::EnterEdit { responder } => {
            let result = coordinator.enter_edit().await;
            reply(in_flight, responder, result);
        }

        SessionCommand::ApplyEdits { edits, responder } => {
            let result = coordinator.apply_edits(&edits);
            reply(in_flight, responder, result);
        }

        SessionCommand::SaveEdit { responder } => {
            let result = coordinator.save_edit().await;
            reply(in_flight, responder, result);
        }

        SessionCommand::CancelEdit { responder } => {
            let result = coordinator.cancel_edit().await;
            reply(in_flight, responder, result);
        }

        SessionCommand::SelectEntry { id, responder } => {
            let result = coordinator.select_entry(id).await;
            reply(in_flight, responder, result);
        }

        SessionCommand::StopPlayback { responder } => {
            let result = coordinator.stop_playback().await;
            reply(in_flight, responder, result);
        }

        SessionCommand::Shutdown { responder } => {
            tracing::debug!("Session coordinator actor shutting down");
            coordinator.close().await;
            reply(in_flight, responder, ());
            return false;
        }
    }

    true
}

/// Clears the busy flag, then answers. A caller holding its response never
/// observes its own request as in flight.
fn reply<T>(in_flight: &AtomicBool, responder: oneshot::Sender<T>, value: T) {
    in_flight.store(false, Ordering::SeqCst);
    let _ = responder.send(value);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::TransitionPolicy;
    use crate::library::{ContentLocator, EditOp, Entry, EntryId};
    use crate::session::test_mocks::{MockLibraryStore, MockPlaybackSurface};
    use crate::session::SessionMode;

    fn sample_entries() -> Vec<Entry> {
        (1..=3)
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

    fn spawn_with(
        config: &SessionConfig,
        store: MockLibraryStore,
    ) -> (SessionHandle, Arc<MockLibraryStore>, Arc<MockPlaybackSurface>) {
        let store = Arc::new(store);
        let surface = Arc::new(MockPlaybackSurface::new());
        let handle = spawn_session_coordinator(config, Arc::clone(&store), Arc::clone(&surface));
        (handle, store, surface)
    }

    #[tokio::test]
    async fn test_actor_round_trip() {
        let (handle, store, surface) = spawn_with(
            &SessionConfig::default(),
            MockLibraryStore::with_entries(sample_entries()),
        );

        let entries = handle.load_library().await.unwrap();
        assert_eq!(entries.len(), 3);

        handle.enter_edit().await.unwrap();
        handle
            .apply_edits(vec![EditOp::Remove { id: EntryId(2) }])
            .await
            .unwrap();
        let saved = handle.save_edit().await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(store.committed_entries().len(), 2);

        handle.select_entry(EntryId(3)).await.unwrap();
        assert_eq!(handle.snapshot().mode, SessionMode::Playing);
        assert_eq!(surface.attached_count(), 1);

        handle.stop_playback().await.unwrap();
        assert_eq!(handle.snapshot().mode, SessionMode::Browsing);
    }

    #[tokio::test]
    async fn test_snapshot_readable_during_pending_commit() {
        let (handle, _, _) = spawn_with(
            &SessionConfig::default(),
            MockLibraryStore::with_entries(sample_entries())
                .with_commit_delay(Duration::from_millis(100)),
        );
        handle.load_library().await.unwrap();
        handle.enter_edit().await.unwrap();

        let saver = handle.clone();
        let save = tokio::spawn(async move { saver.save_edit().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(handle.is_busy());
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.mode, SessionMode::Editing);
        assert_eq!(snapshot.entries.len(), 3);

        save.await.unwrap().unwrap();
        assert!(!handle.is_busy());
    }

    #[tokio::test]
    async fn test_reject_policy_returns_busy() {
        let config = SessionConfig {
            transition_policy: TransitionPolicy::Reject,
            ..SessionConfig::default()
        };
        let (handle, _, _) = spawn_with(
            &config,
            MockLibraryStore::with_entries(sample_entries())
                .with_commit_delay(Duration::from_millis(100)),
        );
        handle.load_library().await.unwrap();
        handle.enter_edit().await.unwrap();

        let saver = handle.clone();
        let save = tokio::spawn(async move { saver.save_edit().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = handle.select_entry(EntryId(1)).await;
        assert!(matches!(result, Err(SessionError::Busy)));

        save.await.unwrap().unwrap();
        handle.select_entry(EntryId(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_policy_waits_for_transition() {
        let (handle, _, _) = spawn_with(
            &SessionConfig::default(),
            MockLibraryStore::with_entries(sample_entries())
                .with_commit_delay(Duration::from_millis(50)),
        );
        handle.load_library().await.unwrap();
        handle.enter_edit().await.unwrap();

        let saver = handle.clone();
        let save = tokio::spawn(async move { saver.save_edit().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Queued behind the save, so it sees Browsing and succeeds.
        handle.select_entry(EntryId(1)).await.unwrap();
        save.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_races_pending_commit() {
        let (handle, store, _) = spawn_with(
            &SessionConfig::default(),
            MockLibraryStore::with_entries(sample_entries())
                .with_commit_delay(Duration::from_millis(500)),
        );
        handle.load_library().await.unwrap();
        handle.enter_edit().await.unwrap();
        handle
            .apply_edits(vec![EditOp::Remove { id: EntryId(1) }])
            .await
            .unwrap();

        let saver = handle.clone();
        let save = tokio::spawn(async move { saver.save_edit().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.cancel_edit().await.unwrap();
        let saved = save.await.unwrap();
        assert!(matches!(saved, Err(SessionError::EditCancelled)));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.mode, SessionMode::Browsing);
        assert_eq!(snapshot.entries.len(), 3);
        assert_eq!(store.committed_entries().len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_after_commit_resolved_is_invalid() {
        let (handle, store, _) = spawn_with(
            &SessionConfig::default(),
            MockLibraryStore::with_entries(sample_entries()),
        );
        handle.load_library().await.unwrap();
        handle.enter_edit().await.unwrap();
        handle.save_edit().await.unwrap();

        let result = handle.cancel_edit().await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidSessionState { .. })
        ));
        assert_eq!(store.commit_calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_and_stops() {
        let (handle, _, surface) = spawn_with(
            &SessionConfig::default(),
            MockLibraryStore::with_entries(sample_entries()),
        );
        handle.load_library().await.unwrap();
        handle.select_entry(EntryId(2)).await.unwrap();

        handle.shutdown().await.unwrap();
        assert_eq!(surface.attached_count(), 0);

        let result = handle.enter_edit().await;
        assert!(matches!(result, Err(SessionError::CoordinatorShutdown)));
        assert!(!handle.is_running());
    }
}
