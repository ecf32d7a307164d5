//! Property tests over random request sequences.

use std::sync::Arc;

use cuedeck_core::config::SessionConfig;
use cuedeck_core::library::{ContentLocator, EditOp, Entry, EntryId, positions_contiguous};
use cuedeck_core::session::{
    MockLibraryStore, MockPlaybackSurface, SessionCoordinator, SessionMode,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    Load,
    EnterEdit,
    Insert(usize),
    Remove(usize),
    Move(usize, usize),
    Rename(usize),
    Save,
    Cancel,
    Select(usize),
    Stop,
    FailCommits(bool),
    FailAttach(bool),
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        1 => Just(Action::Load),
        3 => Just(Action::EnterEdit),
        3 => (0usize..8).prop_map(Action::Insert),
        2 => (0usize..8).prop_map(Action::Remove),
        2 => (0usize..8, 0usize..8).prop_map(|(from, to)| Action::Move(from, to)),
        2 => (0usize..8).prop_map(Action::Rename),
        3 => Just(Action::Save),
        2 => Just(Action::Cancel),
        3 => (0usize..8).prop_map(Action::Select),
        2 => Just(Action::Stop),
        1 => any::<bool>().prop_map(Action::FailCommits),
        1 => any::<bool>().prop_map(Action::FailAttach),
    ]
}

fn seed_entries() -> Vec<Entry> {
    (1..=3)
        .map(|id| {
            Entry::new(
                EntryId(id),
                format!("Seed {id}"),
                ContentLocator::new(format!("https://example.com/seed-{id}.swf")),
            )
            .at_position(id as usize - 1)
        })
        .collect()
}

async fn run_actions(actions: Vec<Action>) -> Result<(), TestCaseError> {
    let store = Arc::new(MockLibraryStore::with_entries(seed_entries()));
    let surface = Arc::new(MockPlaybackSurface::new());
    let mut coordinator = SessionCoordinator::new(
        &SessionConfig::default(),
        Arc::clone(&store),
        Arc::clone(&surface),
    );
    coordinator.load_library().await.ok();

    let mut next_id = 100;
    let mut pre_edit: Option<Vec<Entry>> = None;

    for action in actions {
        let visible = coordinator.entries();
        let id_at = |index: usize| visible.get(index % visible.len().max(1)).map(|e| e.id);

        match action {
            Action::Load => {
                let _ = coordinator.load_library().await;
            }
            Action::EnterEdit => {
                if coordinator.enter_edit().await.is_ok() {
                    pre_edit = Some(coordinator.library().entries().to_vec());
                }
            }
            Action::Insert(position) => {
                next_id += 1;
                let entry = Entry::new(
                    EntryId(next_id),
                    format!("Added {next_id}"),
                    ContentLocator::new(format!("https://example.com/{next_id}.swf")),
                );
                let _ = coordinator.apply_edits(&[EditOp::Insert { entry, position }]);
            }
            Action::Remove(index) => {
                if let Some(id) = id_at(index) {
                    let _ = coordinator.apply_edits(&[EditOp::Remove { id }]);
                }
            }
            Action::Move(index, to) => {
                if let Some(id) = id_at(index) {
                    let _ = coordinator.apply_edits(&[EditOp::Move { id, to }]);
                }
            }
            Action::Rename(index) => {
                let title = format!("Renamed {index}");
                let target = id_at(index).unwrap_or(EntryId(index as u64));
                let _ = coordinator.apply_edits(&[EditOp::Update {
                    id: target,
                    title: Some(title),
                    locator: None,
                }]);
            }
            Action::Save => {
                if coordinator.save_edit().await.is_ok() {
                    pre_edit = None;
                }
            }
            Action::Cancel => {
                if coordinator.cancel_edit().await.is_ok() {
                    let restored = coordinator.entries().to_vec();
                    prop_assert_eq!(Some(restored), pre_edit.take());
                }
            }
            Action::Select(index) => {
                if let Some(id) = id_at(index) {
                    let _ = coordinator.select_entry(id).await;
                }
            }
            Action::Stop => {
                let _ = coordinator.stop_playback().await;
            }
            Action::FailCommits(fail) => store.set_commit_failure(fail),
            Action::FailAttach(fail) => surface.set_attach_failure(fail),
        }

        let snapshot = coordinator.snapshot();
        let editing = snapshot.mode == SessionMode::Editing;
        let playing = snapshot.mode == SessionMode::Playing;

        prop_assert_eq!(editing, snapshot.edit_context.is_some());
        prop_assert_eq!(playing, snapshot.playback.is_some());
        prop_assert_eq!(editing, store.has_open_context());
        prop_assert_eq!(usize::from(playing), surface.attached_count());
        prop_assert!(positions_contiguous(&snapshot.entries));
        prop_assert!(positions_contiguous(&coordinator.library().entries()));

        if !editing {
            prop_assert_eq!(
                snapshot.entries.to_vec(),
                store.committed_entries(),
                "browsing view diverged from the committed library"
            );
        }
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn session_state_stays_consistent(actions in prop::collection::vec(action_strategy(), 1..40)) {
        tokio_test::block_on(run_actions(actions))?;
    }
}
