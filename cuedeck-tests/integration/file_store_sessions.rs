//! Session coordinator against the JSON file store.

use std::path::Path;
use std::sync::Arc;

use cuedeck_core::config::SessionConfig;
use cuedeck_core::library::{ContentLocator, EditOp, Entry, EntryId};
use cuedeck_core::session::{
    MockPlaybackSurface, SessionError, SessionHandle, SessionMode, spawn_session_coordinator,
};
use cuedeck_core::store::{JsonFileLibraryStore, LibraryStore};
use tempfile::TempDir;

/// Test fixture owning a temporary library document.
struct FileStoreFixture {
    dir: TempDir,
}

impl FileStoreFixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn library_path(&self) -> std::path::PathBuf {
        self.dir.path().join("library.json")
    }

    /// Spawns a fresh coordinator over the document without loading it.
    fn spawn(&self) -> SessionHandle {
        let store = Arc::new(JsonFileLibraryStore::new(self.library_path()));
        spawn_session_coordinator(
            &SessionConfig::default(),
            store,
            Arc::new(MockPlaybackSurface::new()),
        )
    }

    /// Spawns a fresh coordinator over the document and loads it.
    async fn open(&self) -> SessionHandle {
        let handle = self.spawn();
        handle.load_library().await.unwrap();
        handle
    }

    fn read_document(&self) -> String {
        std::fs::read_to_string(self.library_path()).unwrap()
    }
}

fn entry(id: u64, title: &str) -> Entry {
    Entry::new(
        EntryId(id),
        title,
        ContentLocator::new(format!("https://example.com/{id}.swf")),
    )
}

fn temp_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

#[tokio::test]
async fn test_saved_edits_survive_restart() {
    let fixture = FileStoreFixture::new();

    let session = fixture.open().await;
    assert!(session.snapshot().entries.is_empty());

    session.enter_edit().await.unwrap();
    session
        .apply_edits(vec![
            EditOp::Insert {
                entry: entry(1, "Intro"),
                position: 0,
            },
            EditOp::Insert {
                entry: entry(2, "Finale"),
                position: 1,
            },
        ])
        .await
        .unwrap();
    session
        .apply_edits(vec![EditOp::Move {
            id: EntryId(2),
            to: 0,
        }])
        .await
        .unwrap();
    session.save_edit().await.unwrap();
    session.shutdown().await.unwrap();

    assert!(temp_files(fixture.dir.path()).is_empty());

    let reopened = fixture.open().await;
    let entries = reopened.snapshot().entries;
    let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![EntryId(2), EntryId(1)]);
    assert_eq!(entries[0].position, 0);
    assert_eq!(entries[1].position, 1);
}

#[tokio::test]
async fn test_cancel_leaves_document_untouched() {
    let fixture = FileStoreFixture::new();

    let session = fixture.open().await;
    session.enter_edit().await.unwrap();
    session
        .apply_edits(vec![EditOp::Insert {
            entry: entry(1, "Intro"),
            position: 0,
        }])
        .await
        .unwrap();
    session.save_edit().await.unwrap();
    let before = fixture.read_document();

    session.enter_edit().await.unwrap();
    session
        .apply_edits(vec![EditOp::Remove { id: EntryId(1) }])
        .await
        .unwrap();
    session.cancel_edit().await.unwrap();

    assert_eq!(fixture.read_document(), before);
    assert_eq!(session.snapshot().entries.len(), 1);
    assert!(temp_files(fixture.dir.path()).is_empty());
}

#[tokio::test]
async fn test_concurrent_writer_fails_commit_and_keeps_overlay() {
    let fixture = FileStoreFixture::new();
    let session = fixture.open().await;

    session.enter_edit().await.unwrap();
    session
        .apply_edits(vec![EditOp::Insert {
            entry: entry(1, "Intro"),
            position: 0,
        }])
        .await
        .unwrap();

    // Another process rewrites the library while we edit.
    let foreign = serde_json::json!({ "revision": 7, "entries": [] });
    std::fs::write(fixture.library_path(), foreign.to_string()).unwrap();

    let result = session.save_edit().await;
    assert!(matches!(result, Err(SessionError::PersistenceFailed { .. })));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.mode, SessionMode::Editing);
    assert!(snapshot.dirty);
    assert_eq!(snapshot.entries.len(), 1);

    session.cancel_edit().await.unwrap();
    assert_eq!(session.snapshot().mode, SessionMode::Browsing);
    assert!(session.snapshot().entries.is_empty());
}

#[tokio::test]
async fn test_commit_from_another_store_after_load_fails_save() {
    let fixture = FileStoreFixture::new();
    let session = fixture.open().await;
    assert!(session.snapshot().entries.is_empty());

    // A second writer commits between our load and our edit session.
    let other = JsonFileLibraryStore::new(fixture.library_path());
    let context = other.begin_edit_session(0).await.unwrap();
    other
        .commit(&context, &[entry(9, "Foreign").at_position(0)])
        .await
        .unwrap();

    session.enter_edit().await.unwrap();
    session
        .apply_edits(vec![EditOp::Insert {
            entry: entry(1, "Intro"),
            position: 0,
        }])
        .await
        .unwrap();

    let result = session.save_edit().await;
    assert!(matches!(result, Err(SessionError::PersistenceFailed { .. })));
    assert_eq!(session.snapshot().mode, SessionMode::Editing);

    let stored = other.load().await.unwrap();
    assert_eq!(stored.revision, 1);
    let ids: Vec<_> = stored.entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![EntryId(9)]);
}

#[tokio::test]
async fn test_edit_without_load_keeps_existing_entries() {
    let fixture = FileStoreFixture::new();
    let document = serde_json::json!({
        "revision": 0,
        "entries": [entry(1, "Intro").at_position(0), entry(2, "Finale").at_position(1)],
    });
    std::fs::write(fixture.library_path(), document.to_string()).unwrap();

    let session = fixture.spawn();
    session.enter_edit().await.unwrap();
    assert_eq!(session.snapshot().entries.len(), 2);

    session
        .apply_edits(vec![EditOp::Insert {
            entry: entry(3, "Credits"),
            position: 2,
        }])
        .await
        .unwrap();
    session.save_edit().await.unwrap();
    session.shutdown().await.unwrap();

    let reopened = fixture.open().await;
    let ids: Vec<_> = reopened.snapshot().entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![EntryId(1), EntryId(2), EntryId(3)]);
}

#[tokio::test]
async fn test_update_rewrites_entry_in_document() {
    let fixture = FileStoreFixture::new();
    let session = fixture.open().await;

    session.enter_edit().await.unwrap();
    session
        .apply_edits(vec![EditOp::Insert {
            entry: entry(1, "Intro"),
            position: 0,
        }])
        .await
        .unwrap();
    session.save_edit().await.unwrap();

    session.enter_edit().await.unwrap();
    session
        .apply_edits(vec![EditOp::Update {
            id: EntryId(1),
            title: Some("Opening".to_string()),
            locator: None,
        }])
        .await
        .unwrap();
    session.save_edit().await.unwrap();

    let stored = JsonFileLibraryStore::new(fixture.library_path())
        .load()
        .await
        .unwrap();
    assert_eq!(stored.revision, 2);
    assert_eq!(stored.entries[0].title, "Opening");
    assert_eq!(stored.entries[0].locator, entry(1, "Intro").locator);
}

#[tokio::test]
async fn test_corrupt_document_reports_unavailable() {
    let fixture = FileStoreFixture::new();
    std::fs::write(fixture.library_path(), "{ not json").unwrap();

    let handle = spawn_session_coordinator(
        &SessionConfig::default(),
        Arc::new(JsonFileLibraryStore::new(fixture.library_path())),
        Arc::new(MockPlaybackSurface::new()),
    );

    let result = handle.load_library().await;
    assert!(matches!(result, Err(SessionError::StoreUnavailable { .. })));
    assert_eq!(handle.snapshot().mode, SessionMode::Browsing);
}
