//! JSON file backed library store.
//!
//! The whole library lives in one JSON document. Commits write a temporary
//! sibling file and rename it over the document, so readers only ever see a
//! complete library.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{EditContext, EditContextId, LibraryStore, StoreError, StoredLibrary};
use crate::config::StoreConfig;
use crate::library::Entry;

/// On-disk representation of the library.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryDocument {
    revision: u64,
    entries: Vec<Entry>,
}

/// At most one context is open; only the most recently closed one is
/// remembered, which is enough to report a repeated commit or discard.
#[derive(Debug, Default)]
struct ContextTracker {
    open: Option<EditContextId>,
    last_consumed: Option<EditContextId>,
}

impl ContextTracker {
    fn ensure_open(&self, context_id: EditContextId) -> Result<(), StoreError> {
        if self.open == Some(context_id) {
            Ok(())
        } else if self.last_consumed == Some(context_id) {
            Err(StoreError::ContextConsumed { context_id })
        } else {
            Err(StoreError::UnknownContext { context_id })
        }
    }

    fn consume(&mut self, context_id: EditContextId) {
        self.open = None;
        self.last_consumed = Some(context_id);
    }
}

/// Library store persisting to a single JSON file.
#[derive(Debug)]
pub struct JsonFileLibraryStore {
    path: PathBuf,
    temp_path: PathBuf,
    pretty: bool,
    contexts: Mutex<ContextTracker>,
}

impl JsonFileLibraryStore {
    /// Creates a store for the document at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, StoreConfig::default().temp_file_suffix, true)
    }

    /// Creates a store from configuration.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_options(
            config.library_path.clone(),
            config.temp_file_suffix,
            config.pretty,
        )
    }

    fn with_options(path: impl Into<PathBuf>, temp_file_suffix: &str, pretty: bool) -> Self {
        let path = path.into();
        let mut temp_name = path.clone().into_os_string();
        temp_name.push(temp_file_suffix);

        Self {
            path,
            temp_path: PathBuf::from(temp_name),
            pretty,
            contexts: Mutex::new(ContextTracker::default()),
        }
    }

    /// Path of the library document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<LibraryDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LibraryDocument::default()),
            Err(e) => Err(StoreError::Unavailable {
                reason: format!("cannot read {}: {e}", self.path.display()),
            }),
        }
    }

    fn encode(&self, document: &LibraryDocument) -> Result<Vec<u8>, StoreError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(document)?
        } else {
            serde_json::to_vec(document)?
        };
        Ok(bytes)
    }
}

#[async_trait]
impl LibraryStore for JsonFileLibraryStore {
    async fn load(&self) -> Result<StoredLibrary, StoreError> {
        let document = self.read_document().await?;
        tracing::debug!(
            path = %self.path.display(),
            revision = document.revision,
            count = document.entries.len(),
            "Read library document"
        );
        Ok(StoredLibrary::new(document.revision, document.entries))
    }

    async fn begin_edit_session(&self, base_revision: u64) -> Result<EditContext, StoreError> {
        let mut contexts = self.contexts.lock();
        if let Some(context_id) = contexts.open {
            return Err(StoreError::SessionAlreadyOpen { context_id });
        }
        let context = EditContext::new(base_revision);
        contexts.open = Some(context.id());
        Ok(context)
    }

    async fn commit(&self, context: &EditContext, overlay: &[Entry]) -> Result<u64, StoreError> {
        self.contexts.lock().ensure_open(context.id())?;

        let current = self.read_document().await?;
        if current.revision != context.base_revision() {
            return Err(StoreError::PersistenceFailed {
                reason: format!(
                    "library changed since edit began (revision {} != {})",
                    current.revision,
                    context.base_revision()
                ),
            });
        }

        let document = LibraryDocument {
            revision: current.revision + 1,
            entries: overlay.to_vec(),
        };
        let bytes = self.encode(&document)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::PersistenceFailed {
                    reason: format!("cannot create {}: {e}", parent.display()),
                })?;
        }

        tokio::fs::write(&self.temp_path, &bytes)
            .await
            .map_err(|e| StoreError::PersistenceFailed {
                reason: format!("cannot write {}: {e}", self.temp_path.display()),
            })?;

        // Last step and synchronous: once the rename happens the commit has resolved.
        std::fs::rename(&self.temp_path, &self.path).map_err(|e| {
            StoreError::PersistenceFailed {
                reason: format!("cannot replace {}: {e}", self.path.display()),
            }
        })?;

        self.contexts.lock().consume(context.id());
        tracing::info!(
            context_id = %context.id(),
            revision = document.revision,
            count = overlay.len(),
            "Committed library document"
        );
        Ok(document.revision)
    }

    async fn discard(&self, context: EditContext) -> Result<(), StoreError> {
        {
            let mut contexts = self.contexts.lock();
            contexts.ensure_open(context.id())?;
            contexts.consume(context.id());
        }

        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(
                path = %self.temp_path.display(),
                "Failed to remove leftover temp file: {e}"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ContentLocator, EntryId};

    fn entry(id: u64, position: usize) -> Entry {
        Entry::new(
            EntryId(id),
            format!("Movie {id}"),
            ContentLocator::new(format!("file:///movies/{id}.swf")),
        )
        .at_position(position)
    }

    fn temp_store() -> (tempfile::TempDir, JsonFileLibraryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLibraryStore::new(dir.path().join("library.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load().await.unwrap(), StoredLibrary::default());
    }

    #[tokio::test]
    async fn test_commit_then_load_round_trip() {
        let (_dir, store) = temp_store();
        let overlay = vec![entry(1, 0), entry(3, 1), entry(2, 2)];

        let context = store.begin_edit_session(0).await.unwrap();
        let revision = store.commit(&context, &overlay).await.unwrap();

        assert_eq!(revision, 1);
        assert_eq!(store.load().await.unwrap(), StoredLibrary::new(1, overlay));
        assert!(!store.temp_path.exists());
    }

    #[tokio::test]
    async fn test_second_commit_of_same_context_rejected() {
        let (_dir, store) = temp_store();
        let context = store.begin_edit_session(0).await.unwrap();
        store.commit(&context, &[entry(1, 0)]).await.unwrap();

        let result = store.commit(&context, &[entry(2, 0)]).await;
        assert!(matches!(result, Err(StoreError::ContextConsumed { .. })));
        assert_eq!(store.load().await.unwrap().entries, vec![entry(1, 0)]);
    }

    #[tokio::test]
    async fn test_only_one_open_session() {
        let (_dir, store) = temp_store();
        let first = store.begin_edit_session(0).await.unwrap();

        let second = store.begin_edit_session(0).await;
        assert!(matches!(second, Err(StoreError::SessionAlreadyOpen { .. })));

        let first_id = first.id();
        store.discard(first).await.unwrap();
        let next = store.begin_edit_session(0).await.unwrap();
        assert_ne!(next.id(), first_id);
    }

    #[tokio::test]
    async fn test_only_last_consumed_context_is_remembered() {
        let (_dir, store) = temp_store();
        let first = store.begin_edit_session(0).await.unwrap();
        let revision = store.commit(&first, &[entry(1, 0)]).await.unwrap();
        let second = store.begin_edit_session(revision).await.unwrap();
        store.commit(&second, &[entry(2, 0)]).await.unwrap();

        assert!(matches!(
            store.commit(&second, &[]).await,
            Err(StoreError::ContextConsumed { .. })
        ));
        assert!(matches!(
            store.commit(&first, &[]).await,
            Err(StoreError::UnknownContext { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_context_fails_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        let store = JsonFileLibraryStore::new(&path);
        let base = store.load().await.unwrap();
        let context = store.begin_edit_session(base.revision).await.unwrap();

        // Another writer bumps the revision behind our back.
        let other = JsonFileLibraryStore::new(&path);
        let other_context = other.begin_edit_session(0).await.unwrap();
        other.commit(&other_context, &[entry(9, 0)]).await.unwrap();

        let result = store.commit(&context, &[entry(1, 0)]).await;
        assert!(matches!(result, Err(StoreError::PersistenceFailed { .. })));
        assert_eq!(store.load().await.unwrap().entries, vec![entry(9, 0)]);
    }

    #[tokio::test]
    async fn test_context_opened_after_foreign_commit_is_still_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        let store = JsonFileLibraryStore::new(&path);
        let base = store.load().await.unwrap();

        let other = JsonFileLibraryStore::new(&path);
        let other_context = other.begin_edit_session(0).await.unwrap();
        other.commit(&other_context, &[entry(9, 0)]).await.unwrap();

        // Opened after the foreign write, but derived from the older read.
        let context = store.begin_edit_session(base.revision).await.unwrap();
        let result = store.commit(&context, &[entry(1, 0)]).await;

        assert!(matches!(result, Err(StoreError::PersistenceFailed { .. })));
        assert_eq!(store.load().await.unwrap().entries, vec![entry(9, 0)]);
    }

    #[tokio::test]
    async fn test_corrupt_document_reports_serialization_error() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), b"{ not json").unwrap();

        let result = store.load().await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
