//! Library model: ordered playable entries mirroring the durable store.
//!
//! The committed snapshot is shared read-only as `Arc<[Entry]>`. Edits are
//! applied to working copies (see [`edit`]) and only replace the snapshot
//! once the store has committed them.

pub mod edit;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub use edit::{EditOp, apply_edits, renumber};
use serde::{Deserialize, Serialize};

use crate::store::StoredLibrary;

/// Stable identifier of a library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Returns the raw id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to playable content.
///
/// Only the playback controller interprets it, when resolving content for
/// the playback surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentLocator(String);

impl ContentLocator {
    /// Wraps a raw locator string.
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Returns the raw locator string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One playable library item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique id within the library
    pub id: EntryId,
    /// Display title
    pub title: String,
    /// Content reference handed to the playback surface
    pub locator: ContentLocator,
    /// Zero-based display order
    pub position: usize,
}

impl Entry {
    /// Creates an entry. Position is assigned when it joins a library.
    pub fn new(id: EntryId, title: impl Into<String>, locator: ContentLocator) -> Self {
        Self {
            id,
            title: title.into(),
            locator,
            position: 0,
        }
    }

    /// Returns the entry with the given position.
    pub fn at_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }
}

/// Errors raised when an edit batch cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    /// Insert would create a second entry with an existing id
    #[error("Entry {id} already exists")]
    DuplicateEntry {
        /// Conflicting entry id
        id: EntryId,
    },

    /// Remove or move referenced an entry that is not in the library
    #[error("Entry {id} not found")]
    EntryNotFound {
        /// Missing entry id
        id: EntryId,
    },

    /// Target position lies outside the library
    #[error("Position {position} out of range for {len} entries")]
    PositionOutOfRange {
        /// Requested position
        position: usize,
        /// Number of entries at the time of the operation
        len: usize,
    },
}

/// In-memory ordered collection of committed entries.
///
/// `revision` counts local snapshot replacements. `store_revision` is the
/// durable revision the snapshot mirrors, `None` until the first load.
#[derive(Debug, Clone)]
pub struct LibraryModel {
    entries: Arc<[Entry]>,
    revision: u64,
    store_revision: Option<u64>,
}

impl Default for LibraryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryModel {
    /// Creates an empty library model.
    pub fn new() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
            revision: 0,
            store_revision: None,
        }
    }

    /// Creates a model from a store read, repairing order as `load` does.
    pub fn from_stored(library: StoredLibrary) -> Self {
        let mut model = Self::new();
        model.load(library);
        model
    }

    /// Installs entries read from the store.
    ///
    /// Entries are ordered by their stored position (ties keep store order),
    /// duplicate ids keep their first occurrence, and positions are
    /// renumbered to `0..n`.
    pub fn load(&mut self, library: StoredLibrary) {
        let entries = normalize_loaded(library.entries);
        tracing::debug!(
            count = entries.len(),
            store_revision = library.revision,
            "Library loaded from store"
        );
        self.replace(entries, library.revision);
    }

    /// Applies an edit batch to `base` without touching committed state.
    ///
    /// # Errors
    ///
    /// - `LibraryError` - If any operation in the batch is invalid; the batch
    ///   is rejected as a whole.
    pub fn apply(&self, base: &[Entry], edits: &[EditOp]) -> Result<Vec<Entry>, LibraryError> {
        apply_edits(base, edits)
    }

    /// Replaces the committed snapshot with entries the store holds at
    /// `store_revision`, and bumps the local revision.
    pub fn replace(&mut self, entries: Vec<Entry>, store_revision: u64) {
        self.entries = Arc::from(entries);
        self.revision += 1;
        self.store_revision = Some(store_revision);
    }

    /// Returns the committed snapshot.
    pub fn entries(&self) -> Arc<[Entry]> {
        Arc::clone(&self.entries)
    }

    /// Finds a committed entry by id.
    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the library has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Increments every time the snapshot is replaced.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Store revision the snapshot was read or committed at.
    pub fn store_revision(&self) -> Option<u64> {
        self.store_revision
    }

    /// Returns true once the snapshot has come from the store.
    pub fn is_loaded(&self) -> bool {
        self.store_revision.is_some()
    }
}

fn normalize_loaded(mut entries: Vec<Entry>) -> Vec<Entry> {
    entries.sort_by_key(|entry| entry.position);

    let mut seen = HashSet::with_capacity(entries.len());
    entries.retain(|entry| {
        let fresh = seen.insert(entry.id);
        if !fresh {
            tracing::warn!(entry_id = %entry.id, "Dropping duplicate library entry");
        }
        fresh
    });

    renumber(&mut entries);
    entries
}

/// Returns true if positions run `0..n` in slice order.
pub fn positions_contiguous(entries: &[Entry]) -> bool {
    entries
        .iter()
        .enumerate()
        .all(|(index, entry)| entry.position == index)
}
