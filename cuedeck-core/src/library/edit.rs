//! Edit operations and their application to entry sequences.

use super::{ContentLocator, Entry, EntryId, LibraryError};

/// A single structural change to the library order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Insert a new entry so that it ends up at `position`
    Insert { entry: Entry, position: usize },
    /// Remove the entry with `id`
    Remove { id: EntryId },
    /// Move the entry with `id` to position `to`
    Move { id: EntryId, to: usize },
    /// Change the properties of the entry with `id`. `None` keeps a field.
    Update {
        id: EntryId,
        title: Option<String>,
        locator: Option<ContentLocator>,
    },
}

impl EditOp {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EditOp::Insert { .. } => "insert",
            EditOp::Remove { .. } => "remove",
            EditOp::Move { .. } => "move",
            EditOp::Update { .. } => "update",
        }
    }
}

/// Applies `edits` in order to a copy of `base` and renumbers positions.
///
/// `base` is assumed to be in display order. The batch is all-or-nothing.
///
/// # Errors
///
/// - `LibraryError::DuplicateEntry` - Insert of an id already present
/// - `LibraryError::EntryNotFound` - Remove, move or update of an unknown id
/// - `LibraryError::PositionOutOfRange` - Insert past the end, or move to a
///   position that does not exist
pub fn apply_edits(base: &[Entry], edits: &[EditOp]) -> Result<Vec<Entry>, LibraryError> {
    let mut working = base.to_vec();

    for op in edits {
        match op {
            EditOp::Insert { entry, position } => {
                if working.iter().any(|existing| existing.id == entry.id) {
                    return Err(LibraryError::DuplicateEntry { id: entry.id });
                }
                if *position > working.len() {
                    return Err(LibraryError::PositionOutOfRange {
                        position: *position,
                        len: working.len(),
                    });
                }
                working.insert(*position, entry.clone());
            }
            EditOp::Remove { id } => {
                let index = index_of(&working, *id)?;
                working.remove(index);
            }
            EditOp::Move { id, to } => {
                let index = index_of(&working, *id)?;
                if *to >= working.len() {
                    return Err(LibraryError::PositionOutOfRange {
                        position: *to,
                        len: working.len(),
                    });
                }
                let moved = working.remove(index);
                working.insert(*to, moved);
            }
            EditOp::Update { id, title, locator } => {
                let index = index_of(&working, *id)?;
                let target = &mut working[index];
                if let Some(title) = title {
                    target.title.clone_from(title);
                }
                if let Some(locator) = locator {
                    target.locator = locator.clone();
                }
            }
        }
    }

    renumber(&mut working);
    Ok(working)
}

/// Rewrites positions to match slice order.
pub fn renumber(entries: &mut [Entry]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.position = index;
    }
}

fn index_of(entries: &[Entry], id: EntryId) -> Result<usize, LibraryError> {
    entries
        .iter()
        .position(|entry| entry.id == id)
        .ok_or(LibraryError::EntryNotFound { id })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::library::{ContentLocator, positions_contiguous};

    fn entry(id: u64) -> Entry {
        Entry::new(
            EntryId(id),
            format!("Entry {id}"),
            ContentLocator::new(format!("file:///media/{id}.swf")),
        )
    }

    fn library(ids: &[u64]) -> Vec<Entry> {
        let mut entries: Vec<Entry> = ids.iter().map(|id| entry(*id)).collect();
        renumber(&mut entries);
        entries
    }

    fn ids(entries: &[Entry]) -> Vec<u64> {
        entries.iter().map(|e| e.id.0).collect()
    }

    #[test]
    fn test_insert_in_the_middle() {
        let result = apply_edits(
            &library(&[1, 2]),
            &[EditOp::Insert {
                entry: entry(3),
                position: 1,
            }],
        )
        .unwrap();

        assert_eq!(ids(&result), vec![1, 3, 2]);
        assert_eq!(result[1].position, 1);
        assert_eq!(result[2].position, 2);
    }

    #[test]
    fn test_insert_at_end_appends() {
        let result = apply_edits(
            &library(&[1]),
            &[EditOp::Insert {
                entry: entry(2),
                position: 1,
            }],
        )
        .unwrap();

        assert_eq!(ids(&result), vec![1, 2]);
    }

    #[test]
    fn test_move_and_remove_sequence() {
        let result = apply_edits(
            &library(&[1, 2, 3, 4]),
            &[
                EditOp::Move {
                    id: EntryId(4),
                    to: 0,
                },
                EditOp::Remove { id: EntryId(2) },
            ],
        )
        .unwrap();

        assert_eq!(ids(&result), vec![4, 1, 3]);
        assert!(positions_contiguous(&result));
    }

    #[test]
    fn test_invalid_batch_is_rejected_whole() {
        let base = library(&[1, 2]);
        let result = apply_edits(
            &base,
            &[
                EditOp::Remove { id: EntryId(1) },
                EditOp::Remove { id: EntryId(9) },
            ],
        );

        assert_eq!(result, Err(LibraryError::EntryNotFound { id: EntryId(9) }));
        assert_eq!(ids(&base), vec![1, 2]);
    }

    #[test]
    fn test_update_changes_properties_in_place() {
        let result = apply_edits(
            &library(&[1, 2, 3]),
            &[EditOp::Update {
                id: EntryId(2),
                title: Some("Intro reel".to_string()),
                locator: None,
            }],
        )
        .unwrap();

        assert_eq!(ids(&result), vec![1, 2, 3]);
        assert_eq!(result[1].title, "Intro reel");
        assert_eq!(result[1].locator, entry(2).locator);
        assert_eq!(result[1].position, 1);
    }

    #[test]
    fn test_update_follows_earlier_ops_in_batch() {
        let result = apply_edits(
            &library(&[1, 2]),
            &[
                EditOp::Insert {
                    entry: entry(3),
                    position: 0,
                },
                EditOp::Update {
                    id: EntryId(3),
                    title: None,
                    locator: Some(ContentLocator::new("file:///media/replaced.swf")),
                },
            ],
        )
        .unwrap();

        assert_eq!(ids(&result), vec![3, 1, 2]);
        assert_eq!(result[0].locator.as_str(), "file:///media/replaced.swf");
    }

    #[test]
    fn test_update_of_unknown_entry_rejects_batch() {
        let base = library(&[1, 2]);
        let result = apply_edits(
            &base,
            &[
                EditOp::Update {
                    id: EntryId(1),
                    title: Some("Renamed".to_string()),
                    locator: None,
                },
                EditOp::Update {
                    id: EntryId(7),
                    title: Some("Missing".to_string()),
                    locator: None,
                },
            ],
        );

        assert_eq!(result, Err(LibraryError::EntryNotFound { id: EntryId(7) }));
        assert_eq!(base[0].title, "Entry 1");
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let result = apply_edits(
            &library(&[1, 2]),
            &[EditOp::Insert {
                entry: entry(2),
                position: 0,
            }],
        );

        assert_eq!(result, Err(LibraryError::DuplicateEntry { id: EntryId(2) }));
    }

    #[test]
    fn test_out_of_range_positions() {
        let base = library(&[1, 2]);

        let insert = apply_edits(
            &base,
            &[EditOp::Insert {
                entry: entry(3),
                position: 3,
            }],
        );
        assert_eq!(
            insert,
            Err(LibraryError::PositionOutOfRange {
                position: 3,
                len: 2
            })
        );

        let moved = apply_edits(
            &base,
            &[EditOp::Move {
                id: EntryId(1),
                to: 2,
            }],
        );
        assert!(matches!(
            moved,
            Err(LibraryError::PositionOutOfRange { position: 2, .. })
        ));
    }

    fn arb_op() -> impl Strategy<Value = EditOp> {
        prop_oneof![
            (0u64..40, 0usize..20).prop_map(|(id, position)| EditOp::Insert {
                entry: entry(id),
                position,
            }),
            (0u64..40).prop_map(|id| EditOp::Remove { id: EntryId(id) }),
            (0u64..40, 0usize..20).prop_map(|(id, to)| EditOp::Move { id: EntryId(id), to }),
            (0u64..40, proptest::option::of("[a-z]{1,8}")).prop_map(|(id, title)| {
                EditOp::Update {
                    id: EntryId(id),
                    title,
                    locator: None,
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn positions_stay_contiguous(batches in proptest::collection::vec(
            proptest::collection::vec(arb_op(), 1..6),
            1..20,
        )) {
            let mut overlay = library(&[0, 1, 2, 3, 4]);

            for batch in batches {
                if let Ok(next) = apply_edits(&overlay, &batch) {
                    overlay = next;
                }
                prop_assert!(positions_contiguous(&overlay));

                let mut seen = std::collections::HashSet::new();
                prop_assert!(overlay.iter().all(|e| seen.insert(e.id)));
            }
        }
    }
}
