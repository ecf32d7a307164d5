//! Simulated library store with seeded latency and commit failures.

use std::time::Duration;

use async_trait::async_trait;
use cuedeck_core::config::SimulationConfig;
use cuedeck_core::library::Entry;
use cuedeck_core::store::{EditContext, EditContextId, LibraryStore, StoreError, StoredLibrary};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug)]
struct SimulatedStoreState {
    entries: Vec<Entry>,
    revision: u64,
    open: Option<EditContextId>,
    last_consumed: Option<EditContextId>,
    rng: ChaCha8Rng,
    commits: usize,
    rejected_commits: usize,
}

/// In-memory library store driven by a deterministic RNG.
///
/// Every operation waits for the configured latency before touching state,
/// so dropping a pending commit never leaves a partial write behind.
#[derive(Debug)]
pub struct SimulatedLibraryStore {
    state: Mutex<SimulatedStoreState>,
    latency: Duration,
    commit_failure_rate: f64,
}

impl SimulatedLibraryStore {
    /// Creates a store holding `entries`, configured from `config`.
    pub fn new(config: &SimulationConfig, entries: Vec<Entry>) -> Self {
        let seed = config.deterministic_seed.unwrap_or_else(rand::random);

        Self {
            state: Mutex::new(SimulatedStoreState {
                entries,
                revision: 0,
                open: None,
                last_consumed: None,
                rng: ChaCha8Rng::seed_from_u64(seed),
                commits: 0,
                rejected_commits: 0,
            }),
            latency: Duration::from_millis(config.store_latency_ms),
            commit_failure_rate: config.commit_failure_rate.clamp(0.0, 1.0),
        }
    }

    /// Entries as last committed.
    pub fn committed_entries(&self) -> Vec<Entry> {
        self.state.lock().entries.clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Number of commits that reached the store, accepted or not.
    pub fn commit_attempts(&self) -> usize {
        let state = self.state.lock();
        state.commits + state.rejected_commits
    }

    /// Number of commits the simulation rejected.
    pub fn rejected_commits(&self) -> usize {
        self.state.lock().rejected_commits
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn ensure_open(state: &SimulatedStoreState, context_id: EditContextId) -> Result<(), StoreError> {
    if state.open == Some(context_id) {
        Ok(())
    } else if state.last_consumed == Some(context_id) {
        Err(StoreError::ContextConsumed { context_id })
    } else {
        Err(StoreError::UnknownContext { context_id })
    }
}

#[async_trait]
impl LibraryStore for SimulatedLibraryStore {
    async fn load(&self) -> Result<StoredLibrary, StoreError> {
        self.simulate_latency().await;
        let state = self.state.lock();
        Ok(StoredLibrary::new(state.revision, state.entries.clone()))
    }

    async fn begin_edit_session(&self, base_revision: u64) -> Result<EditContext, StoreError> {
        let mut state = self.state.lock();
        if let Some(context_id) = state.open {
            return Err(StoreError::SessionAlreadyOpen { context_id });
        }

        let context = EditContext::new(base_revision);
        state.open = Some(context.id());
        Ok(context)
    }

    async fn commit(&self, context: &EditContext, overlay: &[Entry]) -> Result<u64, StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        ensure_open(&state, context.id())?;
        if state.revision != context.base_revision() {
            return Err(StoreError::PersistenceFailed {
                reason: format!(
                    "store at revision {}, edit based on {}",
                    state.revision,
                    context.base_revision()
                ),
            });
        }

        let roll: f64 = state.rng.random();
        if roll < self.commit_failure_rate {
            state.rejected_commits += 1;
            tracing::debug!(context_id = %context.id(), "Simulated commit rejection");
            return Err(StoreError::PersistenceFailed {
                reason: "simulated write failure".to_string(),
            });
        }

        state.entries = overlay.to_vec();
        state.revision += 1;
        state.open = None;
        state.last_consumed = Some(context.id());
        state.commits += 1;
        Ok(state.revision)
    }

    async fn discard(&self, context: EditContext) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        ensure_open(&state, context.id())?;
        state.open = None;
        state.last_consumed = Some(context.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cuedeck_core::library::{ContentLocator, EntryId};

    use super::*;

    fn config(commit_failure_rate: f64) -> SimulationConfig {
        SimulationConfig {
            commit_failure_rate,
            ..SimulationConfig::deterministic_testing()
        }
    }

    fn entry(id: u64) -> Entry {
        Entry::new(
            EntryId(id),
            format!("Movie {id}"),
            ContentLocator::new(format!("https://example.com/{id}.swf")),
        )
    }

    #[tokio::test]
    async fn test_commit_replaces_entries() {
        let store = SimulatedLibraryStore::new(&config(0.0), vec![entry(1)]);

        let context = store.begin_edit_session(0).await.unwrap();
        let revision = store
            .commit(&context, &[entry(1), entry(2)])
            .await
            .unwrap();

        assert_eq!(revision, 1);
        assert_eq!(store.committed_entries().len(), 2);
        assert_eq!(store.revision(), 1);
        assert!(matches!(
            store.commit(&context, &[]).await,
            Err(StoreError::ContextConsumed { .. })
        ));
    }

    #[tokio::test]
    async fn test_certain_failure_keeps_context_open() {
        let store = SimulatedLibraryStore::new(&config(1.0), vec![entry(1)]);

        let context = store.begin_edit_session(0).await.unwrap();
        let result = store.commit(&context, &[]).await;

        assert!(matches!(result, Err(StoreError::PersistenceFailed { .. })));
        assert_eq!(store.rejected_commits(), 1);
        assert_eq!(store.committed_entries().len(), 1);
        store.discard(context).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_seed_same_failures() {
        let outcomes = |seed: u64| async move {
            let config = SimulationConfig {
                deterministic_seed: Some(seed),
                ..config(0.5)
            };
            let store = SimulatedLibraryStore::new(&config, Vec::new());
            let mut outcomes = Vec::new();
            for _ in 0..16 {
                let context = store.begin_edit_session(store.revision()).await.unwrap();
                let ok = store.commit(&context, &[]).await.is_ok();
                if !ok {
                    store.discard(context).await.unwrap();
                }
                outcomes.push(ok);
            }
            outcomes
        };

        assert_eq!(outcomes(7).await, outcomes(7).await);
    }

    #[tokio::test]
    async fn test_outdated_context_is_rejected() {
        let store = SimulatedLibraryStore::new(&config(0.0), vec![entry(1)]);

        let first = store.begin_edit_session(0).await.unwrap();
        store.commit(&first, &[entry(2)]).await.unwrap();

        let stale = store.begin_edit_session(0).await.unwrap();
        let result = store.commit(&stale, &[]).await;

        assert!(matches!(result, Err(StoreError::PersistenceFailed { .. })));
        assert_eq!(store.committed_entries(), vec![entry(2)]);
        assert_eq!(store.commit_attempts(), 1);
    }
}
