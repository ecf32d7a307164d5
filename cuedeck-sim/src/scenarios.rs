//! Pre-built session scenarios over the simulated collaborators.
//!
//! A scenario drives the coordinator through a scripted browse, play, edit,
//! save and play sequence and checks the session invariants after every
//! step.

use std::sync::Arc;

use cuedeck_core::config::CuedeckConfig;
use cuedeck_core::library::{ContentLocator, EditOp, Entry, EntryId, positions_contiguous};
use cuedeck_core::session::{
    SessionError, SessionHandle, SessionMode, SessionRequest, SessionSnapshot,
    spawn_session_coordinator,
};

use crate::{SimulatedLibraryStore, SimulatedPlaybackSurface};

/// Attempts made to save before the scenario gives up and cancels.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Library used by the built-in scenarios.
pub fn sample_library() -> Vec<Entry> {
    let titles = [
        ("Pico Adventure", "https://cdn.example.com/movies/pico-adventure.swf"),
        ("Line Rider", "https://cdn.example.com/movies/line-rider.swf"),
        ("Intro Reel", "/srv/cuedeck/movies/intro-reel.swf"),
        ("Bubble Tanks", "https://cdn.example.com/games/bubble-tanks.swf"),
        ("Desktop Tower", "https://cdn.example.com/games/desktop-tower.swf"),
    ];

    titles
        .iter()
        .enumerate()
        .map(|(index, (title, locator))| {
            Entry::new(
                EntryId(index as u64 + 1),
                *title,
                ContentLocator::new(*locator),
            )
            .at_position(index)
        })
        .collect()
}

/// Outcome of one scripted request.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioStep {
    pub request: SessionRequest,
    pub outcome: Result<(), String>,
    pub mode_after: SessionMode,
}

/// Everything a scenario run observed.
#[derive(Debug)]
pub struct ScenarioReport {
    pub seed: Option<u64>,
    pub steps: Vec<ScenarioStep>,
    pub final_snapshot: SessionSnapshot,
    pub committed_entries: Vec<Entry>,
    pub rejected_commits: usize,
    pub violations: Vec<String>,
}

impl ScenarioReport {
    /// Number of requests that returned an error.
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|step| step.outcome.is_err()).count()
    }

    /// True if no invariant was violated during the run.
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Scenario could not be set up.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Scenario setup failed: {0}")]
    Setup(#[from] SessionError),
}

/// Runs the scripted session against simulated collaborators.
///
/// Request failures injected by the simulation are recorded, not returned.
///
/// # Errors
///
/// - `ScenarioError::Setup` - The initial library load failed
pub async fn run_session_scenario(config: &CuedeckConfig) -> Result<ScenarioReport, ScenarioError> {
    let store = Arc::new(SimulatedLibraryStore::new(
        &config.simulation,
        sample_library(),
    ));
    let surface = Arc::new(SimulatedPlaybackSurface::new(&config.simulation));
    let handle = spawn_session_coordinator(&config.session, Arc::clone(&store), surface);

    let mut run = ScenarioRun::new(handle.clone());
    let entries = handle.load_library().await?;
    run.check_invariants();

    // Play the first entry, then try to edit while playing.
    if let Some(first) = entries.first() {
        let started = handle.select_entry(first.id).await.map(|_| ());
        let playing = started.is_ok();
        run.record(SessionRequest::SelectEntry, started);
        if playing {
            let edit = handle.enter_edit().await.map(|_| ());
            run.record(SessionRequest::EnterEdit, edit);
            let stopped = handle.stop_playback().await;
            run.record(SessionRequest::StopPlayback, stopped);
        }
    }

    let next_id = entries.iter().map(|entry| entry.id.as_u64()).max().unwrap_or(0) + 1;
    let added = EntryId(next_id);
    let edit = handle.enter_edit().await.map(|_| ());
    let editing = edit.is_ok();
    run.record(SessionRequest::EnterEdit, edit);

    if editing {
        let mut batch = vec![EditOp::Insert {
            entry: Entry::new(
                added,
                "Simulated Upload",
                ContentLocator::new("https://cdn.example.com/uploads/simulated.swf"),
            ),
            position: 0,
        }];
        if let Some(last) = entries.last() {
            batch.push(EditOp::Move { id: last.id, to: 1 });
        }
        if let Some(third) = entries.get(2) {
            batch.push(EditOp::Remove { id: third.id });
        }

        let applied = handle.apply_edits(batch).await.map(|_| ());
        run.record(SessionRequest::ApplyEdits, applied);
        run.save_or_cancel().await;
    }

    if handle.snapshot().entries.iter().any(|entry| entry.id == added) {
        let started = handle.select_entry(added).await.map(|_| ());
        let playing = started.is_ok();
        run.record(SessionRequest::SelectEntry, started);
        if playing {
            let stopped = handle.stop_playback().await;
            run.record(SessionRequest::StopPlayback, stopped);
        }
    }

    let final_snapshot = handle.snapshot();
    if let Err(e) = handle.shutdown().await {
        tracing::warn!("Scenario coordinator already stopped: {e}");
    }

    Ok(ScenarioReport {
        seed: config.simulation.deterministic_seed,
        steps: run.steps,
        final_snapshot,
        committed_entries: store.committed_entries(),
        rejected_commits: store.rejected_commits(),
        violations: run.violations,
    })
}

struct ScenarioRun {
    handle: SessionHandle,
    steps: Vec<ScenarioStep>,
    violations: Vec<String>,
}

impl ScenarioRun {
    fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            steps: Vec::new(),
            violations: Vec::new(),
        }
    }

    async fn save_or_cancel(&mut self) {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let saved = self.handle.save_edit().await.map(|_| ());
            let retry = matches!(saved, Err(ref e) if e.is_retryable());
            self.record(SessionRequest::SaveEdit, saved);

            if !retry {
                return;
            }
            tracing::debug!(attempt, "Save failed, retrying");
        }

        let cancelled = self.handle.cancel_edit().await;
        self.record(SessionRequest::CancelEdit, cancelled);
    }

    fn record(&mut self, request: SessionRequest, outcome: Result<(), SessionError>) {
        let mode_after = self.handle.snapshot().mode;
        tracing::debug!(%request, %mode_after, ok = outcome.is_ok(), "Scenario step");

        self.steps.push(ScenarioStep {
            request,
            outcome: outcome.map_err(|e| e.to_string()),
            mode_after,
        });
        self.check_invariants();
    }

    fn check_invariants(&mut self) {
        let snapshot = self.handle.snapshot();
        let step = self.steps.len();

        if (snapshot.mode == SessionMode::Editing) != snapshot.edit_context.is_some() {
            self.violations
                .push(format!("step {step}: edit context does not match {}", snapshot.mode));
        }
        if (snapshot.mode == SessionMode::Playing) != snapshot.playback.is_some() {
            self.violations
                .push(format!("step {step}: playback does not match {}", snapshot.mode));
        }
        if !positions_contiguous(&snapshot.entries) {
            self.violations
                .push(format!("step {step}: entry positions are not contiguous"));
        }
    }
}

#[cfg(test)]
mod tests {
    use cuedeck_core::config::SimulationConfig;

    use super::*;

    #[test]
    fn test_sample_library_is_normalized() {
        let library = sample_library();
        assert_eq!(library.len(), 5);
        assert!(positions_contiguous(&library));
    }

    #[tokio::test]
    async fn test_clean_run_saves_and_plays() {
        let report = run_session_scenario(&CuedeckConfig::for_testing())
            .await
            .unwrap();

        assert!(report.is_consistent(), "{:?}", report.violations);
        assert_eq!(report.final_snapshot.mode, SessionMode::Browsing);
        assert_eq!(report.committed_entries.len(), 5);
        assert_eq!(report.committed_entries[0].title, "Simulated Upload");
        // Only the edit attempted while playing fails.
        assert_eq!(report.failed_steps(), 1);
    }

    #[tokio::test]
    async fn test_failing_store_cancels_after_retries() {
        let config = CuedeckConfig {
            simulation: SimulationConfig {
                commit_failure_rate: 1.0,
                ..SimulationConfig::deterministic_testing()
            },
            ..CuedeckConfig::for_testing()
        };

        let report = run_session_scenario(&config).await.unwrap();

        assert!(report.is_consistent(), "{:?}", report.violations);
        assert_eq!(report.rejected_commits, MAX_SAVE_ATTEMPTS);
        assert_eq!(report.committed_entries, sample_library());
        assert_eq!(
            report.steps.last().map(|step| step.request),
            Some(SessionRequest::CancelEdit)
        );
    }

    #[tokio::test]
    async fn test_failing_surface_leaves_library_browsable() {
        let config = CuedeckConfig {
            simulation: SimulationConfig {
                attach_failure_rate: 1.0,
                ..SimulationConfig::deterministic_testing()
            },
            ..CuedeckConfig::for_testing()
        };

        let report = run_session_scenario(&config).await.unwrap();

        assert!(report.is_consistent(), "{:?}", report.violations);
        assert!(
            report
                .steps
                .iter()
                .filter(|step| step.request == SessionRequest::SelectEntry)
                .all(|step| step.outcome.is_err() && step.mode_after == SessionMode::Browsing)
        );
        assert_eq!(report.committed_entries.len(), 5);
    }
}
