//! Cuedeck Simulation - deterministic collaborators for session testing.
//!
//! Provides a library store and a playback surface whose latency and
//! failures are driven by a seeded RNG, plus scripted session scenarios
//! that run the coordinator against them. The same seed always produces
//! the same sequence of injected failures.
//!
//! # Example
//!
//! ```rust,no_run
//! use cuedeck_core::config::CuedeckConfig;
//! use cuedeck_sim::run_session_scenario;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = CuedeckConfig::for_development();
//! config.simulation.deterministic_seed = Some(12345);
//!
//! let report = run_session_scenario(&config).await?;
//! println!("{} steps, {} failed", report.steps.len(), report.failed_steps());
//! # Ok(())
//! # }
//! ```

pub mod scenarios;
pub mod store;
pub mod surface;

pub use scenarios::{
    ScenarioError, ScenarioReport, ScenarioStep, run_session_scenario, sample_library,
};
pub use store::SimulatedLibraryStore;
pub use surface::SimulatedPlaybackSurface;
