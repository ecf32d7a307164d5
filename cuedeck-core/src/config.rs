//! Centralized configuration for Cuedeck.
//!
//! All tunable parameters live here instead of being scattered as literals.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Central configuration for all Cuedeck components.
///
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct CuedeckConfig {
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub simulation: SimulationConfig,
}

/// What the coordinator does with a structural request that arrives while
/// another transition is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Wait for the pending transition, then run.
    #[default]
    Queue,
    /// Fail immediately with `SessionError::Busy`.
    Reject,
}

impl FromStr for TransitionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(TransitionPolicy::Queue),
            "reject" => Ok(TransitionPolicy::Reject),
            other => Err(ConfigError::InvalidValue {
                key: "transition_policy",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionPolicy::Queue => write!(f, "queue"),
            TransitionPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Configuration value could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Session coordinator configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the actor command queue
    pub command_buffer: usize,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
    /// Handling of requests that arrive during a transition
    pub transition_policy: TransitionPolicy,
    /// Upper bound on a store commit
    pub commit_timeout: Duration,
    /// Upper bound on attaching content to the playback surface
    pub attach_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: 100,
            event_buffer: 100,
            transition_policy: TransitionPolicy::Queue,
            commit_timeout: Duration::from_secs(10),
            attach_timeout: Duration::from_secs(5),
        }
    }
}

/// Library store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// JSON document holding the committed library
    pub library_path: PathBuf,
    /// Suffix of the file written before the atomic rename
    pub temp_file_suffix: &'static str,
    /// Pretty-print the JSON document
    pub pretty: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("library.json"),
            temp_file_suffix: ".tmp",
            pretty: true,
        }
    }
}

/// Simulated collaborators for testing and development.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Deterministic seed for reproducible runs
    pub deterministic_seed: Option<u64>,
    /// Simulated store latency in milliseconds
    pub store_latency_ms: u64,
    /// Simulated surface attach latency in milliseconds
    pub surface_latency_ms: u64,
    /// Probability that a commit is rejected (0.0 to 1.0)
    pub commit_failure_rate: f64,
    /// Probability that an attach is refused (0.0 to 1.0)
    pub attach_failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            store_latency_ms: 20,
            surface_latency_ms: 10,
            commit_failure_rate: 0.0,
            attach_failure_rate: 0.0,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            deterministic_seed: Some(42),
            store_latency_ms: 0,
            surface_latency_ms: 0,
            commit_failure_rate: 0.0,
            attach_failure_rate: 0.0,
        }
    }

    /// Creates a configuration with realistic latency and occasional failures.
    pub fn realistic_simulation() -> Self {
        Self {
            deterministic_seed: None,
            store_latency_ms: 80,
            surface_latency_ms: 40,
            commit_failure_rate: 0.05,
            attach_failure_rate: 0.05,
        }
    }
}

impl CuedeckConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CUEDECK_LIBRARY_PATH") {
            config.store.library_path = PathBuf::from(path);
        }

        if let Some(ms) = parse_env::<u64>("CUEDECK_COMMIT_TIMEOUT_MS") {
            config.session.commit_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_env::<u64>("CUEDECK_ATTACH_TIMEOUT_MS") {
            config.session.attach_timeout = Duration::from_millis(ms);
        }

        if let Some(policy) = parse_env::<TransitionPolicy>("CUEDECK_TRANSITION_POLICY") {
            config.session.transition_policy = policy;
        }

        if let Some(seed) = parse_env::<u64>("CUEDECK_SIMULATION_SEED") {
            config.simulation.deterministic_seed = Some(seed);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            session: SessionConfig {
                commit_timeout: Duration::from_secs(1),
                attach_timeout: Duration::from_secs(1),
                ..Default::default()
            },
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }

    /// Creates a configuration for development with realistic simulation.
    pub fn for_development() -> Self {
        Self {
            simulation: SimulationConfig::realistic_simulation(),
            ..Default::default()
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = CuedeckConfig::default();

        assert_eq!(config.session.command_buffer, 100);
        assert_eq!(config.session.transition_policy, TransitionPolicy::Queue);
        assert_eq!(config.session.commit_timeout, Duration::from_secs(10));
        assert_eq!(config.session.attach_timeout, Duration::from_secs(5));
        assert_eq!(config.store.library_path, PathBuf::from("library.json"));
        assert_eq!(config.store.temp_file_suffix, ".tmp");
        assert_eq!(config.simulation.deterministic_seed, None);
    }

    #[test]
    fn test_simulation_config_presets() {
        let testing_config = SimulationConfig::deterministic_testing();
        assert_eq!(testing_config.deterministic_seed, Some(42));
        assert_eq!(testing_config.store_latency_ms, 0);
        assert_eq!(testing_config.commit_failure_rate, 0.0);

        let realistic_config = SimulationConfig::realistic_simulation();
        assert_eq!(realistic_config.deterministic_seed, None);
        assert!(realistic_config.store_latency_ms > 0);
        assert!(realistic_config.commit_failure_rate > 0.0);
    }

    #[test]
    fn test_transition_policy_parsing() {
        assert_eq!("queue".parse(), Ok(TransitionPolicy::Queue));
        assert_eq!(" Reject ".parse(), Ok(TransitionPolicy::Reject));
        assert!("drop".parse::<TransitionPolicy>().is_err());
        assert_eq!(TransitionPolicy::Reject.to_string(), "reject");
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("CUEDECK_LIBRARY_PATH", "/tmp/cuedeck-test.json");
            std::env::set_var("CUEDECK_COMMIT_TIMEOUT_MS", "2500");
            std::env::set_var("CUEDECK_ATTACH_TIMEOUT_MS", "not-a-number");
            std::env::set_var("CUEDECK_TRANSITION_POLICY", "reject");
            std::env::set_var("CUEDECK_SIMULATION_SEED", "12345");
        }

        let config = CuedeckConfig::from_env();

        assert_eq!(
            config.store.library_path,
            PathBuf::from("/tmp/cuedeck-test.json")
        );
        assert_eq!(config.session.commit_timeout, Duration::from_millis(2500));
        assert_eq!(config.session.attach_timeout, Duration::from_secs(5));
        assert_eq!(config.session.transition_policy, TransitionPolicy::Reject);
        assert_eq!(config.simulation.deterministic_seed, Some(12345));

        // Cleanup
        unsafe {
            std::env::remove_var("CUEDECK_LIBRARY_PATH");
            std::env::remove_var("CUEDECK_COMMIT_TIMEOUT_MS");
            std::env::remove_var("CUEDECK_ATTACH_TIMEOUT_MS");
            std::env::remove_var("CUEDECK_TRANSITION_POLICY");
            std::env::remove_var("CUEDECK_SIMULATION_SEED");
        }
    }
}
