//! Tracing setup for the cuedeck binaries.
//!
//! Console output goes to stderr at the level the user picks for cuedeck's
//! own crates, with dependencies held at warn. `CUEDECK_LOG` replaces that
//! filter with any `EnvFilter` directive. A full trace of the run can also be
//! written to a file.

use std::fmt;
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::CuedeckError;

/// Environment variable that overrides the console filter.
pub const LOG_ENV: &str = "CUEDECK_LOG";

/// File the full trace of the most recent run is written to.
pub const TRACE_FILE_NAME: &str = "cuedeck-last-run.log";

const CUEDECK_TARGETS: [&str; 3] = ["cuedeck_core", "cuedeck_sim", "cuedeck_cli"];

/// Installs the global subscriber.
///
/// With `trace_dir` set, everything cuedeck emits is also written to
/// `trace_dir/cuedeck-last-run.log`, replacing the previous run. Returns the
/// trace file path in that case.
///
/// # Errors
///
/// - `CuedeckError::Configuration` - `CUEDECK_LOG` is not a valid directive
/// - `CuedeckError::Io` - Trace directory or file cannot be created
pub fn init_tracing(
    console_level: Level,
    trace_dir: Option<&Path>,
) -> crate::Result<Option<PathBuf>> {
    let override_directive = std::env::var(LOG_ENV).ok();
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter(console_level, override_directive.as_deref())?);

    let mut trace_path = None;
    let file_layer = match trace_dir {
        Some(dir) => {
            create_dir_all(dir)?;
            let path = dir.join(TRACE_FILE_NAME);
            let file = File::create(&path)?;
            trace_path = Some(path);

            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(file)
                .with_filter(EnvFilter::new(cuedeck_directive(Level::TRACE)));
            Some(layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(
        console = %console_level,
        trace_file = ?trace_path,
        "Tracing initialized"
    );
    Ok(trace_path)
}

fn console_filter(
    console_level: Level,
    override_directive: Option<&str>,
) -> crate::Result<EnvFilter> {
    match override_directive {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| CuedeckError::Configuration {
                reason: format!("invalid {LOG_ENV} directive '{directive}': {e}"),
            })
        }
        None => Ok(EnvFilter::new(cuedeck_directive(console_level))),
    }
}

/// `level` for cuedeck crates, warn for everything else.
fn cuedeck_directive(level: Level) -> String {
    let mut directive = String::from("warn");
    for target in CUEDECK_TARGETS {
        directive.push_str(&format!(",{target}={level}"));
    }
    directive
}

/// Console log levels selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Every event, including per-request traces
    Trace,
}

impl CliLogLevel {
    /// Converts the CLI log level to a tracing level.
    ///
    /// # Examples
    /// ```
    /// use cuedeck_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(CliLogLevel::Error.as_tracing_level(), Level::ERROR);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
        assert_eq!(CliLogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_directive_scopes_level_to_cuedeck_crates() {
        let directive = cuedeck_directive(Level::DEBUG);

        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("cuedeck_core=DEBUG"));
        assert!(directive.contains("cuedeck_cli=DEBUG"));
        assert!(console_filter(Level::DEBUG, None).is_ok());
    }

    #[test]
    fn test_invalid_override_is_configuration_error() {
        let result = console_filter(Level::INFO, Some("cuedeck_core=loud"));

        assert!(matches!(result, Err(CuedeckError::Configuration { .. })));
        assert!(console_filter(Level::INFO, Some("cuedeck_core=trace")).is_ok());
    }
}
