//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Subcommand;
use cuedeck_core::CuedeckError;
use cuedeck_core::config::CuedeckConfig;
use cuedeck_core::library::{ContentLocator, EditOp, Entry, EntryId};
use cuedeck_core::session::{SessionHandle, spawn_session_coordinator};
use cuedeck_core::store::JsonFileLibraryStore;
use cuedeck_sim::{SimulatedPlaybackSurface, run_session_scenario};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List library entries in display order
    List,
    /// Add an entry
    Add {
        /// Display title
        #[arg(long)]
        title: String,
        /// URL or absolute file path of the content
        #[arg(long)]
        locator: String,
        /// Position to insert at (defaults to the end)
        #[arg(long)]
        position: Option<usize>,
    },
    /// Remove an entry
    Remove {
        /// Entry id
        id: u64,
    },
    /// Move an entry to a new position
    Move {
        /// Entry id
        id: u64,
        /// Zero-based target position
        position: usize,
    },
    /// Change the title or content of an entry
    Update {
        /// Entry id
        id: u64,
        /// New display title
        #[arg(long)]
        title: Option<String>,
        /// New URL or absolute file path of the content
        #[arg(long)]
        locator: Option<String>,
    },
    /// Check that an entry starts playing, then stop it
    Play {
        /// Entry id
        id: u64,
    },
    /// Run a scripted session against simulated collaborators
    Simulate {
        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Probability that a commit is rejected (0.0 to 1.0)
        #[arg(long, default_value = "0.0")]
        commit_failure_rate: f64,
        /// Probability that playback fails to attach (0.0 to 1.0)
        #[arg(long, default_value = "0.0")]
        attach_failure_rate: f64,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the first request that fails
pub async fn handle_command(command: Commands, library: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = CuedeckConfig::from_env();
    if let Some(path) = library {
        config.store.library_path = path;
    }

    match command {
        Commands::List => list_entries(&config).await,
        Commands::Add {
            title,
            locator,
            position,
        } => add_entry(&config, title, locator, position).await,
        Commands::Remove { id } => {
            edit_library(&config, vec![EditOp::Remove { id: EntryId(id) }]).await
        }
        Commands::Move { id, position } => {
            let op = EditOp::Move {
                id: EntryId(id),
                to: position,
            };
            edit_library(&config, vec![op]).await
        }
        Commands::Update { id, title, locator } => {
            update_entry(&config, EntryId(id), title, locator).await
        }
        Commands::Play { id } => play_entry(&config, EntryId(id)).await,
        Commands::Simulate {
            seed,
            commit_failure_rate,
            attach_failure_rate,
        } => run_simulation(config, seed, commit_failure_rate, attach_failure_rate).await,
    }
}

/// List all library entries
///
/// # Errors
/// - `SessionError::StoreUnavailable` - Library file could not be read
pub async fn list_entries(config: &CuedeckConfig) -> anyhow::Result<()> {
    let session = open_session(config).await?;
    let entries = session.snapshot().entries;

    println!("Library: {}", config.store.library_path.display());
    println!("{:-<60}", "");
    if entries.is_empty() {
        println!("No entries yet.");
        println!("Use 'cuedeck add --title <title> --locator <url>' to add one.");
    } else {
        print_entries(&entries);
    }

    session.shutdown().await?;
    Ok(())
}

/// Add an entry with the next free id
///
/// # Errors
/// - `SessionError::InvalidEdit` - Position out of range
/// - `SessionError::PersistenceFailed` - Library file could not be written
pub async fn add_entry(
    config: &CuedeckConfig,
    title: String,
    locator: String,
    position: Option<usize>,
) -> anyhow::Result<()> {
    if title.trim().is_empty() {
        bail!("Title must not be empty");
    }

    let session = open_session(config).await?;
    let entries = session.snapshot().entries;
    let max_id = entries.iter().map(|e| e.id.as_u64()).max().unwrap_or(0);
    let Some(next) = max_id.checked_add(1) else {
        session.shutdown().await?;
        bail!("No free entry id left in the library");
    };
    let id = EntryId(next);
    let op = EditOp::Insert {
        entry: Entry::new(id, title, ContentLocator::new(locator)),
        position: position.unwrap_or(entries.len()),
    };

    let saved = save_edits(&session, vec![op]).await;
    session.shutdown().await?;
    let saved = saved?;

    println!("Added entry {id}");
    print_entries(&saved);
    Ok(())
}

/// Change the title and/or content of an existing entry
///
/// # Errors
/// - `SessionError::InvalidEdit` - No such entry
/// - `SessionError::PersistenceFailed` - Library file could not be written
pub async fn update_entry(
    config: &CuedeckConfig,
    id: EntryId,
    title: Option<String>,
    locator: Option<String>,
) -> anyhow::Result<()> {
    if title.is_none() && locator.is_none() {
        bail!("Nothing to update, pass --title or --locator");
    }
    if title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        bail!("Title must not be empty");
    }

    let op = EditOp::Update {
        id,
        title,
        locator: locator.map(ContentLocator::new),
    };
    edit_library(config, vec![op]).await?;
    println!("Updated entry {id}");
    Ok(())
}

/// Apply one edit batch and save it
///
/// # Errors
/// - `SessionError::InvalidEdit` - Batch rejected
/// - `SessionError::PersistenceFailed` - Library file could not be written
pub async fn edit_library(config: &CuedeckConfig, edits: Vec<EditOp>) -> anyhow::Result<()> {
    let session = open_session(config).await?;
    let saved = save_edits(&session, edits).await;
    session.shutdown().await?;

    print_entries(&saved?);
    Ok(())
}

/// Start and stop playback of an entry
///
/// # Errors
/// - `SessionError::EntryNotFound` - No such entry
/// - `SessionError::PlaybackStartFailed` - Content could not be resolved
pub async fn play_entry(config: &CuedeckConfig, id: EntryId) -> anyhow::Result<()> {
    let session = open_session(config).await?;

    let started = session.select_entry(id).await;
    if let Ok(info) = &started {
        println!("Playing entry {} from {}", info.entry_id, info.url);
        session.stop_playback().await?;
        println!("Stopped");
    }
    session.shutdown().await?;

    started.map_err(|e| anyhow::anyhow!(CuedeckError::from(e).user_message()))?;
    Ok(())
}

/// Run a simulated session and print its report
///
/// # Errors
/// - `ScenarioError::Setup` - Simulated library could not be loaded
pub async fn run_simulation(
    mut config: CuedeckConfig,
    seed: Option<u64>,
    commit_failure_rate: f64,
    attach_failure_rate: f64,
) -> anyhow::Result<()> {
    config.simulation.deterministic_seed = seed.or(config.simulation.deterministic_seed);
    config.simulation.commit_failure_rate = commit_failure_rate;
    config.simulation.attach_failure_rate = attach_failure_rate;

    println!("Running simulated session");
    if let Some(seed) = config.simulation.deterministic_seed {
        println!("  Seed: {seed}");
    }

    let report = run_session_scenario(&config).await?;

    for (index, step) in report.steps.iter().enumerate() {
        let request = step.request.to_string();
        match &step.outcome {
            Ok(()) => println!("{:>3}. {request:<16} ok     -> {}", index + 1, step.mode_after),
            Err(e) => println!(
                "{:>3}. {request:<16} failed -> {} ({e})",
                index + 1,
                step.mode_after
            ),
        }
    }

    println!("{:-<60}", "");
    println!(
        "{} steps, {} failed, {} commits rejected",
        report.steps.len(),
        report.failed_steps(),
        report.rejected_commits
    );
    println!("Committed library:");
    print_entries(&report.committed_entries);

    if !report.is_consistent() {
        for violation in &report.violations {
            eprintln!("Invariant violated: {violation}");
        }
        bail!("Simulation found {} invariant violations", report.violations.len());
    }

    Ok(())
}

async fn open_session(config: &CuedeckConfig) -> anyhow::Result<SessionHandle> {
    let store = Arc::new(JsonFileLibraryStore::from_config(&config.store));
    let surface = Arc::new(SimulatedPlaybackSurface::new(&config.simulation));
    let session = spawn_session_coordinator(&config.session, store, surface);

    session.load_library().await.with_context(|| {
        format!(
            "Failed to load library from {}",
            config.store.library_path.display()
        )
    })?;
    Ok(session)
}

/// Runs one enter, apply, save cycle. Cancels the session on failure so the
/// store never keeps a dangling edit context.
async fn save_edits(session: &SessionHandle, edits: Vec<EditOp>) -> anyhow::Result<Arc<[Entry]>> {
    session.enter_edit().await?;

    let saved = match session.apply_edits(edits).await {
        Ok(_) => session.save_edit().await,
        Err(e) => Err(e),
    };

    match saved {
        Ok(entries) => Ok(entries),
        Err(e) => {
            if let Err(cancel_error) = session.cancel_edit().await {
                tracing::warn!("Cancel after failed edit also failed: {cancel_error}");
            }
            Err(anyhow::anyhow!(CuedeckError::from(e).user_message()))
        }
    }
}

fn print_entries(entries: &[Entry]) {
    for entry in entries {
        println!(
            "{:>3}  #{:<5} {:<30} {}",
            entry.position,
            entry.id.as_u64(),
            entry.title,
            entry.locator
        );
    }
}
