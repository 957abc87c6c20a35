use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

/// coursegate - learner progress and lesson gating
/// Tracks watched lessons, gates the next lesson, grades quizzes
#[derive(Parser)]
#[command(name = "coursegate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Learner progress and lesson gating for video courses", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, config and state database
    Init,

    /// Show per-course progress
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a course's lessons with their lock state
    Lessons {
        course: String,
    },

    /// Open a lesson (no-op if it is locked)
    Select {
        course: String,
        lesson: String,
    },

    /// Record a lesson's media duration in seconds
    Duration {
        lesson: String,
        seconds: f64,
    },

    /// Read JSON-lines playback samples from stdin while a lesson is open
    Watch {
        course: String,
        lesson: String,
    },

    /// Report that a lesson's media played to the end
    Ended {
        lesson: String,
    },

    /// Submit quiz answers (option indices, `-` to skip a question)
    Submit {
        course: String,
        lesson: String,
        #[arg(allow_hyphen_values = true)]
        answers: Vec<String>,
    },

    /// Show reminders for the current progress
    Notify,

    /// List issued certificates
    Certificates {
        /// Write the certificate list as JSON to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Show the integrity log
    Integrity,

    /// Sync progress with the configured mirror
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Clear playback state and course progress
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Fetch remote progress and merge it into local state
    Pull,
    /// Upload every local course to the mirror
    Push,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = coursegate::config::data_dir()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing coursegate");
            commands::init(&data_dir)?;
        }
        Commands::Status { json } => {
            commands::status(&data_dir, json).await?;
        }
        Commands::Lessons { course } => {
            commands::lessons(&data_dir, &course).await?;
        }
        Commands::Select { course, lesson } => {
            commands::select(&data_dir, &course, &lesson).await?;
        }
        Commands::Duration { lesson, seconds } => {
            commands::duration(&data_dir, &lesson, seconds).await?;
        }
        Commands::Watch { course, lesson } => {
            commands::watch(&data_dir, &course, &lesson).await?;
        }
        Commands::Ended { lesson } => {
            commands::ended(&data_dir, &lesson).await?;
        }
        Commands::Submit { course, lesson, answers } => {
            commands::submit(&data_dir, &course, &lesson, &answers).await?;
        }
        Commands::Notify => {
            commands::notify(&data_dir).await?;
        }
        Commands::Certificates { export } => {
            commands::certificates(&data_dir, export.as_deref())?;
        }
        Commands::Integrity => {
            commands::integrity(&data_dir)?;
        }
        Commands::Sync { action } => match action {
            SyncAction::Pull => commands::sync_pull(&data_dir).await?,
            SyncAction::Push => commands::sync_push(&data_dir).await?,
        },
        Commands::Reset { yes } => {
            commands::reset(&data_dir, yes).await?;
        }
    }

    Ok(())
}
