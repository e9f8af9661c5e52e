use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "anchorbeat", version, about = "Self-healing music library classifier")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervising loop: poll the catalog and classify every
    /// unmarked track, one isolated worker process per file
    Supervise {
        /// Path to the catalog database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Root of the music library
        #[arg(long)]
        music_dir: Option<PathBuf>,
    },

    /// Classify a single file (spawned per-track by the supervisor)
    Worker {
        /// The audio file to classify
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    // Load config file (optional, defaults if missing)
    let mut config = anchorbeat::config::AppConfig::load();

    match cli.command {
        Commands::Supervise { db, music_dir } => {
            if let Some(db) = db {
                config.db_path = db;
            }
            if let Some(music_dir) = music_dir {
                config.music_dir = music_dir;
            }
            anchorbeat::supervisor::run(&config)
        }

        Commands::Worker { file } => {
            match anchorbeat::worker::run(&file, &config) {
                // Success and benign skips (quarantine, vanished file) are
                // exit 0; the supervisor only distinguishes handled from
                // unexpected.
                Ok(_) => Ok(()),
                Err(e) => {
                    eprintln!("[error] {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
