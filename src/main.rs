//! # Camvault CLI (`camvault`)
//!
//! Command-line front end for the archive client: search recordings, check
//! how a clip is served, and pull clips (or byte ranges of them) to disk.
//!
//! ## Usage
//!
//! ```bash
//! camvault --config ./config/camvault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `camvault search` | Search recordings by date, time window, camera, plate |
//! | `camvault probe <id>` | Report range support, size and type of a clip |
//! | `camvault fetch <id> --out <path>` | Download a clip or a byte range of it |
//! | `camvault status` | Show the configured backend and sign-in state |
//!
//! Logging goes to stderr; set `RUST_LOG` or pass `-v` / `-vv`.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camvault::auth::{AuthProvider, SessionAuth};
use camvault::config;
use camvault::query::{Filter, FilterField};
use camvault::search;
use camvault::stream::{self, ByteRange};

/// Camvault: search and stream archived surveillance clips.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/camvault.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "camvault", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/camvault.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search recordings. With no filters, lists every clip.
    Search {
        /// Upload date, `YYYY-MM-DD`.
        #[arg(long)]
        date: Option<String>,

        /// Window start, `HH:MM:SS`.
        #[arg(long)]
        start_time: Option<String>,

        /// Window end, `HH:MM:SS`.
        #[arg(long)]
        end_time: Option<String>,

        /// Camera identifier.
        #[arg(long)]
        camera: Option<String>,

        /// License plate (or part of one).
        #[arg(long)]
        plate: Option<String>,

        /// Print the session state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Probe a clip's stream with a one-byte range request.
    Probe { video_id: String },

    /// Download a clip to a file.
    Fetch {
        video_id: String,

        #[arg(long)]
        out: PathBuf,

        /// Byte range, `START-END` (inclusive) or `START-`.
        #[arg(long)]
        range: Option<ByteRange>,
    },

    /// Show the configured backend and whether a session is available.
    Status,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "camvault=warn",
        1 => "camvault=info",
        _ => "camvault=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            date,
            start_time,
            end_time,
            camera,
            plate,
            json,
        } => {
            let mut filter = Filter::new();
            for (field, value) in [
                (FilterField::Date, date),
                (FilterField::StartTime, start_time),
                (FilterField::EndTime, end_time),
                (FilterField::CameraId, camera),
                (FilterField::Plate, plate),
            ] {
                if let Some(value) = value {
                    filter.set_field(field, value);
                }
            }
            search::run_search(&cfg, &filter, json).await?;
        }
        Commands::Probe { video_id } => {
            stream::run_probe(&cfg, &video_id).await?;
        }
        Commands::Fetch {
            video_id,
            out,
            range,
        } => {
            stream::run_fetch(&cfg, &video_id, &out, range).await?;
        }
        Commands::Status => {
            let auth = SessionAuth::from_config(&cfg.auth);
            println!("server:        {}", cfg.api_base()?.as_str());
            println!(
                "signed in:     {}",
                if auth.is_authenticated() { "yes" } else { "no" }
            );
            println!(
                "user:          {}",
                auth.user().as_deref().unwrap_or("(unknown)")
            );
            println!("stream:        {:?}", cfg.playback.endpoint);
        }
    }

    Ok(())
}
