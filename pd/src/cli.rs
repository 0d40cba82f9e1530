//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

use crate::schedule::MAX_UPCOMING;
use crate::uploader::Platform;

/// PostDaemon - scheduled video poster with caption rotation
#[derive(Parser)]
#[command(
    name = "pd",
    about = "Post videos on a weekly schedule, rotating through pre-written captions",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload one video now (defaults to the current slot's videos)
    Upload {
        /// Video file name from the catalog
        #[arg(short, long)]
        video: Option<String>,

        /// Platform to post to; repeat for several (defaults to the schedule's)
        #[arg(short, long = "platform", value_parser = parse_platform)]
        platforms: Vec<Platform>,

        /// Log what would be posted without uploading or saving history
        #[arg(long)]
        dry_run: bool,
    },

    /// Show caption rotation state per video
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run the weekly schedule until interrupted
    Schedule {
        /// Log what would be posted without uploading or saving history
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration, catalog and schedule
    Check,

    /// List upcoming upload slots
    Next {
        /// Number of slots to show
        #[arg(
            short = 'n',
            long,
            default_value_t = 5,
            value_parser = clap::value_parser!(u16).range(1..=MAX_UPCOMING as i64)
        )]
        count: u16,
    },
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse()
}

/// Output format for status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Default log file location
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("postdaemon")
        .join("logs")
        .join("pd.log");
    debug!(?path, "get_log_path: returning path");
    path
}
