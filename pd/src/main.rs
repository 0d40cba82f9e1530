use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use postdaemon::agent::{self, Agent};
use postdaemon::check::ConfigReport;
use postdaemon::cli::{Cli, Command, OutputFormat, get_log_path};
use postdaemon::orchestrator::{SlotReport, UploadError, UploadOutcome};
use postdaemon::schedule;
use postdaemon::status::StatusReport;
use postdaemon::{Config, Platform, WeeklySchedule};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("pd.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file before it is fully loaded
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let log_dir = Config::load_log_dir(cli.config.as_ref())
        .or_else(|| get_log_path().parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), &log_dir)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Upload {
            video,
            platforms,
            dry_run,
        } => cmd_upload(&config, video.as_deref(), platforms, dry_run).await,
        Command::Status { format } => cmd_status(&config, format),
        Command::Schedule { dry_run } => cmd_schedule(&config, dry_run).await,
        Command::Check => cmd_check(&config),
        Command::Next { count } => cmd_next(&config, usize::from(count)),
    }
}

/// Upload one video, or every video of today's current slot
async fn cmd_upload(config: &Config, video: Option<&str>, platforms: Vec<Platform>, dry_run: bool) -> Result<()> {
    debug!(?video, ?platforms, dry_run, "cmd_upload: called");
    config.validate()?;
    let agent = Agent::from_config(config, dry_run)?;
    let platforms = if platforms.is_empty() {
        agent.schedule.platforms().to_vec()
    } else {
        platforms
    };

    if let Some(video) = video {
        let result = if schedule::is_pool_entry(video) {
            agent.orchestrator.upload_from_pool(&platforms, &[]).await
        } else {
            agent.orchestrator.upload_video(video, &platforms).await
        };
        return report_upload(video, result);
    }

    let Some(current) = agent.schedule.current_slot(Local::now().naive_local()) else {
        println!("Nothing scheduled for today. Use --video to upload a specific video.");
        return Ok(());
    };
    println!(
        "Uploading the {} slot: {}",
        current.slot.time.format("%H:%M"),
        current.slot.videos.join(", ")
    );
    let report = agent.orchestrator.run_slot(&current.slot.videos, &platforms).await;
    report_slot(report)
}

fn report_upload(video: &str, result: Result<UploadOutcome, UploadError>) -> Result<()> {
    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            if outcome.succeeded() {
                Ok(())
            } else {
                Err(eyre!("Upload of {} did not succeed on every platform", video))
            }
        }
        Err(UploadError::NotRecorded { outcome, source }) => {
            print_outcome(&outcome);
            Err(eyre!("Upload history was not saved: {}", source))
        }
        Err(e) => Err(eyre!(e).wrap_err(format!("Upload of {} failed", video))),
    }
}

fn report_slot(report: SlotReport) -> Result<()> {
    let total = report.entries.len();
    let failed = report.failures().count();
    let persistence = report.has_persistence_failure();

    for entry in report.entries {
        match entry.result {
            Ok(outcome) => print_outcome(&outcome),
            Err(UploadError::NotRecorded { outcome, source }) => {
                print_outcome(&outcome);
                println!("  {} history not saved: {}", "✗".red(), source);
            }
            Err(e) => println!("{} {}: {}", "✗".red(), entry.video_id.bold(), e),
        }
    }

    if persistence {
        return Err(eyre!("Upload history was not saved; see the log for details"));
    }
    if failed > 0 {
        return Err(eyre!("{} of {} uploads failed", failed, total));
    }
    Ok(())
}

fn print_outcome(outcome: &UploadOutcome) {
    let tag = if outcome.dry_run { " (dry run)".dimmed().to_string() } else { String::new() };
    println!(
        "{}{} caption #{} of {}{}",
        outcome.video_id.bold(),
        tag,
        outcome.caption_index + 1,
        outcome.caption_count,
        if outcome.ai_caption { ", AI rewritten" } else { "" }
    );
    for result in &outcome.results {
        if result.succeeded {
            match &result.media_id {
                Some(id) => println!("  {} {} ({})", "✓".green(), result.platform, id),
                None => println!("  {} {}", "✓".green(), result.platform),
            }
        } else {
            println!(
                "  {} {}: {}",
                "✗".red(),
                result.platform,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    if let Some(record) = &outcome.recorded {
        println!("  Recorded upload #{}", record.upload_count);
    }
}

fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let tracker = agent::open_tracker(config);
    let report = StatusReport::build(&tracker);
    match format {
        OutputFormat::Text => print!("{}", report.render()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

/// Run the weekly schedule until SIGINT/SIGTERM
async fn cmd_schedule(config: &Config, dry_run: bool) -> Result<()> {
    debug!(dry_run, "cmd_schedule: called");
    config.validate()?;
    let agent = Agent::from_config(config, dry_run)?;

    if agent.schedule.is_empty() {
        warn!("Schedule has no videos");
        println!("{}", "Warning: no videos are scheduled".yellow());
    }
    println!(
        "Scheduler running ({} uploads per week). Press Ctrl+C to stop.",
        agent.schedule.uploads_per_week()
    );
    info!(dry_run, "Scheduler started");

    #[cfg(unix)]
    let stop = {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        async move {
            tokio::select! {
                _ = sigint.recv() => {
                    warn!("SIGINT received");
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received");
                }
            }
            println!("Stopping after the current upload...");
        }
    };

    #[cfg(not(unix))]
    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            return std::future::pending::<()>().await;
        }
        warn!("Ctrl+C received");
        println!("Stopping after the current upload...");
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let handle =
        tokio::spawn(async move { schedule::run(&agent.orchestrator, &agent.schedule, shutdown_rx).await });

    schedule::supervise(handle, shutdown_tx, stop).await?;
    info!("Scheduler stopped");
    Ok(())
}

fn cmd_check(config: &Config) -> Result<()> {
    debug!("cmd_check: called");
    let schedule = WeeklySchedule::from_config(&config.schedule).context("Invalid schedule")?;
    let library = agent::open_library(config);
    let report = ConfigReport::build(config, &schedule, &library, Local::now().weekday());
    print!("{}", report.render());
    if report.has_errors() {
        return Err(eyre!("Configuration check failed"));
    }
    Ok(())
}

fn cmd_next(config: &Config, count: usize) -> Result<()> {
    debug!(count, "cmd_next: called");
    let schedule = WeeklySchedule::from_config(&config.schedule).context("Invalid schedule")?;
    let upcoming = schedule.upcoming(Local::now().naive_local(), count);
    if upcoming.is_empty() {
        println!("Nothing scheduled");
        return Ok(());
    }

    let platforms: Vec<&str> = schedule.platforms().iter().map(|p| p.as_str()).collect();
    for occ in upcoming {
        println!(
            "{}  {}  -> {}",
            occ.at.format("%a %Y-%m-%d %H:%M").to_string().bold(),
            occ.slot.videos.join(", "),
            platforms.join(", ")
        );
    }
    Ok(())
}
