//! CLI entry point for the stream downloader.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use stream_downloader::{EngineKind, MediaId, QueueController, QueueEvent, QueueItem, Settings};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use cli::{AddArgs, Args, Command};

/// Upper bound on flushing buffered queue events at shutdown.
const LOGGER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "loaded config file");
    }
    let data_dir = app_config::resolve_data_dir(args.data_dir.as_deref());

    match args.command {
        Command::Add(add) => run_add(loaded.settings, &data_dir, add).await,
        Command::Remove { video_id } => run_remove(loaded.settings, &data_dir, &video_id).await,
        Command::List => run_list(loaded.settings, &data_dir).await,
        Command::Run => run_queue(loaded.settings, &data_dir).await,
        Command::PurgeQueue => run_purge_queue(loaded.settings, &data_dir).await,
        Command::PurgeHistory => run_purge_history(loaded.settings, &data_dir).await,
        Command::Check => run_check(loaded.settings, &data_dir).await,
    }
}

/// Opens the persisted queue without processing anything.
async fn open_paused(settings: Settings, data_dir: &Path) -> QueueController {
    let queue = QueueController::init(settings, data_dir).await;
    queue.pause();
    queue.load().await;
    queue
}

async fn run_add(settings: Settings, data_dir: &Path, add: AddArgs) -> Result<()> {
    let queue = open_paused(settings, data_dir).await;

    let mut item = QueueItem::new(MediaId::parse_lenient(&add.video_id), add.url);
    if add.user_id.is_some() || add.user_name.is_some() {
        let user_id = add
            .user_id
            .as_deref()
            .map(MediaId::parse_lenient)
            .unwrap_or_default();
        item = item.with_user(user_id, add.user_name.unwrap_or_default());
    }
    if let Some(title) = add.title {
        item = item.with_title(title);
    }
    if let Some(time) = add.time {
        item = item.with_time(time);
    }

    let video_id = item.video.id.clone();
    if queue.has_been_downloaded(&video_id) {
        warn!(video_id = %video_id, "video was already downloaded, queueing again");
    }
    queue.add(item);
    queue.force_save().await;
    info!(video_id = %video_id, pending = queue.pending().len(), "queued");
    Ok(())
}

async fn run_remove(settings: Settings, data_dir: &Path, video_id: &str) -> Result<()> {
    let queue = open_paused(settings, data_dir).await;
    let id = MediaId::parse_lenient(video_id);
    if !queue.remove(&id) {
        bail!("No pending item with video id '{video_id}'");
    }
    queue.force_save().await;
    info!(video_id = %id, "removed");
    Ok(())
}

async fn run_list(settings: Settings, data_dir: &Path) -> Result<()> {
    let queue = open_paused(settings, data_dir).await;
    for item in queue.pending() {
        let title = item.video.title.as_deref().unwrap_or("-");
        println!("{}\t{}\t{}\t{}", item.video.id, item.user.name, title, item.video.url);
    }
    Ok(())
}

async fn run_queue(settings: Settings, data_dir: &Path) -> Result<()> {
    let queue = QueueController::init(settings, data_dir).await;
    let (stop_logger, stop) = oneshot::channel();
    let logger = tokio::spawn(log_events(queue.subscribe(), stop));

    queue.load().await;
    if queue.is_paused() {
        logger.abort();
        bail!(
            "The ffmpeg engine is selected but ffmpeg was not found; install it or set downloads.engine = \"internal\""
        );
    }

    tokio::select! {
        () = queue.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, finishing the current item");
            queue.pause();
            queue.wait_idle().await;
        }
    }

    queue.force_save().await;
    let _ = stop_logger.send(());
    if tokio::time::timeout(LOGGER_DRAIN_TIMEOUT, logger).await.is_err() {
        debug!("event log did not drain in time");
    }
    info!(
        pending = queue.pending().len(),
        downloaded = queue.history().len(),
        "queue idle"
    );
    Ok(())
}

async fn run_purge_queue(settings: Settings, data_dir: &Path) -> Result<()> {
    let queue = open_paused(settings, data_dir).await;
    queue.purge_queue();
    queue.store().flush().await;
    info!("queue purged");
    Ok(())
}

async fn run_purge_history(settings: Settings, data_dir: &Path) -> Result<()> {
    let queue = open_paused(settings, data_dir).await;
    queue.purge_history();
    queue.store().flush().await;
    info!("history purged");
    Ok(())
}

async fn run_check(settings: Settings, data_dir: &Path) -> Result<()> {
    let engine = settings.downloads.engine;
    let ffmpeg_path = settings.downloads.ffmpeg_path.clone();
    let queue = QueueController::init(settings, data_dir).await;
    let available = queue.is_engine_available();
    println!(
        "ffmpeg ({}): {}",
        ffmpeg_path.display(),
        if available { "available" } else { "not found" }
    );
    println!("engine: {engine}");
    if engine == EngineKind::Ffmpeg && !available {
        bail!("Selected engine is ffmpeg but it is not available");
    }
    Ok(())
}

/// Logs queue events until `stop` fires, then drains whatever is already
/// buffered so the final start/finish lines are not lost.
async fn log_events(
    mut events: broadcast::Receiver<QueueEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => log_event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = &mut stop => break,
        }
    }
    loop {
        match events.try_recv() {
            Ok(event) => log_event(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "event log lagged");
            }
            Err(_) => return,
        }
    }
}

fn log_event(event: QueueEvent) {
    match event {
        QueueEvent::Start { id, url } => {
            info!(video_id = %id, url = %url, "download started");
        }
        QueueEvent::Progress { id, value, .. } => {
            debug!(video_id = %id, percent = value, "progress");
        }
        event => debug!(event = event.name(), "queue event"),
    }
}
