// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use subflux::app_config::LogLevel;
use subflux::app_controller::{Controller, Request, Response};
use subflux::backend::{HttpTransport, ProcessMode};
use subflux::database::SqliteStore;
use subflux::live_view::{ChannelView, ViewMessage};
use subflux::pipeline::ConfiguredProviders;
use subflux::subtitle_processor::{parse_srt_string, to_srt, FileSubtitleSource};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one raw JSON action, e.g. '{"action":"getQueue"}'
    Action {
        #[arg(value_name = "JSON")]
        message: String,
    },

    /// Translate a local SRT file with the configured provider
    Translate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target language code (defaults to the configured one)
        #[arg(short, long)]
        target: Option<String>,

        /// Source language code (defaults to the configured one)
        #[arg(short, long)]
        source: Option<String>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Produce translated subtitles for a video in one shot
    Process {
        video_id: String,

        #[arg(short, long)]
        target: Option<String>,
    },

    /// Produce translated subtitles for a video with streamed partial results
    Stream {
        video_id: String,

        #[arg(short, long)]
        target: Option<String>,
    },

    /// Inspect and drive the translation queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Inspect the translation cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Show or change the stored configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions for subflux
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Queue a video and wait until the queue is drained
    Add {
        video_id: String,

        #[arg(short, long)]
        target: Option<String>,

        #[arg(long, default_value = "")]
        title: String,

        /// Return right after queueing
        #[arg(long)]
        no_wait: bool,
    },
    /// Print the queue
    List,
    /// Remove one item by id
    Remove { item_id: String },
    /// Drop completed and failed items
    Clear,
    /// Recover interrupted items and process everything pending
    Run,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print a cached translation as SRT
    Get {
        video_id: String,

        #[arg(short, long)]
        target: Option<String>,

        #[arg(short, long, default_value = "auto")]
        source: String,
    },
    /// Remove every cached translation
    Clear,
    /// Print cache statistics
    Stats,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the stored configuration
    Show,
    /// Merge a partial JSON object into the stored configuration
    Set {
        #[arg(value_name = "JSON")]
        patch: String,
    },
}

/// subflux - subtitle translation orchestration
///
/// Produces translated subtitles for videos, either through a remote
/// processing service or by calling a chat-completion API directly.
#[derive(Parser, Debug)]
#[command(name = "subflux")]
#[command(version)]
#[command(about = "Subtitle translation orchestration")]
#[command(long_about = "subflux produces translated subtitles for videos through a remote processing service or a chat-completion API.

EXAMPLES:
    subflux config set '{\"tier\":\"server\",\"backend\":{\"url\":\"https://svc.example.com\"}}'
    subflux process dQw4w9WgXcQ -t fr           # One-shot translation
    subflux stream dQw4w9WgXcQ -t fr            # Streamed partial results
    subflux translate talk.srt -t de -o talk.de.srt
    subflux queue add dQw4w9WgXcQ -t es         # Queue and wait
    subflux action '{\"action\":\"getCacheStats\"}'
    subflux completions bash > subflux.bash

STORAGE:
    Configuration, cache and queue live in one SQLite database, by default
    in the platform data directory. Override it with --db-path.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Set logging level (overrides the stored configuration)
    #[arg(short, long, value_enum, env = "SUBFLUX_LOG_LEVEL", global = true)]
    log_level: Option<CliLogLevel>,

    /// SQLite database path
    #[arg(long, env = "SUBFLUX_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Directory holding `<videoId>.srt` or `<videoId>.json` source subtitles for the local tier
    #[arg(long, env = "SUBFLUX_SUBTITLES_DIR", default_value = ".", global = true)]
    subtitles_dir: PathBuf,
}

impl Commands {
    fn shows_progress(&self) -> bool {
        matches!(
            self,
            Commands::Translate { .. }
                | Commands::Process { .. }
                | Commands::Stream { .. }
                | Commands::Queue(QueueCommand::Add { no_wait: false, .. })
                | Commands::Queue(QueueCommand::Run)
        )
    }
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // the boxed logger accepts everything, set_max_level does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color code for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "subflux", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = cli.log_level {
        log::set_max_level(LogLevel::from(level).to_level_filter());
    }

    let store = match &cli.db_path {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::open_default(),
    }
    .context("Failed to open the subflux database")?;
    debug!("Using database {:?}", store.path());

    let (view, receiver) = ChannelView::new();
    let controller = Controller::from_store(
        Arc::new(store),
        Arc::new(HttpTransport::new()),
        Arc::new(ConfiguredProviders),
        Arc::new(FileSubtitleSource::new(cli.subtitles_dir.clone())),
        Arc::new(view),
    )
    .await?;

    let config = controller.pipeline().load_config().await?;
    if cli.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let progress_bar = if cli.command.shows_progress() {
        new_progress_bar()
    } else {
        ProgressBar::hidden()
    };
    let renderer = tokio::spawn(render_view(receiver, progress_bar.clone()));

    let outcome = run_command(&controller, cli.command, &config.target_language).await;

    renderer.abort();
    progress_bar.finish_and_clear();
    outcome
}

fn new_progress_bar() -> ProgressBar {
    let progress_bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}% {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style.progress_chars("█▓▒░"));
    progress_bar
}

// Drive the progress bar from live-view messages
async fn render_view(mut receiver: UnboundedReceiver<ViewMessage>, progress_bar: ProgressBar) {
    while let Some(message) = receiver.recv().await {
        match message {
            ViewMessage::Progress { event, .. } => {
                if let Some(percent) = event.percent {
                    progress_bar.set_position(percent.round() as u64);
                }
                let message = match event.batch_info {
                    Some(batch) => format!("{} ({}/{})", event.message, batch.current, batch.total),
                    None => event.message,
                };
                progress_bar.set_message(message);
            }
            ViewMessage::PartialResult { subtitles, batch_info, .. } => {
                let message = match batch_info {
                    Some(batch) => format!("{} subtitles received (batch {}/{})", subtitles.len(), batch.current, batch.total),
                    None => format!("{} subtitles received", subtitles.len()),
                };
                progress_bar.set_message(message);
            }
            ViewMessage::QueueUpdated { items } => {
                debug!("Queue now holds {} item(s)", items.len());
            }
        }
    }
}

async fn run_command(controller: &Controller, command: Commands, default_target: &str) -> Result<()> {
    let target_or_default = |target: Option<String>| target.unwrap_or_else(|| default_target.to_string());

    match command {
        Commands::Action { message } => {
            let message: Value = serde_json::from_str(&message).context("Action must be valid JSON")?;
            let reply = controller.handle_json(&message).await;
            print_json(&reply)?;
        }
        Commands::Translate { file, target, source, output } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {:?}", file))?;
            let subtitles = parse_srt_string(&content)?;
            let config = controller.pipeline().load_config().await?;
            let source = source.unwrap_or(config.source_language);
            let target = target_or_default(target);
            info!("Translating {} subtitles from {:?} ({} -> {})", subtitles.len(), file, source, target);

            let translated = controller.pipeline().translate(&subtitles, &source, &target, None).await?;
            let srt = to_srt(&translated);
            match output {
                Some(path) => {
                    tokio::fs::write(&path, srt)
                        .await
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!("Success: {:?}", path);
                }
                None => print!("{}", srt),
            }
        }
        Commands::Process { video_id, target } => {
            let target = target_or_default(target);
            let translated = controller.pipeline().process(&video_id, &target, ProcessMode::Single).await?;
            print!("{}", to_srt(&translated));
        }
        Commands::Stream { video_id, target } => {
            let target = target_or_default(target);
            let translated = controller
                .pipeline()
                .process(&video_id, &target, ProcessMode::Streaming)
                .await?;
            print!("{}", to_srt(&translated));
        }
        Commands::Queue(command) => run_queue_command(controller, command, default_target).await?,
        Commands::Cache(CacheCommand::Get { video_id, target, source }) => {
            let target = target_or_default(target);
            match controller.pipeline().cache().get(&video_id, &source, &target).await? {
                Some(translated) => print!("{}", to_srt(&translated)),
                None => return Err(anyhow!("No cached translation for {} ({} -> {})", video_id, source, target)),
            }
        }
        Commands::Cache(CacheCommand::Clear) => {
            controller.handle(Some(Request::ClearCache)).await?;
            info!("Translation cache cleared");
        }
        Commands::Cache(CacheCommand::Stats) => {
            let response = controller.handle(Some(Request::GetCacheStats)).await?;
            print_json(&serde_json::to_value(response)?)?;
        }
        Commands::Config(ConfigCommand::Show) => {
            let response = controller.handle(Some(Request::GetConfig)).await?;
            print_json(&serde_json::to_value(response)?)?;
        }
        Commands::Config(ConfigCommand::Set { patch }) => {
            let patch: Value = serde_json::from_str(&patch).context("Configuration patch must be valid JSON")?;
            let response = controller.handle(Some(Request::SaveConfig { config: patch })).await?;
            if let Response::Config(config) = &response {
                if let Err(e) = config.validate() {
                    log::warn!("Saved configuration is incomplete: {}", e);
                }
            }
            print_json(&serde_json::to_value(response)?)?;
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}

async fn run_queue_command(controller: &Controller, command: QueueCommand, default_target: &str) -> Result<()> {
    match command {
        QueueCommand::Add { video_id, target, title, no_wait } => {
            let target = target.unwrap_or_else(|| default_target.to_string());
            let item = controller.queue().enqueue(&video_id, &title, &target).await?;
            info!("Queued {} as {}", video_id, item.id);
            if !no_wait {
                controller.queue().wait_idle().await;
                print_queue(controller).await?;
            }
        }
        QueueCommand::List => print_queue(controller).await?,
        QueueCommand::Remove { item_id } => {
            let item = controller.queue().remove(&item_id).await?;
            info!("Removed {} ({})", item.id, item.status);
        }
        QueueCommand::Clear => {
            let removed = controller.queue().clear_terminal().await?;
            info!("Removed {} finished item(s)", removed);
        }
        QueueCommand::Run => {
            controller.start().await?;
            controller.queue().wait_idle().await;
            print_queue(controller).await?;
        }
    }
    Ok(())
}

async fn print_queue(controller: &Controller) -> Result<()> {
    let items = controller.queue().list().await?;
    if items.is_empty() {
        println!("Queue is empty");
    }
    for item in items {
        let detail = item.error.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default();
        println!("{:<11} {} -> {} {}{}", item.status.to_string(), item.video_id, item.target_language, item.id, detail);
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
