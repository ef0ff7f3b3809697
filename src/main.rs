use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use subwatch::config::Config;
use subwatch::entry::EntryKey;
use subwatch::fetcher::VliveClient;
use subwatch::format::entry_line;
use subwatch::library::Library;
use subwatch::store::{EntryStore, JsonFileStore, MemoryStore};
use subwatch::sync::{CycleReport, Syncer};

const TITLE_WIDTH: usize = 60;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Track English subtitles on followed channels", long_about = None)]
struct Args {
  /// Config file to use instead of the platform default `prefs.toml`
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Entry store to use instead of the configured one
  #[arg(short, long, global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Poll every followed channel and refresh the entry store
  Sync {
    /// Fetch and report without writing the store
    #[arg(long)]
    dry_run: bool,
    /// Keep running, starting a new cycle every N seconds
    #[arg(long, value_name = "SECS")]
    every: Option<u64>,
  },
  /// Print tracked videos
  List {
    /// Only videos with English subtitles not yet watched or ignored
    #[arg(long, conflicts_with = "active")]
    interesting: bool,
    /// Only videos still waiting for English subtitles
    #[arg(long)]
    active: bool,
  },
  /// Mark a video as watched
  Watch {
    channel: u32,
    video: u32,
    /// Clear the flag instead of setting it
    #[arg(long)]
    undo: bool,
  },
  /// Mark a video as ignored
  Ignore {
    channel: u32,
    video: u32,
    /// Clear the flag instead of setting it
    #[arg(long)]
    undo: bool,
  },
  /// Print a shell completion script
  Completions { shell: Shell },
}

// --- Setup ---

/// Log to `subwatch.log` in the cache dir, or to stderr when there is none.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_logging() -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let appender = Config::log_dir().and_then(|dir| {
    std::fs::create_dir_all(&dir).ok()?;
    RollingFileAppender::builder().rotation(Rotation::NEVER).filename_prefix("subwatch.log").build(dir).ok()
  });

  match appender {
    Some(appender) => {
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
      None
    }
  }
}

fn load_config(args: &Args) -> Result<Config> {
  let mut config = match &args.config {
    Some(path) => Config::load_from(path)?,
    None => Config::load(),
  };
  if let Some(store) = &args.store {
    config.store_path = Some(store.clone());
  }
  Ok(config)
}

fn open_library(config: &Config, dry_run: bool) -> Result<Library> {
  let path = config.resolved_store_path().context("No data directory available for the entry store")?;
  let mut file_store =
    JsonFileStore::open(&path).with_context(|| format!("Failed to open entry store {}", path.display()))?;

  let store: Box<dyn EntryStore> = if dry_run {
    Box::new(MemoryStore::with_records(file_store.load_all()?))
  } else {
    Box::new(file_store)
  };
  Library::open(store, config.thumbnail_concurrency)
}

// --- Commands ---

fn print_report(report: &CycleReport, stored: usize, library: &Library) {
  println!(
    "{} channels ({} failed): {} new, {} updated, {} settled, {} failed, {} thumbnails stored",
    report.channels_polled,
    report.channels_failed,
    report.inserted,
    report.updated,
    report.skipped_settled,
    report.videos_failed,
    stored,
  );
  for failure in library.thumbnail_failures() {
    println!("  thumbnail {}: {}", failure.key, failure.error);
  }
}

async fn sync(config: &Config, dry_run: bool, every: Option<u64>) -> Result<()> {
  let mut library = open_library(config, dry_run)?;
  let client = Arc::new(VliveClient::new().context("Failed to build HTTP client")?);
  let syncer = Syncer::new(client, config.channels.clone());

  let Some(secs) = every else {
    if let Some(report) = syncer.run_cycle(&mut library).await {
      let stored = library.wait_for_thumbnails().await;
      print_report(&report, stored, &library);
    }
    return Ok(());
  };

  info!(every = secs, "sync: periodic mode");
  let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        if let Some(report) = syncer.run_cycle(&mut library).await {
          let stored = library.wait_for_thumbnails().await;
          print_report(&report, stored, &library);
        }
      }
      result = tokio::signal::ctrl_c() => {
        if let Err(e) = result {
          warn!(err = %e, "sync: failed to listen for ctrl-c");
        }
        info!("sync: stopping");
        return Ok(());
      }
    }
  }
}

fn list(config: &Config, interesting: bool, active: bool) -> Result<()> {
  let mut library = open_library(config, true)?;
  library.set_interesting(interesting);
  library.set_active(active);

  let mut shown = 0;
  for entry in library.selected() {
    println!("{}", entry_line(entry, TITLE_WIDTH));
    shown += 1;
  }
  println!("{} of {} videos ({})", shown, library.len(), library.filter_mode().label());
  Ok(())
}

fn mark(config: &Config, key: EntryKey, watched: bool, value: bool) -> Result<()> {
  let mut library = open_library(config, false)?;
  let changed = if watched { library.set_watched(&key, value)? } else { library.set_ignored(&key, value)? };
  let flag = if watched { "watched" } else { "ignored" };
  match (changed, value) {
    (true, true) => println!("{key}: marked {flag}"),
    (true, false) => println!("{key}: no longer {flag}"),
    (false, _) => println!("{key}: already {}{flag}", if value { "" } else { "not " }),
  }
  Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Command::Completions { shell } = args.command {
    clap_complete::generate(shell, &mut Args::command(), "subwatch", &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = init_logging();
  let config = load_config(&args)?;

  match args.command {
    Command::Sync { dry_run, every } => sync(&config, dry_run, every).await,
    Command::List { interesting, active } => list(&config, interesting, active),
    Command::Watch { channel, video, undo } => mark(&config, EntryKey::new(channel, video), true, !undo),
    Command::Ignore { channel, video, undo } => mark(&config, EntryKey::new(channel, video), false, !undo),
    Command::Completions { .. } => Ok(()),
  }
}
