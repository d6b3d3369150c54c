mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sharedstate_lib::consts::DEFAULT_VALUE_FILENAME;
use sharedstate_lib::{LockStrategy, ReadMode, SharedStore, StoreOptions};

use crate::output::{OutputFormat, print_error};

/// sst - inspect and edit a shared state file
#[derive(Parser)]
#[command(name = "sst")]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  store: StoreArgs,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args)]
struct StoreArgs {
  /// Path to the shared value file
  #[arg(long, global = true, env = "SHAREDSTATE_FILE", default_value = DEFAULT_VALUE_FILENAME)]
  file: PathBuf,

  /// Path to the lock file (defaults to <file>.lock)
  #[arg(long, global = true)]
  lock_file: Option<PathBuf>,

  /// How long to wait for the lock (e.g. 500ms, 5s)
  #[arg(long, global = true, value_parser = humantime::parse_duration)]
  timeout: Option<Duration>,

  /// Take the lock for reads as well as writes
  #[arg(long, global = true)]
  locked_reads: bool,

  /// Use an OS advisory lock instead of a lock token
  #[arg(long, global = true)]
  flock: bool,

  /// Keep the previous value as <file>.bak and fall back to it when the value is corrupt
  #[arg(long, global = true)]
  keep_backup: bool,
}

impl StoreArgs {
  fn open(&self) -> SharedStore {
    let mut options = StoreOptions::from_env().with_lock_label("sst");
    if let Some(timeout) = self.timeout {
      options = options.with_lock_timeout(timeout);
    }
    if self.locked_reads {
      options = options.with_read_mode(ReadMode::Locked);
    }
    if self.flock {
      options = options.with_lock_strategy(LockStrategy::Flock);
    }
    if self.keep_backup {
      options = options.with_keep_backup(true);
    }

    let store = SharedStore::with_options(&self.file, options);
    let store = match &self.lock_file {
      Some(lock_file) => store.with_lock_path(lock_file),
      None => store,
    };

    debug!(
      value = %store.value_path().display(),
      lock = %store.lock_path().display(),
      strategy = store.options().lock_strategy.as_str(),
      "opened shared store"
    );
    store
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Print the whole shared value
  Show,

  /// Print one top-level key
  Get {
    key: String,
  },

  /// Set one top-level key (VALUE is parsed as JSON, otherwise stored as a string)
  Set {
    key: String,
    value: String,
  },

  /// Remove one top-level key
  Remove {
    key: String,
  },

  /// Replace the shared value with an empty mapping
  Clear {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    force: bool,
  },

  /// Show paths, lock state and lock holder
  Status,

  /// Remove the backup if it is older than a given age
  Prune {
    /// Minimum age of a backup to remove (e.g. 7d, 12h)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "7d")]
    older_than: Duration,
  },

  /// Remove an orphaned lock token
  Unlock {
    /// Remove the token even if its holder looks alive, and skip the prompt
    #[arg(short, long)]
    force: bool,
  },
}

fn main() {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(err) = run(cli) {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let store = cli.store.open();
  let output = cli.output;

  match cli.command {
    Commands::Show => cmd::cmd_show(&store, output),
    Commands::Get { key } => cmd::cmd_get(&store, &key, output),
    Commands::Set { key, value } => cmd::cmd_set(&store, &key, &value, output),
    Commands::Remove { key } => cmd::cmd_remove(&store, &key, output),
    Commands::Clear { force } => cmd::cmd_clear(&store, force, output),
    Commands::Status => cmd::cmd_status(&store, cli.verbose, output),
    Commands::Prune { older_than } => cmd::cmd_prune(&store, older_than, output),
    Commands::Unlock { force } => cmd::cmd_unlock(&store, force, output),
  }
}
