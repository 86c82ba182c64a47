mod app;
mod cache;
mod commands;
mod config;
mod connectivity;
mod db;
mod event;
mod logging;
mod notify;
mod server;
mod tasks;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use cache::{
  CacheLayer, CacheRequest, CacheResult, CacheStorage, FetchOutcome, HttpNetwork, NoopStorage,
  SqliteStorage,
};
use config::Config;
use connectivity::ConnectivityObserver;
use notify::ConsoleNotifier;
use tasks::{SqliteKv, TaskId, TaskStore};

#[derive(Parser, Debug)]
#[command(name = "tasklet")]
#[command(about = "A terminal todo list with an offline-first asset cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tasklet/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  #[command(flatten)]
  Task(TaskCmd),
  /// Run the caching reverse proxy in front of the web app
  Serve {
    /// Address to listen on (overrides cache.listen)
    #[arg(short, long)]
    listen: Option<String>,
  },
  /// Inspect and maintain the asset cache
  Cache {
    #[command(subcommand)]
    command: CacheCmd,
  },
}

#[derive(Subcommand, Debug)]
enum TaskCmd {
  /// Add a task
  Add {
    title: String,
    #[arg(short, long, default_value = "")]
    description: String,
  },
  /// List all tasks
  List,
  /// Change the title and description of a task
  Edit {
    id: u64,
    title: String,
    /// New description (keeps the current one when omitted)
    #[arg(short, long)]
    description: Option<String>,
  },
  /// Flip a task between pending and done
  Toggle { id: u64 },
  /// Delete a task
  Delete { id: u64 },
}

#[derive(Subcommand, Debug)]
enum CacheCmd {
  /// Pre-cache every manifest asset
  Install,
  /// Delete buckets from earlier cache generations
  Activate,
  /// Resolve a path through the cache and report where it came from
  Fetch { path: String },
  /// List cached entries
  List,
  /// List bucket names, current one marked with `*`
  Buckets,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // The TUI owns the terminal, so only the proxy also logs to stderr
  let to_stderr = matches!(args.command, Some(Cmd::Serve { .. }));
  let _guard = logging::init(&config.log_dir()?, to_stderr)?;

  match args.command {
    None => run_tui(&config).await,
    Some(Cmd::Serve { listen }) => {
      let listen = listen.unwrap_or_else(|| config.cache.listen.clone());
      server::serve(cache_layer(&config)?, &listen).await
    }
    Some(Cmd::Cache { command }) => run_cache_command(&config, command).await,
    Some(Cmd::Task(command)) => run_task_command(&config, command),
  }
}

async fn run_tui(config: &Config) -> Result<()> {
  let kv = SqliteKv::open(&config.tasks_db_path()?)?;

  let interval = Duration::from_secs(config.connectivity.interval_secs.max(1));
  let client = reqwest::Client::builder()
    .timeout(interval)
    .build()
    .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
  let connectivity = ConnectivityObserver::spawn_http(client, config.probe_url()?, interval);

  app::run(config, kv, Some(connectivity)).await
}

fn run_task_command(config: &Config, command: TaskCmd) -> Result<()> {
  let kv = SqliteKv::open(&config.tasks_db_path()?)?;
  let mut store = TaskStore::load(kv, ConsoleNotifier)?;

  match command {
    TaskCmd::Add { title, description } => {
      let id = store
        .add(&title, &description)
        .ok_or_else(|| eyre!("Task title must not be blank"))?;
      println!("{}", id);
    }
    TaskCmd::List => {
      for task in store.tasks() {
        let mark = if task.completed { "x" } else { " " };
        if task.description.is_empty() {
          println!("{} [{}] {}", task.id, mark, task.title);
        } else {
          println!("{} [{}] {}: {}", task.id, mark, task.title, task.description);
        }
      }
    }
    TaskCmd::Edit {
      id,
      title,
      description,
    } => {
      let id = TaskId(id);
      let description = match description {
        Some(d) => d,
        None => store
          .get(id)
          .map(|t| t.description.clone())
          .ok_or_else(|| eyre!("No task with id {}", id))?,
      };
      if !store.update(id, &title, &description) {
        return Err(eyre!("Task {} not updated (unknown id or blank title)", id));
      }
    }
    TaskCmd::Toggle { id } => {
      let completed = store
        .toggle_complete(TaskId(id))
        .ok_or_else(|| eyre!("No task with id {}", id))?;
      println!("{}", if completed { "done" } else { "pending" });
    }
    TaskCmd::Delete { id } => {
      store
        .delete(TaskId(id))
        .ok_or_else(|| eyre!("No task with id {}", id))?;
    }
  }

  Ok(())
}

async fn run_cache_command(config: &Config, command: CacheCmd) -> Result<()> {
  let layer = cache_layer(config)?;

  match command {
    CacheCmd::Install => {
      let count = layer.install().await?;
      println!("Cached {} assets in {}", count, layer.settings().cache_name);
    }
    CacheCmd::Activate => {
      for name in layer.activate()? {
        println!("Deleted bucket {}", name);
      }
    }
    CacheCmd::Fetch { path } => {
      let request = CacheRequest::get(layer.resolve(&path)?);
      let outcome = layer.fetch(&request).await?;
      // Let the background write land before the process exits
      layer.settle().await;

      let (Some(response), Some(source)) = (outcome.response(), outcome.source()) else {
        return Err(eyre!("{} is unavailable offline", request.url));
      };
      println!(
        "{} {} ({} bytes, {})",
        response.status,
        request.url,
        response.body.len(),
        source.as_str()
      );
      if let FetchOutcome::Served(CacheResult {
        cached_at: Some(cached_at),
        ..
      }) = outcome
      {
        println!("cached at {}", cached_at.format("%Y-%m-%d %H:%M:%S"));
      }
    }
    CacheCmd::List => {
      for entry in layer.entries()? {
        println!(
          "{} {} {} {} {}",
          entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
          entry.response.status,
          entry.method,
          entry.url,
          entry.response.header("content-type").unwrap_or("-")
        );
      }
    }
    CacheCmd::Buckets => {
      for name in layer.bucket_names()? {
        let mark = if name == layer.settings().cache_name { "*" } else { " " };
        println!("{} {}", mark, name);
      }
    }
  }

  Ok(())
}

/// Cache layer over the configured storage. With caching disabled every
/// lookup misses and nothing is stored.
fn cache_layer(config: &Config) -> Result<CacheLayer<Box<dyn CacheStorage>, HttpNetwork>> {
  let storage: Box<dyn CacheStorage> = if config.cache.enabled {
    Box::new(SqliteStorage::open(&config.cache_db_path()?)?)
  } else {
    info!("Caching disabled, every request goes to the network");
    Box::new(NoopStorage)
  };

  let network = HttpNetwork::new(config.origin()?, config.request_timeout())?;
  CacheLayer::new(storage, network, config.cache_settings()?)
}
