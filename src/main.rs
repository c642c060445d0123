mod agent;
mod cache;
mod config;
mod db;
mod event;
mod logging;
mod net;
mod queue;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use agent::OfflineAgent;
use cache::{CacheManager, CachePolicy, FetchOutcome, SqliteCacheStore};
use event::{AgentEvent, EventHandler, EventOutcome};
use net::{HttpNetwork, Network, Request, RequestMode};
use queue::{HttpSender, MessageQueue, SqliteQueueStore};

#[derive(Parser, Debug)]
#[command(name = "drawchat-offline")]
#[command(about = "Offline support agent for DrawChat")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/drawchat/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin to serve, overriding the config file
  #[arg(short, long)]
  origin: Option<String>,

  /// Debug logging
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the asset manifest into the current cache generation
  Install,
  /// Delete every cache generation except the current one
  Activate,
  /// Handle a request the way an intercepted page request would be
  Fetch {
    /// Absolute URL, or a path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request mode; `navigate` gets the offline page when the network is down
    #[arg(short, long, value_enum, default_value_t = Mode::SameOrigin)]
    mode: Mode,
    /// Request header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Queue a chat message (JSON) for background sync
  Enqueue { message: String },
  /// Deliver a reconnect signal
  Sync {
    /// Sync tag (defaults to the configured one)
    #[arg(long)]
    tag: Option<String>,
  },
  /// List queued messages, oldest first
  Queue,
  /// List cache generations
  Generations,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
  Navigate,
  SameOrigin,
  Cors,
  NoCors,
}

impl From<Mode> for RequestMode {
  fn from(mode: Mode) -> Self {
    match mode {
      Mode::Navigate => RequestMode::Navigate,
      Mode::SameOrigin => RequestMode::SameOrigin,
      Mode::Cors => RequestMode::Cors,
      Mode::NoCors => RequestMode::NoCors,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };
  let origin = config.origin_url()?;

  let _log_guard = logging::init(config.log_file.as_deref(), args.verbose)?;

  let network = Arc::new(HttpNetwork::new(
    origin.clone(),
    Duration::from_secs(config.request_timeout_secs),
  )?);

  let cache_store = Arc::new(SqliteCacheStore::open(&config.cache_db_path()?)?);
  let cache = CacheManager::new(
    cache_store,
    Arc::clone(&network),
    CachePolicy {
      origin: origin.clone(),
      version: config.cache.version.clone(),
      assets: config.cache.assets.clone(),
      offline_page: config.cache.offline_page.clone(),
    },
  );

  let endpoint = origin
    .join(&config.queue.endpoint)
    .map_err(|e| eyre!("Invalid queue endpoint {}: {}", config.queue.endpoint, e))?;
  let queue_store = Arc::new(SqliteQueueStore::open(
    &config.queue_db_path()?,
    config.queue.store_version,
  )?);
  let queue = MessageQueue::new(
    queue_store,
    Arc::new(HttpSender::new(network.client().clone(), endpoint)),
  );

  let agent = Arc::new(OfflineAgent::new(
    cache,
    queue,
    config.queue.sync_tag.clone(),
  ));
  let events = EventHandler::new(Arc::clone(&agent));

  match args.command {
    Command::Install => {
      if let EventOutcome::Installed(report) = events.send(AgentEvent::Install).await? {
        println!(
          "installed {} ({} entries)",
          report.generation, report.entries
        );
        if report.skip_waiting {
          info!("New version takes over without waiting");
        }
      }
    }
    Command::Activate => {
      if let EventOutcome::Activated(report) = events.send(AgentEvent::Activate).await? {
        for name in &report.deleted {
          println!("deleted {}", name);
        }
        println!("active {}", report.current);
        if report.claim_clients {
          info!("Claiming open pages");
        }
      }
    }
    Command::Fetch {
      url,
      method,
      mode,
      headers,
      data,
    } => {
      let url = origin
        .join(&url)
        .map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
      let request = Request {
        method,
        url,
        mode: mode.into(),
        headers: headers
          .iter()
          .map(|h| parse_header(h))
          .collect::<Result<_>>()?,
        body: data.map(String::into_bytes),
      };

      let outcome = match events.send(AgentEvent::Fetch(request.clone())).await? {
        EventOutcome::Fetched(FetchOutcome::Passthrough) => {
          // Not ours to handle: plain network fetch
          FetchOutcome::Network(network.fetch(&request).await?)
        }
        EventOutcome::Fetched(outcome) => outcome,
        other => return Err(eyre!("Unexpected outcome for fetch: {:?}", other)),
      };
      print_fetch(&outcome)?;
      agent.cache().wait_for_writes().await;
    }
    Command::Enqueue { message } => {
      let payload = serde_json::from_str(&message)
        .map_err(|e| eyre!("Message must be valid JSON: {}", e))?;
      let id = agent.queue().enqueue(&payload)?;
      println!("queued #{}", id);
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| config.queue.sync_tag.clone());
      if let EventOutcome::Synced(report) = events.send(AgentEvent::Sync(tag.clone())).await? {
        match report {
          Some(r) if r.is_complete() && r.cleared => println!("synced {} message(s)", r.delivered),
          Some(r) => println!(
            "sync incomplete: {}/{} delivered, queue kept",
            r.delivered, r.queued
          ),
          None => println!("ignored sync tag {}", tag),
        }
      }
    }
    Command::Queue => {
      for message in agent.queue().pending() {
        println!(
          "#{} {} {}",
          message.id,
          message.queued_at.to_rfc3339(),
          message.payload
        );
      }
    }
    Command::Generations => {
      let store = agent.cache().store();
      let current = &agent.cache().policy().version;
      for name in store.generations()? {
        let marker = if &name == current { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, store.keys(&name)?.len());
      }
    }
  }

  Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String)> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| eyre!("Header must look like 'Name: value': {}", raw))?;
  Ok((name.trim().to_string(), value.trim().to_string()))
}

/// Status line to stderr, body to stdout.
fn print_fetch(outcome: &FetchOutcome) -> Result<()> {
  if let Some(response) = outcome.response() {
    eprintln!("{} ({})", response.status, outcome.source());
    std::io::stdout()
      .write_all(&response.body)
      .map_err(|e| eyre!("Failed to write body: {}", e))?;
  }
  Ok(())
}
