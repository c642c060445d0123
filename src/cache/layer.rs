//! Cache policy: generation lifecycle and cache-first fetch handling.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::traits::{CacheEntry, CacheStore, FetchOutcome};
use crate::net::{Network, Request, Response};

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub generation: String,
  /// Number of distinct entries written
  pub entries: usize,
  /// The new instance should take over without waiting for old ones
  pub skip_waiting: bool,
}

/// Outcome of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
  pub current: String,
  /// Generations removed, in store order
  pub deleted: Vec<String>,
  /// Already-open pages should be controlled immediately
  pub claim_clients: bool,
}

/// Settings for the cache manager.
#[derive(Debug, Clone)]
pub struct CachePolicy {
  pub origin: Url,
  pub version: String,
  pub assets: Vec<String>,
  pub offline_page: String,
}

/// Serves intercepted requests cache-first and manages cache generations.
///
/// Only the generation named by `CachePolicy::version` is ever read or
/// written. Writes triggered by network fetches happen in the background
/// and are not part of the response's success.
pub struct CacheManager<N: Network> {
  store: Arc<dyn CacheStore>,
  network: Arc<N>,
  policy: CachePolicy,
  pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl<N: Network> CacheManager<N> {
  pub fn new(store: Arc<dyn CacheStore>, network: Arc<N>, policy: CachePolicy) -> Self {
    Self {
      store,
      network,
      policy,
      pending_writes: Mutex::new(Vec::new()),
    }
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  pub fn store(&self) -> &Arc<dyn CacheStore> {
    &self.store
  }

  fn resolve(&self, path: &str) -> Result<Url> {
    self
      .policy
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid asset path {}: {}", path, e))
  }

  /// Fetch every manifest asset and store them as the current generation.
  ///
  /// All fetches must succeed with a cacheable response before anything is
  /// written, and the write is a single transaction.
  pub async fn install(&self) -> Result<InstallReport> {
    let generation = &self.policy.version;
    info!(generation = %generation, assets = self.policy.assets.len(), "Installing");

    let requests = self
      .policy
      .assets
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let fetches = requests.iter().map(|request| async move {
      let response = self.network.fetch(request).await?;
      if !response.is_cacheable() {
        return Err(eyre!(
          "Asset {} returned status {} ({:?})",
          request.url,
          response.status,
          response.kind
        ));
      }
      Ok::<_, color_eyre::Report>(CacheEntry {
        key: request.cache_key(),
        method: request.method.clone(),
        url: request.url.to_string(),
        response,
      })
    });

    let mut entries = try_join_all(fetches)
      .await
      .map_err(|e| eyre!("Install of {} aborted: {}", generation, e))?;

    // Duplicate manifest paths collapse onto one key
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries.dedup_by(|a, b| a.key == b.key);

    self.store.put_all(generation, &entries)?;

    info!(generation = %generation, entries = entries.len(), "Install complete");

    Ok(InstallReport {
      generation: generation.clone(),
      entries: entries.len(),
      skip_waiting: true,
    })
  }

  /// Delete every generation other than the current one.
  ///
  /// Fails without touching the store if the current generation was never
  /// installed, so a failed install leaves the previous generation in force.
  pub async fn activate(&self) -> Result<ActivateReport> {
    let current = &self.policy.version;
    let generations = self.store.generations()?;
    if !generations.contains(current) {
      return Err(eyre!("Generation {} is not installed", current));
    }

    let mut deleted = Vec::new();
    for name in generations {
      if &name != current {
        self.store.delete_generation(&name)?;
        info!(generation = %name, "Deleted stale cache generation");
        deleted.push(name);
      }
    }

    Ok(ActivateReport {
      current: current.clone(),
      deleted,
      claim_clients: true,
    })
  }

  /// Handle an intercepted request.
  ///
  /// 1. Cross-origin requests are not intercepted
  /// 2. Cached GET responses are served without touching the network
  /// 3. Otherwise fetch; cacheable responses are written in the background
  /// 4. On network failure, navigations get the offline page; anything else fails
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome> {
    if !request.is_same_origin(&self.policy.origin) {
      debug!(url = %request.url, "Cross-origin request, not intercepting");
      return Ok(FetchOutcome::Passthrough);
    }

    if request.is_get() {
      if let Some(cached) = self.lookup(request) {
        debug!(url = %request.url, "Serving from cache");
        return Ok(FetchOutcome::Cached(cached));
      }
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if request.is_get() && response.is_cacheable() {
          self.store_in_background(request, response.clone());
        }
        Ok(FetchOutcome::Network(response))
      }
      Err(e) => {
        if request.is_navigation() {
          if let Some(page) = self.offline_page() {
            warn!(url = %request.url, error = %e, "Network failed, serving offline page");
            return Ok(FetchOutcome::Offline(page));
          }
        }
        Err(e)
      }
    }
  }

  /// Cache read; a store error counts as a miss.
  fn lookup(&self, request: &Request) -> Option<Response> {
    match self
      .store
      .lookup(&self.policy.version, &request.cache_key())
    {
      Ok(found) => found,
      Err(e) => {
        warn!(url = %request.url, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  fn offline_page(&self) -> Option<Response> {
    let url = self.resolve(&self.policy.offline_page).ok()?;
    self.lookup(&Request::get(url))
  }

  fn store_in_background(&self, request: &Request, response: Response) {
    let store = Arc::clone(&self.store);
    let generation = self.policy.version.clone();
    let entry = CacheEntry {
      key: request.cache_key(),
      method: request.method.to_ascii_uppercase(),
      url: request.url.to_string(),
      response,
    };

    let handle = tokio::task::spawn_blocking(move || {
      if let Err(e) = store.put(&generation, &entry) {
        warn!(url = %entry.url, error = %e, "Failed to cache response");
      }
    });

    match self.pending_writes.lock() {
      Ok(mut pending) => {
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
      }
      Err(e) => warn!(error = %e, "Lost track of background cache write"),
    }
  }

  /// Wait for every background cache write started so far.
  pub async fn wait_for_writes(&self) {
    let handles = match self.pending_writes.lock() {
      Ok(mut pending) => std::mem::take(&mut *pending),
      Err(_) => Vec::new(),
    };

    for handle in handles {
      if let Err(e) = handle.await {
        warn!(error = %e, "Background cache write panicked");
      }
    }
  }
}
