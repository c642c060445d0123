//! Core traits and types for the response cache.

use color_eyre::Result;

use crate::net::Response;

/// A stored request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  /// Request identity (see `Request::cache_key`)
  pub key: String,
  pub method: String,
  pub url: String,
  pub response: Response,
}

/// Trait for response cache backends.
///
/// The store holds any number of named generations; the manager decides
/// which one is current.
pub trait CacheStore: Send + Sync {
  /// Names of all generations, in creation order.
  fn generations(&self) -> Result<Vec<String>>;

  /// Delete a generation and every entry in it. Returns whether it existed.
  fn delete_generation(&self, generation: &str) -> Result<bool>;

  /// Look up a response by request key.
  fn lookup(&self, generation: &str, key: &str) -> Result<Option<Response>>;

  /// Store one entry, replacing any previous entry with the same key.
  fn put(&self, generation: &str, entry: &CacheEntry) -> Result<()>;

  /// Store a batch of entries atomically: either all land or none do.
  fn put_all(&self, generation: &str, entries: &[CacheEntry]) -> Result<()>;

  /// Request keys stored in a generation.
  fn keys(&self, generation: &str) -> Result<Vec<String>>;
}

/// Result of handling an intercepted fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Not intercepted; the host should perform its default network handling
  Passthrough,
  /// Served from the current generation
  Cached(Response),
  /// Fetched from the network
  Network(Response),
  /// Network failed on a navigation; serving the offline page
  Offline(Response),
}

impl FetchOutcome {
  pub fn response(&self) -> Option<&Response> {
    match self {
      Self::Passthrough => None,
      Self::Cached(r) | Self::Network(r) | Self::Offline(r) => Some(r),
    }
  }

  pub fn source(&self) -> &'static str {
    match self {
      Self::Passthrough => "passthrough",
      Self::Cached(_) => "cache",
      Self::Network(_) => "network",
      Self::Offline(_) => "offline",
    }
  }
}
