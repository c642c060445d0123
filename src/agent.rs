//! The offline agent: one handler per lifecycle or traffic event.

use async_trait::async_trait;
use color_eyre::Result;
use tracing::debug;

use crate::cache::{ActivateReport, CacheManager, FetchOutcome, InstallReport};
use crate::net::{Network, Request};
use crate::queue::{FlushReport, MessageQueue, MessageSender};

/// Event handlers the host runtime dispatches to.
///
/// The host owns event delivery; implementors own only the policy.
#[async_trait]
pub trait Interceptor: Send + Sync {
  async fn on_install(&self) -> Result<InstallReport>;

  async fn on_activate(&self) -> Result<ActivateReport>;

  async fn on_fetch(&self, request: Request) -> Result<FetchOutcome>;

  /// Returns `None` when the tag is not one this agent handles.
  async fn on_sync(&self, tag: &str) -> Option<FlushReport>;
}

/// Interceptor combining the response cache and the outbound queue.
///
/// The two halves share no state.
pub struct OfflineAgent<N: Network, S: MessageSender> {
  cache: CacheManager<N>,
  queue: MessageQueue<S>,
  sync_tag: String,
}

impl<N: Network, S: MessageSender> OfflineAgent<N, S> {
  pub fn new(cache: CacheManager<N>, queue: MessageQueue<S>, sync_tag: impl Into<String>) -> Self {
    Self {
      cache,
      queue,
      sync_tag: sync_tag.into(),
    }
  }

  pub fn cache(&self) -> &CacheManager<N> {
    &self.cache
  }

  pub fn queue(&self) -> &MessageQueue<S> {
    &self.queue
  }
}

#[async_trait]
impl<N: Network, S: MessageSender> Interceptor for OfflineAgent<N, S> {
  async fn on_install(&self) -> Result<InstallReport> {
    self.cache.install().await
  }

  async fn on_activate(&self) -> Result<ActivateReport> {
    self.cache.activate().await
  }

  async fn on_fetch(&self, request: Request) -> Result<FetchOutcome> {
    self.cache.handle_fetch(&request).await
  }

  async fn on_sync(&self, tag: &str) -> Option<FlushReport> {
    if tag != self.sync_tag {
      debug!(tag, "Ignoring sync event");
      return None;
    }
    Some(self.queue.flush().await)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CachePolicy, SqliteCacheStore};
  use crate::net::Response;
  use crate::queue::SqliteQueueStore;
  use crate::testing::{MockNetwork, ScriptedSender};
  use serde_json::json;
  use std::sync::Arc;
  use url::Url;

  fn agent(network: MockNetwork) -> OfflineAgent<MockNetwork, ScriptedSender> {
    let origin = Url::parse("http://localhost:8080").unwrap();
    let cache = CacheManager::new(
      Arc::new(SqliteCacheStore::open_in_memory().unwrap()),
      Arc::new(network),
      CachePolicy {
        origin,
        version: "drawchat-v1".to_string(),
        assets: vec!["/offline-page.html".to_string()],
        offline_page: "/offline-page.html".to_string(),
      },
    );
    let queue = MessageQueue::new(
      Arc::new(SqliteQueueStore::open_in_memory().unwrap()),
      Arc::new(ScriptedSender::accepting()),
    );
    OfflineAgent::new(cache, queue, "sync-messages")
  }

  #[tokio::test]
  async fn test_sync_with_matching_tag_flushes() {
    let agent = agent(MockNetwork::new());
    agent.queue().enqueue(&json!({"text": "hi"})).unwrap();

    let report = agent.on_sync("sync-messages").await.unwrap();

    assert_eq!(report.delivered, 1);
    assert!(agent.queue().pending().is_empty());
  }

  #[tokio::test]
  async fn test_sync_with_other_tag_is_ignored() {
    let agent = agent(MockNetwork::new());
    agent.queue().enqueue(&json!({"text": "hi"})).unwrap();

    assert!(agent.on_sync("sync-drawings").await.is_none());
    assert_eq!(agent.queue().pending().len(), 1);
  }

  #[tokio::test]
  async fn test_lifecycle_then_offline_navigation() {
    let page = Url::parse("http://localhost:8080/offline-page.html").unwrap();
    let agent = agent(MockNetwork::new().respond(page, Response::new(200, "offline")));

    agent.on_install().await.unwrap();
    agent.on_activate().await.unwrap();

    let nav = Request::navigate(Url::parse("http://localhost:8080/lobby").unwrap());
    let outcome = agent.on_fetch(nav).await.unwrap();
    assert_eq!(outcome, FetchOutcome::Offline(Response::new(200, "offline")));
  }
}
