use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::agent::Interceptor;
use crate::cache::{ActivateReport, FetchOutcome, InstallReport};
use crate::net::Request;
use crate::queue::FlushReport;

/// Events the host delivers to the agent
#[derive(Debug)]
pub enum AgentEvent {
  Install,
  Activate,
  Fetch(Request),
  /// Reconnect signal carrying a tag
  Sync(String),
}

/// What the agent produced for an event
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Fetched(FetchOutcome),
  /// `None` when the tag was not handled
  Synced(Option<FlushReport>),
}

type Envelope = (AgentEvent, oneshot::Sender<Result<EventOutcome>>);

/// Host-side dispatcher: each event runs as its own task against the interceptor
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl EventHandler {
  /// Start dispatching to `interceptor`
  pub fn new<I: Interceptor + 'static>(interceptor: Arc<I>) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    tokio::spawn(async move {
      while let Some((event, reply)) = rx.recv().await {
        let interceptor = Arc::clone(&interceptor);
        tokio::spawn(async move {
          let outcome = dispatch(interceptor.as_ref(), event).await;
          // Caller may have stopped waiting
          let _ = reply.send(outcome);
        });
      }
    });

    Self { tx }
  }

  /// Deliver an event and wait for the agent's answer
  pub async fn send(&self, event: AgentEvent) -> Result<EventOutcome> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send((event, reply_tx))
      .map_err(|_| eyre!("Event loop has stopped"))?;

    reply_rx
      .await
      .map_err(|_| eyre!("Event handler dropped without replying"))?
  }
}

async fn dispatch<I: Interceptor + ?Sized>(interceptor: &I, event: AgentEvent) -> Result<EventOutcome> {
  match event {
    AgentEvent::Install => interceptor.on_install().await.map(EventOutcome::Installed),
    AgentEvent::Activate => interceptor.on_activate().await.map(EventOutcome::Activated),
    AgentEvent::Fetch(request) => interceptor.on_fetch(request).await.map(EventOutcome::Fetched),
    AgentEvent::Sync(tag) => Ok(EventOutcome::Synced(interceptor.on_sync(&tag).await)),
  }
}
