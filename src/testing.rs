//! Test doubles for the network and the message endpoint.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::net::{Network, Request, Response};
use crate::queue::MessageSender;

/// Network with canned responses; unknown URLs fail like a dropped connection.
#[derive(Default)]
pub struct MockNetwork {
  responses: HashMap<Url, Response>,
  calls: AtomicUsize,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, url: Url, response: Response) -> Self {
    self.responses.insert(url, response);
    self
  }

  /// Number of fetches performed so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .responses
      .get(&request.url)
      .cloned()
      .ok_or_else(|| eyre!("network unreachable: {}", request.url))
  }
}

/// Sender that accepts everything except one poisoned payload.
#[derive(Default)]
pub struct ScriptedSender {
  fail_on: Mutex<Option<Value>>,
  sent: Mutex<Vec<Value>>,
  attempts: AtomicUsize,
}

impl ScriptedSender {
  pub fn accepting() -> Self {
    Self::default()
  }

  pub fn failing_on(payload: Value) -> Self {
    Self {
      fail_on: Mutex::new(Some(payload)),
      ..Self::default()
    }
  }

  /// Stop failing.
  pub fn recover(&self) {
    *self.fail_on.lock().unwrap() = None;
  }

  /// Payloads accepted so far, in order.
  pub fn sent(&self) -> Vec<Value> {
    self.sent.lock().unwrap().clone()
  }

  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl MessageSender for ScriptedSender {
  async fn send(&self, payload: &Value) -> Result<Option<Value>> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    if self.fail_on.lock().unwrap().as_ref() == Some(payload) {
      return Err(eyre!("endpoint returned 503"));
    }
    self.sent.lock().unwrap().push(payload.clone());
    Ok(None)
  }
}
