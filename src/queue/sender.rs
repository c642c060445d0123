//! HTTP delivery of queued messages.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::traits::MessageSender;

/// Posts each message as JSON to the ingestion endpoint.
#[derive(Clone)]
pub struct HttpSender {
  client: reqwest::Client,
  endpoint: Url,
}

impl HttpSender {
  pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
    Self { client, endpoint }
  }
}

#[async_trait]
impl MessageSender for HttpSender {
  async fn send(&self, payload: &Value) -> Result<Option<Value>> {
    let response = self
      .client
      .post(self.endpoint.clone())
      .json(payload)
      .send()
      .await
      .map_err(|e| {
        warn!(error = %e, "Message sync failed");
        eyre!("Failed to send message: {}", e)
      })?;

    let status = response.status();
    if !status.is_success() {
      warn!(status = status.as_u16(), "Message sync failed");
      return Err(eyre!("Failed to send: endpoint returned {}", status));
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read send response: {}", e))?;

    if body.iter().all(|b| b.is_ascii_whitespace()) {
      debug!(status = status.as_u16(), "Message delivered");
      return Ok(None);
    }

    let decoded = serde_json::from_slice(&body).map_err(|e| {
      warn!(error = %e, "Message sync failed: response is not JSON");
      eyre!("Failed to parse send response: {}", e)
    })?;

    debug!(status = status.as_u16(), "Message delivered");
    Ok(Some(decoded))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::Matcher;
  use serde_json::json;

  async fn sender(server: &mockito::ServerGuard) -> HttpSender {
    let endpoint = Url::parse(&server.url())
      .unwrap()
      .join("/api/messages")
      .unwrap();
    HttpSender::new(reqwest::Client::new(), endpoint)
  }

  #[tokio::test]
  async fn test_send_posts_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/api/messages")
      .match_header("content-type", "application/json")
      .match_body(Matcher::Json(json!({"room": "lobby", "text": "hi"})))
      .with_status(201)
      .with_body(r#"{"id": 7}"#)
      .create_async()
      .await;

    let result = sender(&server)
      .await
      .send(&json!({"room": "lobby", "text": "hi"}))
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(result, Some(json!({"id": 7})));
  }

  #[tokio::test]
  async fn test_empty_body_is_accepted() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/messages")
      .with_status(204)
      .create_async()
      .await;

    let result = sender(&server).await.send(&json!("x")).await.unwrap();
    assert_eq!(result, None);
  }

  #[tokio::test]
  async fn test_error_status_fails() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/messages")
      .with_status(500)
      .with_body(r#"{"error": "down"}"#)
      .create_async()
      .await;

    assert!(sender(&server).await.send(&json!("x")).await.is_err());
  }

  #[tokio::test]
  async fn test_non_json_body_fails() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/messages")
      .with_status(200)
      .with_body("<html>ok</html>")
      .create_async()
      .await;

    assert!(sender(&server).await.send(&json!("x")).await.is_err());
  }
}
