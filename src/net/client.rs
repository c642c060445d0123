//! Network access through reqwest.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::time::Duration;
use url::Url;

use super::types::{Request, Response, ResponseType};

/// Anything that can perform a network fetch on behalf of the agent.
#[async_trait]
pub trait Network: Send + Sync {
  /// Perform the request. `Err` means the fetch itself failed (no response).
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `Network` backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  pub fn client(&self) -> &reqwest::Client {
    &self.client
  }

  fn classify(&self, final_url: &Url) -> ResponseType {
    if final_url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    }
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let resp = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = resp.status().as_u16();
    let redirected = resp.url() != &request.url;
    let kind = self.classify(resp.url());
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status,
      kind,
      redirected,
      headers,
      body: body.to_vec(),
    })
  }
}
