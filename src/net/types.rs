use sha2::{Digest, Sha256};
use url::Url;

/// How the page issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Top-level document navigation
  Navigate,
  #[default]
  SameOrigin,
  Cors,
  NoCors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub mode: RequestMode,
  /// Forwarded as-is when the request goes to the network
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      mode: RequestMode::SameOrigin,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// Whether the request targets `origin`.
  pub fn is_same_origin(&self, origin: &Url) -> bool {
    self.url.origin() == origin.origin()
  }

  /// Stable cache identity: upper-cased method and the URL without fragment.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    let input = format!("{} {}", self.method.to_ascii_uppercase(), url);

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Response tainting, as seen by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response with full access
  Basic,
  /// Cross-origin response shared via CORS
  Cors,
  /// Cross-origin response whose status and body are hidden
  Opaque,
}

/// A response, either from the network or the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub kind: ResponseType,
  pub redirected: bool,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  /// Only plain 200 same-origin, non-redirected responses go into the cache.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseType::Basic && !self.redirected
  }
}

#[cfg(test)]
impl Request {
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }
}

#[cfg(test)]
impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      kind: ResponseType::Basic,
      redirected: false,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_kind(mut self, kind: ResponseType) -> Self {
    self.kind = kind;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_cache_key_ignores_fragment_and_method_case() {
    let a = Request::get(url("http://localhost:8080/app.js#x"));
    let mut b = Request::get(url("http://localhost:8080/app.js"));
    b.method = "get".to_string();
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_cache_key_distinguishes_method_and_query() {
    let get = Request::get(url("http://localhost:8080/api/messages"));
    let mut post = get.clone();
    post.method = "POST".to_string();
    let query = Request::get(url("http://localhost:8080/api/messages?page=2"));

    assert_ne!(get.cache_key(), post.cache_key());
    assert_ne!(get.cache_key(), query.cache_key());
  }

  #[test]
  fn test_same_origin_requires_scheme_host_and_port() {
    let origin = url("http://localhost:8080");
    assert!(Request::get(url("http://localhost:8080/x")).is_same_origin(&origin));
    assert!(!Request::get(url("http://localhost:9090/x")).is_same_origin(&origin));
    assert!(!Request::get(url("https://localhost:8080/x")).is_same_origin(&origin));
    assert!(!Request::get(url("http://cdn.example/x")).is_same_origin(&origin));
  }

  #[test]
  fn test_cacheable_responses() {
    assert!(Response::new(200, "ok").is_cacheable());
    assert!(!Response::new(404, "missing").is_cacheable());
    assert!(!Response::new(204, "").is_cacheable());
    assert!(!Response::new(200, "").with_kind(ResponseType::Opaque).is_cacheable());
    assert!(!Response::new(200, "").with_kind(ResponseType::Cors).is_cacheable());

    let mut redirected = Response::new(200, "ok");
    redirected.redirected = true;
    assert!(!redirected.is_cacheable());
  }
}
