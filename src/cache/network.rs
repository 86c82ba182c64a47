//! Remote tier: the network client the cache layer falls through to.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;
use url::Url;

use super::traits::{CacheRequest, CachedResponse, ResponseType};

/// Trait for the remote tier behind the cache.
pub trait Network: Send + Sync + 'static {
  /// Perform the request. An `Err` means no response was received at all
  /// (offline, DNS failure, connection reset, timeout); HTTP error statuses
  /// are returned as `Ok` responses.
  fn fetch(&self, request: &CacheRequest) -> impl Future<Output = Result<CachedResponse>> + Send;
}

/// HTTP network tier backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  /// Create a client for `origin`. Without a timeout a hung request blocks its
  /// fetch indefinitely.
  pub fn new(origin: Url, timeout: Option<Duration>) -> Result<Self> {
    let mut builder =
      reqwest::Client::builder().user_agent(concat!("tasklet/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let response_type = classify(&self.origin, response.url());
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    Ok(CachedResponse {
      status,
      headers,
      body,
      response_type,
    })
  }
}

/// A response is same-origin ("basic") when the URL it was finally served
/// from, after redirects, shares the configured origin.
fn classify(origin: &Url, final_url: &Url) -> ResponseType {
  if final_url.origin() == origin.origin() {
    ResponseType::Basic
  } else {
    ResponseType::Cors
  }
}
