//! Core types for the offline cache: requests, responses, policies and results.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// How a request is resolved between the local cache tier and the network tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
  /// Serve from cache when present; only consult the network on a miss
  #[default]
  CacheFirst,
  /// Prefer the network; fall back to the cache when the network fails
  NetworkFirst,
  /// Serve from cache immediately and refresh the entry in the background
  StaleWhileRevalidate,
}

/// Classification of a network response, mirroring the fetch response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response (including same-origin requests redirected off-origin)
  Cors,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(Self::Basic),
      "cors" => Ok(Self::Cors),
      other => Err(eyre!("Unknown response type '{}'", other)),
    }
  }
}

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CacheRequest {
  /// A plain GET with no headers or body.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  /// Only GET requests are looked up in or written to the cache.
  pub fn is_cacheable(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// Stable storage key derived from the request identity (method + URL).
  pub fn cache_key(&self) -> String {
    let input = format!("{} {}", self.method.to_uppercase(), self.url);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A captured response, either fresh from the network or read back from a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub response_type: ResponseType,
}

impl CachedResponse {
  /// Whether the status is in the 2xx range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only complete same-origin responses are worth keeping: errors, redirects
  /// and cross-origin responses pass through uncached.
  pub fn is_valid_for_cache(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// A stored cache entry with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub method: String,
  pub url: String,
  pub response: CachedResponse,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for the offline fallback page.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Network response
  Network,
  /// Stored response for the same request
  Cache,
  /// Network unavailable, serving the offline fallback page
  Offline,
}

impl CacheSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Network => "miss",
      Self::Cache => "hit",
      Self::Offline => "offline",
    }
  }
}

/// Outcome of an intercepted fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// A response to hand back to the caller
  Served(CacheResult<CachedResponse>),
  /// Network failed and no offline page is cached
  Unavailable,
}

impl FetchOutcome {
  pub fn response(&self) -> Option<&CachedResponse> {
    match self {
      Self::Served(result) => Some(&result.data),
      Self::Unavailable => None,
    }
  }

  pub fn source(&self) -> Option<CacheSource> {
    match self {
      Self::Served(result) => Some(result.source),
      Self::Unavailable => None,
    }
  }
}
