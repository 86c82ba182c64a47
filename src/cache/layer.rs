//! Cache layer that orchestrates the cache bucket lifecycle with network fetching.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use super::network::Network;
use super::storage::CacheStorage;
use super::traits::{
  CacheRequest, CacheResult, CachedEntry, CachedResponse, FetchOutcome, FetchPolicy,
};

/// Static configuration of a cache generation.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  /// Name of the current bucket; bumping it invalidates everything cached before
  pub cache_name: String,
  /// Origin that manifest paths are resolved against
  pub origin: Url,
  /// Paths pre-cached at install time
  pub manifest: Vec<String>,
  /// Path of the page served when both cache and network fail
  pub offline_page: String,
  pub policy: FetchPolicy,
}

/// Cache layer that manages the bucket lifecycle and resolves fetches.
///
/// This layer sits between the caller and the network, implementing
/// install / fetch / activate over a local bucket and a remote tier.
pub struct CacheLayer<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  settings: CacheSettings,
  manifest_urls: Vec<Url>,
  offline_url: Url,
  /// Background cache writes and revalidations that must finish before shutdown
  pending: Arc<Mutex<JoinSet<()>>>,
}

impl<S: CacheStorage, N: Network> CacheLayer<S, N> {
  /// Create a new cache layer with the given storage and network tiers.
  pub fn new(storage: S, network: N, settings: CacheSettings) -> Result<Self> {
    let manifest_urls = settings
      .manifest
      .iter()
      .map(|path| resolve_on_origin(&settings.origin, path))
      .collect::<Result<Vec<_>>>()?;
    let offline_url = resolve_on_origin(&settings.origin, &settings.offline_page)?;

    Ok(Self {
      storage: Arc::new(storage),
      network: Arc::new(network),
      settings,
      manifest_urls,
      offline_url,
      pending: Arc::new(Mutex::new(JoinSet::new())),
    })
  }

  pub fn settings(&self) -> &CacheSettings {
    &self.settings
  }

  /// Resolve a path against the origin. Paths that would leave the origin
  /// (`//host/x`, absolute URLs) are rejected.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    resolve_on_origin(&self.settings.origin, path)
  }

  /// Pre-populate the current bucket with every manifest asset.
  ///
  /// All assets are fetched before anything is written; if any of them fails
  /// (transport error or non-2xx status) the install fails and the bucket is
  /// left untouched.
  pub async fn install(&self) -> Result<usize> {
    let cache_name = &self.settings.cache_name;
    info!(cache = %cache_name, assets = self.manifest_urls.len(), "Installing cache");

    let entries = futures::future::try_join_all(self.manifest_urls.iter().map(|url| async move {
      let request = CacheRequest::get(url.clone());
      let response = self.network.fetch(&request).await?;
      if !response.is_ok() {
        return Err(eyre!(
          "Failed to install {}: server responded {}",
          url,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((request, response))
    }))
    .await
    .map_err(|e| {
      warn!(cache = %cache_name, error = %e, "Cache install failed");
      e
    })?;

    self.storage.put_all(cache_name, &entries)?;
    info!(cache = %cache_name, assets = entries.len(), "Cache installed");

    Ok(entries.len())
  }

  /// Delete every bucket whose name differs from the current cache name.
  ///
  /// Returns the names of the deleted buckets.
  pub fn activate(&self) -> Result<Vec<String>> {
    let cache_name = &self.settings.cache_name;
    let mut deleted = Vec::new();

    for name in self.storage.bucket_names()? {
      if &name == cache_name {
        continue;
      }
      if self.storage.delete_bucket(&name)? {
        info!(bucket = %name, "Deleted stale cache bucket");
        deleted.push(name);
      }
    }

    self.storage.open_bucket(cache_name)?;
    Ok(deleted)
  }

  /// Resolve an intercepted request according to the configured policy.
  ///
  /// Network failures never surface as errors: they fall back to the cache or
  /// the offline page. Only local storage failures are returned as `Err`.
  pub async fn fetch(&self, request: &CacheRequest) -> Result<FetchOutcome> {
    if !request.is_cacheable() {
      return match self.network.fetch(request).await {
        Ok(response) => Ok(FetchOutcome::Served(CacheResult::from_network(response))),
        Err(e) => {
          warn!(method = %request.method, url = %request.url, error = %e, "Network fetch failed");
          self.offline_fallback()
        }
      };
    }

    match self.settings.policy {
      FetchPolicy::CacheFirst => self.cache_first(request).await,
      FetchPolicy::NetworkFirst => self.network_first(request).await,
      FetchPolicy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
    }
  }

  /// Wait until every background cache write and revalidation has finished.
  pub async fn settle(&self) {
    loop {
      let mut pending = {
        let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *guard)
      };

      if pending.is_empty() {
        return;
      }

      while let Some(result) = pending.join_next().await {
        if let Err(e) = result {
          warn!(error = %e, "Background cache task failed");
        }
      }
    }
  }

  /// Entries of the current bucket.
  pub fn entries(&self) -> Result<Vec<CachedEntry>> {
    self.storage.entries(&self.settings.cache_name)
  }

  /// Names of all buckets in storage, current one included.
  pub fn bucket_names(&self) -> Result<Vec<String>> {
    self.storage.bucket_names()
  }

  async fn cache_first(&self, request: &CacheRequest) -> Result<FetchOutcome> {
    if let Some(entry) = self.lookup(request)? {
      debug!(url = %request.url, "Cache hit");
      return Ok(FetchOutcome::Served(CacheResult::from_cache(
        entry.response,
        entry.cached_at,
      )));
    }

    match self.network.fetch(request).await {
      Ok(response) => Ok(self.accept_network_response(request, response)),
      Err(e) => {
        warn!(url = %request.url, error = %e, "Network fetch failed, serving offline page");
        self.offline_fallback()
      }
    }
  }

  async fn network_first(&self, request: &CacheRequest) -> Result<FetchOutcome> {
    match self.network.fetch(request).await {
      Ok(response) => Ok(self.accept_network_response(request, response)),
      Err(e) => {
        if let Some(entry) = self.lookup(request)? {
          debug!(url = %request.url, error = %e, "Network fetch failed, serving cached copy");
          return Ok(FetchOutcome::Served(CacheResult::from_cache(
            entry.response,
            entry.cached_at,
          )));
        }
        warn!(url = %request.url, error = %e, "Network fetch failed, serving offline page");
        self.offline_fallback()
      }
    }
  }

  async fn stale_while_revalidate(&self, request: &CacheRequest) -> Result<FetchOutcome> {
    if let Some(entry) = self.lookup(request)? {
      debug!(url = %request.url, "Cache hit, revalidating in background");
      self.spawn_revalidate(request.clone());
      return Ok(FetchOutcome::Served(CacheResult::from_cache(
        entry.response,
        entry.cached_at,
      )));
    }

    self.cache_first(request).await
  }

  fn lookup(&self, request: &CacheRequest) -> Result<Option<CachedEntry>> {
    self
      .storage
      .match_request(&self.settings.cache_name, request)
  }

  /// Hand a network response back to the caller, storing a copy first if it is
  /// worth caching.
  fn accept_network_response(
    &self,
    request: &CacheRequest,
    response: CachedResponse,
  ) -> FetchOutcome {
    if response.is_valid_for_cache() {
      self.spawn_put(request.clone(), response.clone());
    } else {
      debug!(
        url = %request.url,
        status = response.status,
        response_type = response.response_type.as_str(),
        "Response not cacheable"
      );
    }
    FetchOutcome::Served(CacheResult::from_network(response))
  }

  fn offline_fallback(&self) -> Result<FetchOutcome> {
    let request = CacheRequest::get(self.offline_url.clone());
    match self.lookup(&request)? {
      Some(entry) => Ok(FetchOutcome::Served(CacheResult::offline(
        entry.response,
        entry.cached_at,
      ))),
      None => {
        warn!(page = %self.offline_url, "Offline page is not cached");
        Ok(FetchOutcome::Unavailable)
      }
    }
  }

  fn spawn_put(&self, request: CacheRequest, response: CachedResponse) {
    let storage = Arc::clone(&self.storage);
    let bucket = self.settings.cache_name.clone();
    self.track(store_in_background(storage, bucket, request, response));
  }

  fn spawn_revalidate(&self, request: CacheRequest) {
    let storage = Arc::clone(&self.storage);
    let network = Arc::clone(&self.network);
    let bucket = self.settings.cache_name.clone();

    self.track(async move {
      match network.fetch(&request).await {
        Ok(response) if response.is_valid_for_cache() => {
          store_in_background(storage, bucket, request, response).await;
        }
        Ok(response) => {
          debug!(
            url = %request.url,
            status = response.status,
            "Revalidation response not cacheable"
          );
        }
        Err(e) => {
          debug!(url = %request.url, error = %e, "Revalidation failed");
        }
      }
    });
  }

  fn track<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    pending.spawn(task);
  }
}

fn resolve_on_origin(origin: &Url, path: &str) -> Result<Url> {
  let url = origin
    .join(path)
    .map_err(|e| eyre!("Invalid path '{}': {}", path, e))?;
  if url.origin() != origin.origin() {
    return Err(eyre!("Path '{}' resolves outside of {}", path, origin));
  }
  Ok(url)
}

async fn store_in_background<S: CacheStorage>(
  storage: Arc<S>,
  bucket: String,
  request: CacheRequest,
  response: CachedResponse,
) {
  let url = request.url.clone();
  let result = tokio::task::spawn_blocking(move || storage.put(&bucket, &request, &response)).await;

  match result {
    Ok(Ok(())) => debug!(url = %url, "Stored response in cache"),
    Ok(Err(e)) => warn!(url = %url, error = %e, "Failed to store response in cache"),
    Err(e) => warn!(url = %url, error = %e, "Cache write task failed"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;
  use crate::cache::traits::{CacheSource, ResponseType};
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  const ORIGIN: &str = "http://localhost:5173";

  /// Network double serving canned responses by URL.
  #[derive(Clone, Default)]
  struct FakeNetwork {
    routes: Arc<Mutex<HashMap<String, CachedResponse>>>,
    offline: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
  }

  impl FakeNetwork {
    fn serve(&self, path: &str, status: u16, response_type: ResponseType, body: &str) {
      let url = Url::parse(ORIGIN).unwrap().join(path).unwrap();
      self.routes.lock().unwrap().insert(
        url.to_string(),
        CachedResponse {
          status,
          headers: vec![("content-type".to_string(), "text/html".to_string())],
          body: body.as_bytes().to_vec(),
          response_type,
        },
      );
    }

    fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Network for FakeNetwork {
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("network unreachable"));
      }
      let routes = self.routes.lock().unwrap();
      Ok(routes.get(request.url.as_str()).cloned().unwrap_or(CachedResponse {
        status: 404,
        headers: Vec::new(),
        body: b"not found".to_vec(),
        response_type: ResponseType::Basic,
      }))
    }
  }

  fn settings(policy: FetchPolicy) -> CacheSettings {
    CacheSettings {
      cache_name: "todo-app-cache-v2".to_string(),
      origin: Url::parse(ORIGIN).unwrap(),
      manifest: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/offline.html".to_string(),
      ],
      offline_page: "/offline.html".to_string(),
      policy,
    }
  }

  fn serve_manifest(network: &FakeNetwork) {
    network.serve("/", 200, ResponseType::Basic, "root");
    network.serve("/index.html", 200, ResponseType::Basic, "index");
    network.serve("/offline.html", 200, ResponseType::Basic, "you are offline");
  }

  fn layer(policy: FetchPolicy) -> (CacheLayer<SqliteStorage, FakeNetwork>, FakeNetwork) {
    let network = FakeNetwork::default();
    let storage = SqliteStorage::open_in_memory().unwrap();
    let layer = CacheLayer::new(storage, network.clone(), settings(policy)).unwrap();
    (layer, network)
  }

  fn get(path: &str) -> CacheRequest {
    CacheRequest::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
  }

  fn body(outcome: &FetchOutcome) -> String {
    String::from_utf8(outcome.response().unwrap().body.clone()).unwrap()
  }

  #[tokio::test]
  async fn test_manifest_asset_served_from_cache_after_install() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    serve_manifest(&network);

    assert_eq!(layer.install().await.unwrap(), 3);
    let calls = network.calls();

    let outcome = layer.fetch(&get("/index.html")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Cache));
    assert_eq!(body(&outcome), "index");
    assert_eq!(network.calls(), calls);
  }

  #[tokio::test]
  async fn test_install_is_atomic() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    network.serve("/", 200, ResponseType::Basic, "root");
    network.serve("/offline.html", 200, ResponseType::Basic, "offline");
    // /index.html is missing and answers 404

    assert!(layer.install().await.is_err());
    assert!(layer.entries().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_fails_when_network_is_down() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    serve_manifest(&network);
    network.set_offline(true);

    assert!(layer.install().await.is_err());
    assert!(layer.entries().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_miss_is_cached_for_offline_use() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    network.serve("/todo.png", 200, ResponseType::Basic, "png");

    let outcome = layer.fetch(&get("/todo.png")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Network));
    layer.settle().await;

    network.set_offline(true);
    let outcome = layer.fetch(&get("/todo.png")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Cache));
    assert_eq!(body(&outcome), "png");
  }

  #[tokio::test]
  async fn test_invalid_responses_are_returned_but_not_cached() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    network.serve("/cdn.js", 200, ResponseType::Cors, "cross");
    network.serve("/moved", 301, ResponseType::Basic, "");

    let outcome = layer.fetch(&get("/cdn.js")).await.unwrap();
    assert_eq!(body(&outcome), "cross");
    let outcome = layer.fetch(&get("/moved")).await.unwrap();
    assert_eq!(outcome.response().unwrap().status, 301);
    let outcome = layer.fetch(&get("/missing")).await.unwrap();
    assert_eq!(outcome.response().unwrap().status, 404);

    layer.settle().await;
    assert!(layer.entries().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_offline_page_served_when_everything_fails() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    serve_manifest(&network);
    layer.install().await.unwrap();
    network.set_offline(true);

    let outcome = layer.fetch(&get("/never-seen")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Offline));
    assert_eq!(body(&outcome), "you are offline");
  }

  #[tokio::test]
  async fn test_unavailable_without_offline_page() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    network.set_offline(true);

    let outcome = layer.fetch(&get("/anything")).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Unavailable));
  }

  #[tokio::test]
  async fn test_activate_purges_other_buckets() {
    let network = FakeNetwork::default();
    serve_manifest(&network);
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("todo-app-cache-v1", &get("/index.html"), &CachedResponse {
        status: 200,
        headers: Vec::new(),
        body: b"old".to_vec(),
        response_type: ResponseType::Basic,
      })
      .unwrap();

    let layer = CacheLayer::new(storage, network, settings(FetchPolicy::CacheFirst)).unwrap();
    layer.install().await.unwrap();

    let deleted = layer.activate().unwrap();
    assert_eq!(deleted, vec!["todo-app-cache-v1".to_string()]);
    assert_eq!(
      layer.bucket_names().unwrap(),
      vec!["todo-app-cache-v2".to_string()]
    );
    assert_eq!(layer.entries().unwrap().len(), 3);

    // Second activation has nothing left to purge
    assert!(layer.activate().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_network_first_prefers_network_then_cache() {
    let (layer, network) = layer(FetchPolicy::NetworkFirst);
    serve_manifest(&network);
    layer.install().await.unwrap();
    network.serve("/index.html", 200, ResponseType::Basic, "index v2");

    let outcome = layer.fetch(&get("/index.html")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Network));
    assert_eq!(body(&outcome), "index v2");
    layer.settle().await;

    network.set_offline(true);
    let outcome = layer.fetch(&get("/index.html")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Cache));
    assert_eq!(body(&outcome), "index v2");

    let outcome = layer.fetch(&get("/unknown")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Offline));
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_refreshes_in_background() {
    let (layer, network) = layer(FetchPolicy::StaleWhileRevalidate);
    serve_manifest(&network);
    layer.install().await.unwrap();
    network.serve("/index.html", 200, ResponseType::Basic, "index v2");

    let outcome = layer.fetch(&get("/index.html")).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Cache));
    assert_eq!(body(&outcome), "index");

    layer.settle().await;
    let outcome = layer.fetch(&get("/index.html")).await.unwrap();
    assert_eq!(body(&outcome), "index v2");
  }

  #[tokio::test]
  async fn test_non_get_requests_bypass_cache() {
    let (layer, network) = layer(FetchPolicy::CacheFirst);
    network.serve("/api/tasks", 200, ResponseType::Basic, "created");

    let mut request = get("/api/tasks");
    request.method = "POST".to_string();
    let outcome = layer.fetch(&request).await.unwrap();
    assert_eq!(outcome.source(), Some(CacheSource::Network));

    layer.settle().await;
    assert!(layer.entries().unwrap().is_empty());
  }

  #[test]
  fn test_resolve_stays_on_origin() {
    let (layer, _) = layer(FetchPolicy::CacheFirst);
    assert_eq!(
      layer.resolve("/src/App.tsx?v=2").unwrap().as_str(),
      "http://localhost:5173/src/App.tsx?v=2"
    );
    assert!(layer.resolve("//169.254.169.254/latest/meta-data").is_err());
    assert!(layer.resolve("http://other.host/x").is_err());
    assert!(layer.resolve("https://localhost:5173/x").is_err());
  }

  #[test]
  fn test_foreign_manifest_entry_is_rejected() {
    let mut settings = settings(FetchPolicy::CacheFirst);
    settings.manifest.push("//cdn.example.com/lib.js".to_string());
    let result = CacheLayer::new(
      SqliteStorage::open_in_memory().unwrap(),
      FakeNetwork::default(),
      settings,
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_invalid_manifest_path_is_rejected() {
    let mut settings = settings(FetchPolicy::CacheFirst);
    settings.origin = Url::parse("mailto:someone@example.com").unwrap();
    let result = CacheLayer::new(
      SqliteStorage::open_in_memory().unwrap(),
      FakeNetwork::default(),
      settings,
    );
    assert!(result.is_err());
  }
}
