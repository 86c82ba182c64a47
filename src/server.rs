//! Local caching reverse proxy: every request is resolved through the cache layer.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{error, info};

use crate::cache::{
  CacheLayer, CacheRequest, CacheSource, CacheStorage, CachedResponse, FetchOutcome, Network,
};

/// Response header telling the client how the request was resolved
pub const CACHE_HEADER: &str = "x-tasklet-cache";

/// Largest request body forwarded upstream
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
  "connection",
  "keep-alive",
  "proxy-authenticate",
  "proxy-authorization",
  "te",
  "trailer",
  "transfer-encoding",
  "upgrade",
  "content-length",
];

/// Install the cache, purge stale buckets, then proxy until Ctrl-C.
///
/// A failed install aborts startup.
pub async fn serve<S: CacheStorage, N: Network>(
  layer: CacheLayer<S, N>,
  listen: &str,
) -> Result<()> {
  layer.install().await?;
  let deleted = layer.activate()?;
  if !deleted.is_empty() {
    info!(buckets = ?deleted, "Purged stale cache buckets");
  }

  let layer = Arc::new(layer);
  let listener = tokio::net::TcpListener::bind(listen)
    .await
    .map_err(|e| eyre!("Failed to listen on {}: {}", listen, e))?;

  info!(
    listen = %listen,
    origin = %layer.settings().origin,
    policy = ?layer.settings().policy,
    "Proxy ready"
  );

  axum::serve(listener, router(Arc::clone(&layer)))
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .map_err(|e| eyre!("Proxy server failed: {}", e))?;

  // Let in-flight cache writes land before exiting
  layer.settle().await;
  Ok(())
}

pub fn router<S: CacheStorage, N: Network>(layer: Arc<CacheLayer<S, N>>) -> Router {
  Router::new().fallback(proxy::<S, N>).with_state(layer)
}

async fn proxy<S: CacheStorage, N: Network>(
  State(layer): State<Arc<CacheLayer<S, N>>>,
  request: Request,
) -> Response {
  let (parts, body) = request.into_parts();

  let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
    Ok(body) => body,
    Err(e) => {
      return (StatusCode::BAD_REQUEST, format!("Failed to read body: {}", e)).into_response()
    }
  };

  let path = parts
    .uri
    .path_and_query()
    .map(|p| p.as_str())
    .unwrap_or("/");
  let url = match layer.resolve(path) {
    Ok(url) => url,
    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
  };

  let request = CacheRequest {
    method: parts.method.to_string(),
    url,
    headers: forwarded_request_headers(&parts.headers),
    body: body.to_vec(),
  };

  match layer.fetch(&request).await {
    Ok(FetchOutcome::Served(result)) => into_response(result.data, result.source),
    Ok(FetchOutcome::Unavailable) => (
      StatusCode::SERVICE_UNAVAILABLE,
      [(CACHE_HEADER, CacheSource::Offline.as_str())],
      "Offline and no cached copy is available",
    )
      .into_response(),
    Err(e) => {
      error!(url = %request.url, error = %e, "Cache lookup failed");
      (StatusCode::INTERNAL_SERVER_ERROR, "Cache error").into_response()
    }
  }
}

fn is_hop_by_hop(name: &str) -> bool {
  HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Headers sent upstream. `host` follows the origin URL and the HTTP client
/// negotiates its own encoding, so cached bodies are always decoded.
fn forwarded_request_headers(headers: &HeaderMap) -> Vec<(String, String)> {
  headers
    .iter()
    .filter(|(name, _)| {
      let name = name.as_str();
      !is_hop_by_hop(name) && name != "host" && name != "accept-encoding"
    })
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_string(), v.to_string()))
    })
    .collect()
}

fn into_response(response: CachedResponse, source: CacheSource) -> Response {
  let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

  let mut headers = HeaderMap::new();
  for (name, value) in &response.headers {
    if is_hop_by_hop(name) {
      continue;
    }
    if let (Ok(name), Ok(value)) = (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(value),
    ) {
      headers.append(name, value);
    }
  }
  headers.insert(CACHE_HEADER, HeaderValue::from_static(source.as_str()));

  (status, headers, Body::from(response.body)).into_response()
}
