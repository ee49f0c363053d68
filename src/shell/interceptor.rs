//! Request interception with a cache-first policy and offline fallback.
//!
//! Only same-origin GETs are considered; cross-origin requests and anything
//! aimed at the story service pass through untouched. On a cache miss the
//! network response is cached before it is returned, so a second request for
//! the same resource never races the first into a double fetch.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::cache::{AssetCache, CachedResponse};
use super::manifest::{CACHE_VERSION, ESSENTIAL_ASSETS, OPTIONAL_ASSETS, SHELL_DOCUMENT};
use crate::error::StoreError;

const OFFLINE_NOTICE_HTML: &str =
  "<h1>You are offline</h1><p>Check your internet connection.</p>";

/// Network-side failure while fetching an asset.
#[derive(Debug, Clone, Error)]
#[error("fetch failed: {0}")]
pub struct FetchError(pub String);

/// Interceptor lifecycle. Old generations are retired on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
  Installing,
  Waiting,
  Active,
}

/// What a request is for, as far as the fallback policy cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  /// A navigable document; falls back to the cached shell when offline.
  Document,
  Script,
  Style,
  Image,
  Other,
}

/// An outgoing request as seen at the interception boundary.
#[derive(Debug, Clone)]
pub struct ShellRequest {
  pub method: String,
  pub url: Url,
  pub destination: Destination,
}

impl ShellRequest {
  pub fn get(url: Url, destination: Destination) -> Self {
    Self {
      method: "GET".into(),
      url,
      destination,
    }
  }

  fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
  Cache,
  Network,
  ShellFallback,
  OfflineNotice,
}

/// Decision for one intercepted request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// Forward to the network untouched; the interceptor takes no part.
  Bypass,
  Served {
    response: CachedResponse,
    source: ServeSource,
  },
}

/// The cache-backed request interceptor.
pub struct ShellInterceptor {
  cache: AssetCache,
  origin: Url,
  api_origin: Url,
  phase: LifecyclePhase,
}

impl ShellInterceptor {
  pub fn new(cache: AssetCache, origin: Url, api_origin: Url) -> Self {
    Self {
      cache,
      origin,
      api_origin,
      phase: LifecyclePhase::Installing,
    }
  }

  pub fn phase(&self) -> LifecyclePhase {
    self.phase
  }

  /// Pre-populate the current cache generation from the asset manifest.
  ///
  /// Essential assets are fetched one by one; a failure is logged and the
  /// install proceeds. Optional assets are best-effort and fail silently.
  /// Install never fails merely because assets were unreachable.
  pub async fn install<F, Fut>(&mut self, fetch: F) -> Result<(), StoreError>
  where
    F: Fn(&Url) -> Fut,
    Fut: Future<Output = Result<CachedResponse, FetchError>>,
  {
    info!(cache = CACHE_VERSION, "installing app shell cache");

    for path in ESSENTIAL_ASSETS {
      match self.fetch_and_cache(&fetch, path).await {
        Ok(true) => debug!(asset = path, "cached essential asset"),
        Ok(false) | Err(_) => warn!(asset = path, "failed to cache essential asset"),
      }
    }

    for path in OPTIONAL_ASSETS {
      let _ = self.fetch_and_cache(&fetch, path).await;
    }

    self.phase = LifecyclePhase::Waiting;
    info!("app shell cache installed");
    Ok(())
  }

  async fn fetch_and_cache<F, Fut>(&self, fetch: &F, path: &str) -> Result<bool, StoreError>
  where
    F: Fn(&Url) -> Fut,
    Fut: Future<Output = Result<CachedResponse, FetchError>>,
  {
    let url = match self.origin.join(path) {
      Ok(url) => url,
      Err(_) => return Ok(false),
    };
    match fetch(&url).await {
      Ok(response) if response.is_success() => {
        self.cache.put(CACHE_VERSION, url.as_str(), &response)?;
        Ok(true)
      }
      Ok(_) | Err(_) => Ok(false),
    }
  }

  /// Retire every cache generation but the current one and take control of
  /// all open application instances immediately.
  pub fn activate(&mut self) -> Result<(), StoreError> {
    for name in self.cache.cache_names()? {
      if name != CACHE_VERSION {
        let removed = self.cache.delete_cache(&name)?;
        info!(cache = %name, entries = removed, "retired stale cache generation");
      }
    }
    self.phase = LifecyclePhase::Active;
    Ok(())
  }

  /// Decide how to answer one request.
  ///
  /// 1. Exact-match cache lookup; a hit never touches the network.
  /// 2. Network fetch; a success is cached before it is returned.
  /// 3. On network failure, documents fall back to the cached shell entry,
  ///    or a synthesized 503 offline notice when that too is missing.
  pub async fn handle<F, Fut>(
    &self,
    request: &ShellRequest,
    fetch: F,
  ) -> Result<FetchOutcome, StoreError>
  where
    F: FnOnce(&Url) -> Fut,
    Fut: Future<Output = Result<CachedResponse, FetchError>>,
  {
    if !self.is_interceptable(request) {
      return Ok(FetchOutcome::Bypass);
    }

    if let Some(hit) = self.cache.lookup(CACHE_VERSION, request.url.as_str())? {
      return Ok(FetchOutcome::Served {
        response: hit,
        source: ServeSource::Cache,
      });
    }

    match fetch(&request.url).await {
      Ok(response) => {
        if response.is_success() {
          self.cache.put(CACHE_VERSION, request.url.as_str(), &response)?;
        }
        Ok(FetchOutcome::Served {
          response,
          source: ServeSource::Network,
        })
      }
      Err(err) => {
        debug!(url = %request.url, error = %err, "network fetch failed, going offline");
        if request.destination == Destination::Document {
          if let Ok(shell_url) = self.origin.join(SHELL_DOCUMENT) {
            if let Some(shell) = self.cache.lookup(CACHE_VERSION, shell_url.as_str())? {
              return Ok(FetchOutcome::Served {
                response: shell,
                source: ServeSource::ShellFallback,
              });
            }
          }
        }
        Ok(FetchOutcome::Served {
          response: offline_notice(),
          source: ServeSource::OfflineNotice,
        })
      }
    }
  }

  fn is_interceptable(&self, request: &ShellRequest) -> bool {
    request.is_get()
      && request.url.origin() == self.origin.origin()
      && request.url.origin() != self.api_origin.origin()
  }
}

fn offline_notice() -> CachedResponse {
  CachedResponse {
    status: 503,
    content_type: "text/html".into(),
    body: OFFLINE_NOTICE_HTML.as_bytes().to_vec(),
  }
}

/// Fetch one asset over the real network.
pub async fn network_fetch(
  http: &reqwest::Client,
  url: &Url,
) -> Result<CachedResponse, FetchError> {
  let response = http
    .get(url.clone())
    .send()
    .await
    .map_err(|e| FetchError(e.to_string()))?;
  let status = response.status().as_u16();
  let content_type = response
    .headers()
    .get(reqwest::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("application/octet-stream")
    .to_string();
  let body = response
    .bytes()
    .await
    .map_err(|e| FetchError(e.to_string()))?
    .to_vec();
  Ok(CachedResponse {
    status,
    content_type,
    body,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  fn app_origin() -> Url {
    Url::parse("http://app.test/").unwrap()
  }

  fn api_origin() -> Url {
    Url::parse("http://api.test/v1/").unwrap()
  }

  fn interceptor() -> ShellInterceptor {
    ShellInterceptor::new(AssetCache::in_memory().unwrap(), app_origin(), api_origin())
  }

  fn response(body: &str) -> CachedResponse {
    CachedResponse {
      status: 200,
      content_type: "text/html".into(),
      body: body.as_bytes().to_vec(),
    }
  }

  fn doc_request(url: &str) -> ShellRequest {
    ShellRequest::get(Url::parse(url).unwrap(), Destination::Document)
  }

  #[tokio::test]
  async fn first_fetch_hits_network_second_serves_cache() {
    let sut = interceptor();
    let request = doc_request("http://app.test/page.html");
    let hits = Arc::new(AtomicUsize::new(0));

    for expected_source in [ServeSource::Network, ServeSource::Cache] {
      let hits = Arc::clone(&hits);
      let outcome = sut
        .handle(&request, move |_| {
          hits.fetch_add(1, Ordering::SeqCst);
          async move { Ok(response("fresh")) }
        })
        .await
        .unwrap();
      match outcome {
        FetchOutcome::Served { response, source } => {
          assert_eq!(source, expected_source);
          assert_eq!(response.body, b"fresh");
        }
        FetchOutcome::Bypass => panic!("same-origin GET must be handled"),
      }
    }

    // Exactly one network fetch across both requests.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn failed_navigation_falls_back_to_cached_shell() {
    let sut = interceptor();
    let shell_body = "<html>shell</html>";
    sut
      .cache
      .put(CACHE_VERSION, "http://app.test/index.html", &response(shell_body))
      .unwrap();

    let outcome = sut
      .handle(&doc_request("http://app.test/deep/link"), |_| async {
        Err(FetchError("connection refused".into()))
      })
      .await
      .unwrap();

    match outcome {
      FetchOutcome::Served { response, source } => {
        assert_eq!(source, ServeSource::ShellFallback);
        // The shell entry is returned verbatim.
        assert_eq!(response.body, shell_body.as_bytes());
      }
      FetchOutcome::Bypass => panic!("expected a served response"),
    }
  }

  #[tokio::test]
  async fn failed_navigation_without_shell_synthesizes_503() {
    let sut = interceptor();

    let outcome = sut
      .handle(&doc_request("http://app.test/deep/link"), |_| async {
        Err(FetchError("connection refused".into()))
      })
      .await
      .unwrap();

    match outcome {
      FetchOutcome::Served { response, source } => {
        assert_eq!(source, ServeSource::OfflineNotice);
        assert_eq!(response.status, 503);
        assert_eq!(response.content_type, "text/html");
      }
      FetchOutcome::Bypass => panic!("expected a served response"),
    }
  }

  #[tokio::test]
  async fn failed_subresource_gets_offline_notice_not_shell() {
    let sut = interceptor();
    sut
      .cache
      .put(CACHE_VERSION, "http://app.test/index.html", &response("shell"))
      .unwrap();

    let request = ShellRequest::get(
      Url::parse("http://app.test/app.js").unwrap(),
      Destination::Script,
    );
    let outcome = sut
      .handle(&request, |_| async { Err(FetchError("offline".into())) })
      .await
      .unwrap();

    match outcome {
      FetchOutcome::Served { source, .. } => assert_eq!(source, ServeSource::OfflineNotice),
      FetchOutcome::Bypass => panic!("expected a served response"),
    }
  }

  #[tokio::test]
  async fn non_get_cross_origin_and_api_requests_bypass() {
    let sut = interceptor();

    let mut post = doc_request("http://app.test/");
    post.method = "POST".into();
    let cross = doc_request("http://elsewhere.test/page");
    let api = doc_request("http://api.test/v1/stories");

    let hits = Arc::new(AtomicUsize::new(0));
    for request in [post, cross, api] {
      let hits = Arc::clone(&hits);
      let outcome = sut
        .handle(&request, move |_| {
          hits.fetch_add(1, Ordering::SeqCst);
          async move { Ok(response("never served")) }
        })
        .await
        .unwrap();
      assert!(matches!(outcome, FetchOutcome::Bypass));
    }
    // Bypassed requests never reach the interceptor's fetcher.
    assert_eq!(hits.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn error_responses_are_not_cached() {
    let sut = interceptor();
    let request = doc_request("http://app.test/missing.html");

    let outcome = sut
      .handle(&request, |_| async {
        Ok(CachedResponse {
          status: 404,
          content_type: "text/html".into(),
          body: b"nope".to_vec(),
        })
      })
      .await
      .unwrap();
    assert!(matches!(
      outcome,
      FetchOutcome::Served {
        source: ServeSource::Network,
        ..
      }
    ));

    assert!(sut
      .cache
      .lookup(CACHE_VERSION, "http://app.test/missing.html")
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn install_survives_failed_assets_and_reaches_waiting() {
    let mut sut = interceptor();
    let fetched = Arc::new(AtomicUsize::new(0));

    {
      let fetched = Arc::clone(&fetched);
      sut
        .install(move |url| {
          fetched.fetch_add(1, Ordering::SeqCst);
          let url = url.clone();
          async move {
            if url.path() == "/styles.css" || url.path().starts_with("/icons/") {
              Err(FetchError("unreachable".into()))
            } else {
              Ok(response("asset"))
            }
          }
        })
        .await
        .unwrap();
    }

    assert_eq!(sut.phase(), LifecyclePhase::Waiting);
    // Every manifest entry was attempted.
    assert_eq!(
      fetched.load(Ordering::SeqCst),
      ESSENTIAL_ASSETS.len() + OPTIONAL_ASSETS.len()
    );
    // Successes are cached, failures simply absent.
    assert!(sut
      .cache
      .lookup(CACHE_VERSION, "http://app.test/index.html")
      .unwrap()
      .is_some());
    assert!(sut
      .cache
      .lookup(CACHE_VERSION, "http://app.test/styles.css")
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn activate_retires_stale_generations() {
    let mut sut = interceptor();
    sut
      .cache
      .put("app-shell-v0", "http://app.test/index.html", &response("old"))
      .unwrap();
    sut
      .cache
      .put(CACHE_VERSION, "http://app.test/index.html", &response("new"))
      .unwrap();

    sut.activate().unwrap();

    assert_eq!(sut.phase(), LifecyclePhase::Active);
    assert!(sut
      .cache
      .lookup("app-shell-v0", "http://app.test/index.html")
      .unwrap()
      .is_none());
    assert!(sut
      .cache
      .lookup(CACHE_VERSION, "http://app.test/index.html")
      .unwrap()
      .is_some());
  }
}
