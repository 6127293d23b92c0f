//! Offline cache manager: generation lifecycle and the cache-first fetch policy.
//!
//! - `install` pre-caches the static manifest, all or nothing
//! - `activate` deletes every generation that is not current
//! - `handle_fetch` serves same-origin requests cache first, stores 200
//!   network responses in the dynamic generation, and falls back to the
//!   offline page for failed navigations
//!
//! Nothing here retries. A network failure is either masked by cached content
//! or returned once.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::http::{Request, Response};
use crate::lifecycle::KeepAlive;
use crate::network::Network;
use crate::store::CacheStorage;

/// Only this status is stored from runtime fetches; 204 and 206 are not.
const CACHEABLE_STATUS: u16 = 200;

/// Result of intercepting a request
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs an ordinary fetch.
    Passthrough,
    Responded(Response),
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Responded(response) => Some(response),
        }
    }
}

pub struct OfflineCacheManager {
    origin: Url,
    static_cache: String,
    dynamic_cache: String,
    static_manifest: Vec<String>,
    offline_page: String,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl OfflineCacheManager {
    pub fn new(
        config: &WorkerConfig,
        origin: Url,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            origin,
            static_cache: config.static_cache_name(),
            dynamic_cache: config.dynamic_cache_name(),
            static_manifest: config.static_manifest.clone(),
            offline_page: config.offline_page.clone(),
            storage,
            network,
        }
    }

    pub fn static_cache(&self) -> &str {
        &self.static_cache
    }

    pub fn dynamic_cache(&self) -> &str {
        &self.dynamic_cache
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    /// Resolve a root-relative path against the page origin
    pub fn resolve(&self, path: &str) -> Result<Url, WorkerError> {
        self.origin
            .join(path)
            .map_err(|e| WorkerError::InvalidUrl(path.to_string(), e))
    }

    /// Fetch a URL that is about to be stored. Non-2xx is an error here.
    async fn fetch_for_cache(&self, request: &Request) -> Result<Response, WorkerError> {
        let mut response = self.network.fetch(request).await?;
        if !response.is_success() {
            let body = response.take_body().unwrap_or_default();
            return Err(WorkerError::from_status(
                request.url().as_str(),
                response.status(),
                &body,
            ));
        }
        Ok(response)
    }

    /// Fetch every URL, then store them all in one generation.
    /// Nothing is stored unless every fetch succeeds.
    async fn add_all(&self, cache: &str, urls: Vec<Url>) -> Result<usize, WorkerError> {
        let requests: Vec<Request> = urls.into_iter().map(Request::get).collect();
        let responses = try_join_all(requests.iter().map(|r| self.fetch_for_cache(r))).await?;
        let count = responses.len();
        self.storage
            .put_all(cache, requests.into_iter().zip(responses).collect())
            .await?;
        Ok(count)
    }

    /// Pre-cache the static manifest into the static generation.
    ///
    /// On failure the static generation is removed again if this attempt
    /// created it, so no half-populated generation is left behind.
    pub async fn install(&self) -> Result<(), WorkerError> {
        let existed = self.storage.has(&self.static_cache).await?;
        self.storage.open(&self.static_cache).await?;

        let urls = self
            .static_manifest
            .iter()
            .map(|path| self.resolve(path))
            .collect::<Result<Vec<_>, _>>();

        let result = match urls {
            Ok(urls) => self.add_all(&self.static_cache, urls).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(count) => {
                info!(
                    cache = %self.static_cache,
                    backend = self.storage.backend_tag(),
                    assets = count,
                    "Static assets cached"
                );
                Ok(())
            }
            Err(e) => {
                warn!(cache = %self.static_cache, error = %e, "Failed to cache static assets");
                if !existed {
                    if let Err(cleanup) = self.storage.delete(&self.static_cache).await {
                        warn!(cache = %self.static_cache, error = %cleanup, "Failed to remove partial static cache");
                    }
                }
                Err(e)
            }
        }
    }

    /// Delete every generation other than the current static and dynamic ones.
    /// Returns the names removed.
    pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name != self.static_cache && name != self.dynamic_cache {
                info!(cache = %name, backend = self.storage.backend_tag(), "Deleting stale cache");
                if self.storage.delete(&name).await? {
                    deleted.push(name);
                }
            }
        }
        Ok(deleted)
    }

    /// Serve a request cache first.
    ///
    /// A 200 network response is duplicated; the copy is written to the
    /// dynamic generation in a task registered with `keep_alive` and the
    /// original goes back to the caller without waiting for the write.
    pub async fn handle_fetch(
        &self,
        request: Request,
        keep_alive: &mut KeepAlive,
    ) -> Result<FetchOutcome, WorkerError> {
        if !request.is_same_origin(&self.origin) {
            return Ok(FetchOutcome::Passthrough);
        }

        if let Some(cached) = self.storage.match_request(&request).await? {
            debug!(url = %request.url(), "Serving from cache");
            return Ok(FetchOutcome::Responded(cached));
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.status() == CACHEABLE_STATUS && request.is_get() {
                    let copy = response.duplicate()?;
                    let storage = Arc::clone(&self.storage);
                    let cache = self.dynamic_cache.clone();
                    keep_alive.wait_until(async move {
                        if let Err(e) = storage.put(&cache, &request, copy).await {
                            warn!(cache = %cache, url = %request.url(), error = %e, "Failed to store response");
                        }
                    });
                } else {
                    debug!(url = %request.url(), status = response.status(), method = request.method(), "Not caching response");
                }
                Ok(FetchOutcome::Responded(response))
            }
            Err(e) => {
                if request.is_navigation() {
                    if let Some(page) = self.offline_fallback().await? {
                        info!(url = %request.url(), "Network unavailable, serving offline page");
                        return Ok(FetchOutcome::Responded(page));
                    }
                }
                warn!(url = %request.url(), error = %e, "Fetch failed");
                Err(e.into())
            }
        }
    }

    async fn offline_fallback(&self) -> Result<Option<Response>, WorkerError> {
        let url = self.resolve(&self.offline_page)?;
        Ok(self.storage.match_request(&Request::get(url)).await?)
    }

    /// Fetch and store caller-supplied URLs in the dynamic generation.
    pub async fn cache_urls(&self, urls: &[String]) -> Result<usize, WorkerError> {
        let resolved = urls
            .iter()
            .map(|u| self.resolve(u))
            .collect::<Result<Vec<_>, _>>()?;
        let count = self.add_all(&self.dynamic_cache, resolved).await?;
        info!(cache = %self.dynamic_cache, urls = count, "Cached requested URLs");
        Ok(count)
    }
}
