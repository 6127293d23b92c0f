//! Cache storage: named cache generations holding request/response pairs.
//!
//! `CacheStorage` is the capability the manager is handed instead of reaching
//! for ambient global state. Two backends are provided:
//! - `MemoryStorage`: in-process, used by tests and short-lived hosts
//! - `DiskStorage`: one JSON file per generation under a cache directory
//!
//! Generations are searched in creation order by `match_request`.

pub mod disk;
pub mod memory;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;

use crate::error::CacheError;
use crate::http::{Request, RequestKey, Response, StoredResponse};

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Short name of the backend for logging.
    fn backend_tag(&self) -> &'static str;

    /// Open a generation, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// All generation names in creation order.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a whole generation. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Look the request up in a single generation.
    async fn match_in(&self, name: &str, request: &Request)
        -> Result<Option<Response>, CacheError>;

    /// Store a batch of entries in one generation, creating it if absent.
    /// Either every entry is stored or none is.
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError>;

    /// Request identities held by a generation, sorted.
    async fn requests(&self, name: &str) -> Result<Vec<RequestKey>, CacheError>;

    /// Store one entry in a generation, creating it if absent.
    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), CacheError> {
        self.put_all(name, vec![(request.clone(), response)]).await
    }

    /// Look the request up across every generation, oldest first.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        for name in self.keys().await? {
            if let Some(response) = self.match_in(&name, request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Check that an entry may be stored and capture its response.
/// Only GET requests with a 2xx response are accepted.
pub(crate) fn prepare_entry(
    request: &Request,
    response: Response,
) -> Result<(RequestKey, StoredResponse), CacheError> {
    if !request.is_get() {
        return Err(CacheError::UnsupportedMethod(request.method().to_string()));
    }
    if !response.is_success() {
        return Err(CacheError::UnsuccessfulResponse(response.status()));
    }
    Ok((request.cache_key(), StoredResponse::capture(response)?))
}

/// Validate a batch before any of it is written.
pub(crate) fn prepare_entries(
    entries: Vec<(Request, Response)>,
) -> Result<Vec<(RequestKey, StoredResponse)>, CacheError> {
    entries
        .into_iter()
        .map(|(request, response)| prepare_entry(&request, response))
        .collect()
}

pub(crate) fn validate_name(name: &str) -> Result<(), CacheError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && name != "."
        && name != "..";
    if ok {
        Ok(())
    } else {
        Err(CacheError::InvalidName(name.to_string()))
    }
}
