use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{prepare_entries, validate_name, CacheStorage};
use crate::error::CacheError;
use crate::http::{Request, RequestKey, Response, StoredResponse};

type Generation = HashMap<RequestKey, StoredResponse>;

/// In-process cache storage. Generations keep their creation order.
#[derive(Default)]
pub struct MemoryStorage {
    generations: Mutex<Vec<(String, Generation)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find<'a>(generations: &'a [(String, Generation)], name: &str) -> Option<&'a Generation> {
    generations.iter().find(|(n, _)| n == name).map(|(_, g)| g)
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, name: &str) -> Result<(), CacheError> {
        validate_name(name)?;
        let mut generations = self.generations.lock().await;
        if find(&generations, name).is_none() {
            generations.push((name.to_string(), Generation::new()));
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(find(&self.generations.lock().await, name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let generations = self.generations.lock().await;
        Ok(generations.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut generations = self.generations.lock().await;
        let before = generations.len();
        generations.retain(|(n, _)| n != name);
        Ok(generations.len() != before)
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        if !request.is_get() {
            return Ok(None);
        }
        let generations = self.generations.lock().await;
        Ok(find(&generations, name)
            .and_then(|g| g.get(&request.cache_key()))
            .map(StoredResponse::to_response))
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError> {
        validate_name(name)?;
        let prepared = prepare_entries(entries)?;
        let mut generations = self.generations.lock().await;
        let index = match generations.iter().position(|(n, _)| n == name) {
            Some(i) => i,
            None => {
                generations.push((name.to_string(), Generation::new()));
                generations.len() - 1
            }
        };
        generations[index].1.extend(prepared);
        Ok(())
    }

    async fn requests(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        let generations = self.generations.lock().await;
        let mut keys: Vec<RequestKey> = find(&generations, name)
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
