//! File-backed cache storage.
//!
//! Each generation is stored as `<name>.json` in the cache directory, and
//! `generations.json` records creation order. Files are written to a temporary
//! path and renamed into place so readers never see a partial generation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{prepare_entries, validate_name, CacheStorage};
use crate::error::CacheError;
use crate::http::{Request, RequestKey, Response, StoredResponse};

/// File listing generation names in creation order
const INDEX_FILE: &str = "generations.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    request: RequestKey,
    response: StoredResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationFile {
    created_at: DateTime<Utc>,
    entries: Vec<StoredEntry>,
}

impl GenerationFile {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    fn upsert(&mut self, request: RequestKey, response: StoredResponse) {
        match self.entries.iter_mut().find(|e| e.request == request) {
            Some(existing) => existing.response = response,
            None => self.entries.push(StoredEntry { request, response }),
        }
    }
}

/// Summary of one generation for display
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub name: String,
    pub entries: usize,
    pub created_at: DateTime<Utc>,
}

impl GenerationSummary {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

pub struct DiskStorage {
    cache_dir: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl DiskStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            lock: Mutex::new(()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn generation_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn index_path(&self) -> PathBuf {
        self.cache_dir.join(INDEX_FILE)
    }

    fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save<T: Serialize>(path: &Path, data: &T) -> Result<(), CacheError> {
        let contents = serde_json::to_string(data)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn load_index(&self) -> Result<Vec<String>, CacheError> {
        Ok(Self::load(&self.index_path())?.unwrap_or_default())
    }

    fn load_generation(&self, name: &str) -> Result<Option<GenerationFile>, CacheError> {
        if validate_name(name).is_err() {
            return Ok(None);
        }
        Self::load(&self.generation_path(name))
    }

    /// Create the generation file and index entry if missing.
    fn ensure_generation(&self, name: &str) -> Result<GenerationFile, CacheError> {
        validate_name(name)?;
        let mut index = self.load_index()?;
        let listed = index.iter().any(|n| n == name);
        let existing = if listed { self.load_generation(name)? } else { None };
        if !listed {
            index.push(name.to_string());
            Self::save(&self.index_path(), &index)?;
        }
        match existing {
            Some(generation) => Ok(generation),
            None => {
                let generation = GenerationFile::new();
                Self::save(&self.generation_path(name), &generation)?;
                debug!(cache = name, "Created cache generation");
                Ok(generation)
            }
        }
    }

    /// Name, entry count and age of every generation, in creation order.
    pub async fn describe(&self) -> Result<Vec<GenerationSummary>, CacheError> {
        let _guard = self.lock.lock().await;
        let mut summaries = Vec::new();
        for name in self.load_index()? {
            if let Some(generation) = self.load_generation(&name)? {
                summaries.push(GenerationSummary {
                    name,
                    entries: generation.entries.len(),
                    created_at: generation.created_at,
                });
            }
        }
        Ok(summaries)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    fn backend_tag(&self) -> &'static str {
        "disk"
    }

    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        self.ensure_generation(name)?;
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        let _guard = self.lock.lock().await;
        Ok(self.load_index()?.iter().any(|n| n == name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let _guard = self.lock.lock().await;
        self.load_index()
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let _guard = self.lock.lock().await;
        let mut index = self.load_index()?;
        let before = index.len();
        index.retain(|n| n != name);
        if index.len() == before {
            return Ok(false);
        }
        // File first: a failure here leaves the generation listed and whole
        let path = self.generation_path(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Self::save(&self.index_path(), &index)?;
        Ok(true)
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        if !request.is_get() {
            return Ok(None);
        }
        let _guard = self.lock.lock().await;
        let key = request.cache_key();
        Ok(self.load_generation(name)?.and_then(|g| {
            g.entries
                .iter()
                .find(|e| e.request == key)
                .map(|e| e.response.to_response())
        }))
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError> {
        let prepared = prepare_entries(entries)?;
        let _guard = self.lock.lock().await;
        let mut generation = self.ensure_generation(name)?;
        for (request, response) in prepared {
            generation.upsert(request, response);
        }
        Self::save(&self.generation_path(name), &generation)
    }

    async fn requests(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        let _guard = self.lock.lock().await;
        let mut keys: Vec<RequestKey> = self
            .load_generation(name)?
            .map(|g| g.entries.into_iter().map(|e| e.request).collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
