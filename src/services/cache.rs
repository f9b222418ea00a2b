//! Versioned memoization of LLM completions.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

/// A stored completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 hex digest of the cache key.
    pub hash: String,
    pub content: String,
    /// Schema version the content was produced under.
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Storage behind a [`CompletionCache`].
pub trait CacheBackend: Send + Sync {
    fn find(&self, hash: &str) -> Option<CacheEntry>;

    /// Store an entry, replacing any entry with the same hash.
    fn upsert(&self, entry: CacheEntry);

    /// Remove the entry for `hash`; returns whether one existed.
    fn delete(&self, hash: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A thread-safe in-process backend keyed by hash.
#[derive(Clone, Default)]
pub struct InMemoryCacheBackend {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for InMemoryCacheBackend {
    fn find(&self, hash: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(hash).cloned()
    }

    fn upsert(&self, entry: CacheEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        merge_entry(&mut entries, entry);
    }

    fn delete(&self, hash: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(hash).is_some()
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Insert `entry`, keeping the original `created_at` of a replaced entry.
fn merge_entry(entries: &mut HashMap<String, CacheEntry>, mut entry: CacheEntry) {
    if let Some(existing) = entries.get(&entry.hash) {
        entry.created_at = existing.created_at;
        entry.updated_at = Some(Utc::now());
    }
    entries.insert(entry.hash.clone(), entry);
}

/// A backend that keeps its entries in a JSON file across restarts.
///
/// Every change rewrites the file (tmp + rename) while the write lock is
/// held, so concurrent writers land in order.
pub struct FileCacheBackend {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl FileCacheBackend {
    /// Load the cache file at `path`. A missing file starts an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let stored: Vec<CacheEntry> = serde_json::from_str(&content)
                    .with_context(|| format!("parsing {}", path.display()))?;
                info!("Loaded {} cached completions from {}", stored.len(), path.display());
                stored.into_iter().map(|e| (e.hash.clone(), e)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        let mut stored: Vec<&CacheEntry> = entries.values().collect();
        stored.sort_by(|a, b| a.hash.cmp(&b.hash));
        let result = serde_json::to_string(&stored)
            .map_err(anyhow::Error::from)
            .and_then(|json| {
                let tmp = self.path.with_extension("tmp");
                std::fs::write(&tmp, json)?;
                std::fs::rename(&tmp, &self.path)?;
                Ok(())
            });
        if let Err(e) = result {
            error!("Failed to write completion cache {}: {}", self.path.display(), e);
        }
    }
}

impl CacheBackend for FileCacheBackend {
    fn find(&self, hash: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(hash).cloned()
    }

    fn upsert(&self, entry: CacheEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        merge_entry(&mut entries, entry);
        self.persist(&entries);
    }

    fn delete(&self, hash: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.remove(hash).is_some();
        if removed {
            self.persist(&entries);
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Completion memo keyed by the hash of the prompt, valid for one schema version.
#[derive(Clone)]
pub struct CompletionCache {
    backend: Arc<dyn CacheBackend>,
    current_version: String,
}

impl CompletionCache {
    pub fn new(backend: Arc<dyn CacheBackend>, current_version: impl Into<String>) -> Self {
        Self {
            backend,
            current_version: current_version.into(),
        }
    }

    /// An in-memory cache for the given schema version.
    pub fn in_memory(current_version: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemoryCacheBackend::new()), current_version)
    }

    /// Generate a cache key hash from prompt text.
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Cached content for `key`, if stored under the current version.
    ///
    /// An entry from another version is deleted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        let hash = Self::hash_key(key);
        let entry = self.backend.find(&hash)?;
        if entry.version == self.current_version {
            debug!("Completion cache hit for {}", &hash[..12]);
            return Some(entry.content);
        }

        debug!(
            "Dropping stale completion cache entry {} (version {} != {})",
            &hash[..12],
            entry.version,
            self.current_version
        );
        self.backend.delete(&hash);
        None
    }

    /// Store `content` for `key` under `version`.
    pub fn put(&self, key: &str, content: &str, version: &str) {
        self.backend.upsert(CacheEntry {
            hash: Self::hash_key(key),
            content: content.to_string(),
            version: version.to_string(),
            created_at: Utc::now(),
            updated_at: None,
        });
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }
}
