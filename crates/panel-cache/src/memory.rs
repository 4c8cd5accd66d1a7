//! In-memory cache implementation.

use async_trait::async_trait;
use chrono::Utc;
use panel_core::{ConceptFacts, FactCache, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Cache entry with timestamp for TTL-based invalidation.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    cached_at: chrono::DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age > chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// Key for concept cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConceptKey {
    provider: String,
    cik: String,
    tag: String,
}

impl ConceptKey {
    fn new(provider: &str, cik: &str, tag: &str) -> Self {
        Self {
            provider: provider.to_string(),
            cik: cik.to_string(),
            tag: tag.to_string(),
        }
    }
}

/// Simple in-memory cache for testing and development.
///
/// Payloads are stored in a `RwLock`-protected `HashMap` and are lost when the
/// cache is dropped. Payloads are cloned on get/put operations.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    concepts: RwLock<HashMap<ConceptKey, CacheEntry<ConceptFacts>>>,
}

impl InMemoryCache {
    /// Create a new empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached payloads.
    pub async fn len(&self) -> usize {
        self.concepts.read().await.len()
    }

    /// Returns true if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.concepts.read().await.is_empty()
    }
}

#[async_trait]
impl FactCache for InMemoryCache {
    #[instrument(skip(self), fields(provider = %provider, cik = %cik, tag = %tag))]
    async fn get_concept(
        &self,
        provider: &str,
        cik: &str,
        tag: &str,
    ) -> Result<Option<ConceptFacts>> {
        let cache = self.concepts.read().await;
        match cache.get(&ConceptKey::new(provider, cik, tag)) {
            Some(entry) => {
                debug!("Cache hit for concept");
                Ok(Some(entry.data.clone()))
            }
            None => {
                debug!("Cache miss for concept");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, facts), fields(provider = %provider, cik = %cik, tag = %tag))]
    async fn put_concept(
        &self,
        provider: &str,
        cik: &str,
        tag: &str,
        facts: &ConceptFacts,
    ) -> Result<()> {
        let mut cache = self.concepts.write().await;
        cache.insert(
            ConceptKey::new(provider, cik, tag),
            CacheEntry::new(facts.clone()),
        );
        debug!("Cached {} concept records", facts.record_count());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize> {
        let mut cache = self.concepts.write().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_stale(ttl));
        let removed = before - cache.len();

        if removed > 0 {
            debug!("Invalidated {} stale cache entries", removed);
        }

        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.concepts.write().await.clear();
        debug!("Cleared all cache entries");
        Ok(())
    }
}
