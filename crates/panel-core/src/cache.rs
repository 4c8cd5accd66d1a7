//! Cache trait for storing fetched concept facts.
//!
//! This module defines the [`FactCache`] trait that provides a unified interface
//! for caching company-concept payloads, keyed by provider, registrant and tag.

use async_trait::async_trait;
use std::time::Duration;

use crate::{error::Result, facts::ConceptFacts};

/// Trait for caching fetched concept facts.
///
/// Implementations can store data in various backends (SQLite, in-memory, etc.)
/// to avoid repeated API calls against a throttled regulator endpoint.
#[async_trait]
pub trait FactCache: Send + Sync {
    /// Retrieves a cached payload.
    ///
    /// Returns `Ok(Some(facts))` if cached, `Ok(None)` if not cached.
    async fn get_concept(
        &self,
        provider: &str,
        cik: &str,
        tag: &str,
    ) -> Result<Option<ConceptFacts>>;

    /// Stores a payload in the cache.
    async fn put_concept(
        &self,
        provider: &str,
        cik: &str,
        tag: &str,
        facts: &ConceptFacts,
    ) -> Result<()>;

    /// Removes cache entries older than the specified TTL.
    ///
    /// Returns the number of entries invalidated.
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize>;

    /// Clears all cached data.
    async fn clear(&self) -> Result<()>;
}
