//! No-op cache implementation.

use async_trait::async_trait;
use panel_core::{ConceptFacts, FactCache, Result};
use std::time::Duration;
use tracing::trace;

/// A no-op cache that doesn't store anything.
///
/// `get_concept` returns `Ok(None)` and `put_concept` returns `Ok(())`.
/// Useful for disabling caching or forcing every concept to be refetched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl NoopCache {
    /// Create a new no-op cache.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FactCache for NoopCache {
    async fn get_concept(
        &self,
        _provider: &str,
        _cik: &str,
        _tag: &str,
    ) -> Result<Option<ConceptFacts>> {
        trace!("NoopCache: get_concept called, returning None");
        Ok(None)
    }

    async fn put_concept(
        &self,
        _provider: &str,
        _cik: &str,
        _tag: &str,
        _facts: &ConceptFacts,
    ) -> Result<()> {
        trace!("NoopCache: put_concept called, doing nothing");
        Ok(())
    }

    async fn invalidate_stale(&self, _ttl: Duration) -> Result<usize> {
        trace!("NoopCache: invalidate_stale called, returning 0");
        Ok(0)
    }

    async fn clear(&self) -> Result<()> {
        trace!("NoopCache: clear called, doing nothing");
        Ok(())
    }
}
