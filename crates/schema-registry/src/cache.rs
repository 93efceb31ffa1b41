use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{ResolveError, SchemaEntry, SchemaResolver};

type Slot = Arc<OnceCell<Arc<SchemaEntry>>>;

/// Caches resolved schemas for the process lifetime.
///
/// Resolved entries and in-flight lookups live in separate maps. Concurrent
/// first lookups of a subject share one in-flight slot and so one call to
/// the inner resolver. A slot is dropped once its lookup settles, so
/// failed subjects leave nothing behind and the next lookup tries again.
pub struct CachedResolver<R> {
    inner: R,
    entries: DashMap<String, Arc<SchemaEntry>>,
    inflight: DashMap<String, Slot>,
}

impl<R: SchemaResolver> CachedResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of subjects with a resolved entry.
    pub fn cached(&self) -> usize {
        self.entries.len()
    }

    fn lookup(&self, subject: &str) -> Option<Arc<SchemaEntry>> {
        self.entries.get(subject).map(|e| e.value().clone())
    }

    fn release(&self, subject: &str, slot: &Slot) {
        self.inflight.remove_if(subject, |_, s| Arc::ptr_eq(s, slot));
    }
}

#[async_trait]
impl<R: SchemaResolver> SchemaResolver for CachedResolver<R> {
    async fn resolve(
        &self,
        subject: &str,
    ) -> Result<Arc<SchemaEntry>, ResolveError> {
        if let Some(entry) = self.lookup(subject) {
            return Ok(entry);
        }

        let slot = self
            .inflight
            .entry(subject.to_string())
            .or_default()
            .clone();

        // a lookup may have settled between the miss and joining its slot
        if let Some(entry) = self.lookup(subject) {
            if !slot.initialized() {
                self.release(subject, &slot);
            }
            return Ok(entry);
        }

        let result = slot
            .get_or_try_init(|| async {
                counter!("topicgate_schema_cache_misses_total").increment(1);
                debug!(%subject, "schema cache miss");
                let entry = self.inner.resolve(subject).await?;
                info!(%subject, schema_id = entry.id, "schema resolved");
                self.entries.insert(subject.to_string(), entry.clone());
                Ok::<_, ResolveError>(entry)
            })
            .await
            .cloned();

        self.release(subject, &slot);
        result
    }
}
