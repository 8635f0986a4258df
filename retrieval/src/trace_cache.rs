//! Bounded, time-limited trace retention for `explain`.

use crate::trace::{QueryId, ReasoningTrace};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

pub struct TraceCache {
    cache: Cache<QueryId, Arc<ReasoningTrace>>,
}

impl TraceCache {
    pub fn new(capacity: u64, retention: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(retention)
            .build();
        Self { cache }
    }

    pub fn insert(&self, trace: ReasoningTrace) {
        self.cache.insert(trace.query_id, Arc::new(trace));
    }

    pub fn get(&self, query_id: &QueryId) -> Option<Arc<ReasoningTrace>> {
        self.cache.get(query_id)
    }
}
