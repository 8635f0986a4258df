//! Query-facing entry point
//!
//! `retrieve(request) -> {results, trace}` and `explain(query_id) -> trace`.

use crate::config::RetrievalConfig;
use crate::errors::{Result, RetrievalError};
use crate::explain::ExplainReport;
use crate::orchestrator::Orchestrator;
use crate::request::{RetrievalRequest, RetrievalResponse};
use crate::trace::{QueryId, ReasoningTrace};
use crate::trace_cache::TraceCache;
use atlas_hierarchy::HierarchyStore;
use atlas_reasoning::ReasoningGateway;
use std::sync::Arc;

pub struct RetrievalService {
    orchestrator: Orchestrator,
    config: Arc<RetrievalConfig>,
    traces: TraceCache,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn HierarchyStore>,
        gateway: Arc<ReasoningGateway>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        let traces = TraceCache::new(config.trace_cache_capacity, config.trace_retention());
        Ok(Self {
            orchestrator: Orchestrator::new(store, gateway),
            config: Arc::new(config),
            traces,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResponse> {
        let persist = request.persist_trace.unwrap_or(self.config.persist_traces);
        let outcome = self.orchestrator.run(&request, &self.config).await;
        if persist {
            self.traces.insert(outcome.trace.clone());
        }

        let results = outcome.results?;
        Ok(RetrievalResponse {
            query_id: outcome.trace.query_id,
            incomplete: outcome.trace.incomplete,
            results,
            trace: outcome.trace,
        })
    }

    /// Trace of an earlier query that asked for persistence.
    pub fn explain(&self, query_id: &QueryId) -> Result<Arc<ReasoningTrace>> {
        self.traces.get(query_id).ok_or_else(|| {
            RetrievalError::not_found(format!("no retained trace for query {query_id}"))
        })
    }

    pub fn explain_report(&self, query_id: &QueryId) -> Result<ExplainReport> {
        self.explain(query_id)
            .map(|trace| ExplainReport::from_trace(&trace))
    }
}
