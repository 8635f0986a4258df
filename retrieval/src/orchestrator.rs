//! Retrieval orchestrator
//!
//! One state machine per query:
//! `Init → DirectoryScan → DocumentScan → ChunkScan → Rank → Done`, or
//! `Failed`. Every capability call goes through the gateway. Calls of one
//! level run concurrently and the level waits for all of them before the
//! next frontier is computed; results are merged in submission order.

use crate::config::{ChunkEvidence, RetrievalConfig};
use crate::errors::{Result, RetrievalError};
use crate::request::{RankedResult, RetrievalRequest};
use crate::selection::{by_score_desc, select_top};
use crate::trace::{
    Budget, CandidateRecord, QueryId, QueryState, ReasoningTrace, Stage, StageRecord, TraceNote,
    VerdictRecord,
};
use atlas_async_utils::Deadline;
use atlas_hierarchy::{
    Chunk, ChunkId, Directory, DirectoryRef, Document, HierarchyStore, TenantScope, VersionPolicy,
};
use atlas_reasoning::{
    CallOptions, ChunkCandidate, DirectoryCandidate, DirectoryVerdict, DocumentCandidate,
    GatewayError, RankCandidate, ReasoningGateway, Validated, Verdict,
};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const UNRANKED_EXPLANATION: &str = "unranked: ranking did not run before the deadline";

/// Result of one query plus its trace. The trace is produced on failure
/// too.
#[derive(Debug)]
pub struct QueryOutcome {
    pub results: Result<Vec<RankedResult>>,
    pub trace: ReasoningTrace,
}

pub struct Orchestrator {
    store: Arc<dyn HierarchyStore>,
    gateway: Arc<ReasoningGateway>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn HierarchyStore>, gateway: Arc<ReasoningGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn run(&self, request: &RetrievalRequest, config: &RetrievalConfig) -> QueryOutcome {
        let query_id = QueryId::new();
        let started = Instant::now();
        let mut run = Run {
            store: self.store.as_ref(),
            gateway: self.gateway.as_ref(),
            config,
            query: request.query.trim(),
            scope: request.scope,
            versions: &request.versions,
            deadline: request
                .deadline
                .map(|budget| Deadline::after(budget, config.grace_period())),
            cancel: &request.cancel,
            trace: ReasoningTrace::start(query_id, request.query.trim(), request.scope),
            last_error: None,
        };
        tracing::info!(%query_id, scope = %request.scope, "retrieval started");

        let results = run.execute(request).await;

        let mut trace = run.trace;
        trace.elapsed_ms = started.elapsed().as_millis() as u64;
        match &results {
            Ok(results) => {
                trace.state = QueryState::Done;
                trace.result_count = results.len();
                tracing::info!(
                    %query_id,
                    results = results.len(),
                    incomplete = trace.incomplete,
                    elapsed_ms = trace.elapsed_ms,
                    "retrieval finished"
                );
            }
            Err(err) => {
                trace.state = QueryState::Failed;
                trace.error = Some(format!("{}: {err}", err.kind().as_str()));
                tracing::warn!(
                    %query_id,
                    kind = err.kind().as_str(),
                    error = %err,
                    elapsed_ms = trace.elapsed_ms,
                    "retrieval failed"
                );
            }
        }
        QueryOutcome { results, trace }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-query state
// ─────────────────────────────────────────────────────────────────────────────

struct Run<'a> {
    store: &'a dyn HierarchyStore,
    gateway: &'a ReasoningGateway,
    config: &'a RetrievalConfig,
    query: &'a str,
    scope: TenantScope,
    versions: &'a VersionPolicy,
    deadline: Option<Deadline>,
    cancel: &'a CancellationToken,
    trace: ReasoningTrace,
    last_error: Option<String>,
}

struct PickedDocument {
    document: Document,
    directory: Directory,
}

struct PoolEntry {
    chunk: Chunk,
    document: Document,
    directory: Directory,
    relevance: f64,
    matched_span: Option<String>,
    content: Option<String>,
}

enum CallOutcome<V: Verdict> {
    Answered(Validated<V>),
    Failed,
    /// Deadline or cancellation; not counted as a failure.
    Halted,
}

impl<'a> Run<'a> {
    async fn execute(&mut self, request: &RetrievalRequest) -> Result<Vec<RankedResult>> {
        self.config.validate()?;
        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        if self.query.is_empty() {
            return Err(RetrievalError::invalid_query("query is empty"));
        }
        let chars = self.query.chars().count();
        if chars > self.config.max_query_chars {
            return Err(RetrievalError::invalid_query(format!(
                "query is {chars} characters, the limit is {}",
                self.config.max_query_chars
            )));
        }
        if top_k == 0 {
            return Err(RetrievalError::invalid_query("top_k must be at least 1"));
        }

        let start = match request.start_path.as_deref() {
            Some(path) => {
                self.store
                    .directory(DirectoryRef::Path(path), &self.scope)
                    .await?
            }
            None => self.store.root().await?,
        };

        self.enter(QueryState::DirectoryScan);
        let terminals = self.directory_scan(start).await?;
        self.enter(QueryState::DocumentScan);
        let documents = self.document_scan(&terminals).await?;
        self.enter(QueryState::ChunkScan);
        let pool = self.chunk_scan(documents).await?;
        self.enter(QueryState::Rank);
        self.rank(pool, top_k).await
    }

    fn enter(&mut self, state: QueryState) {
        tracing::debug!(
            query_id = %self.trace.query_id,
            from = self.trace.state.as_str(),
            to = state.as_str(),
            "state transition"
        );
        self.trace.state = state;
    }

    fn options(&self) -> CallOptions<'a> {
        let config: &'a RetrievalConfig = self.config;
        CallOptions {
            policy: &config.gateway,
            deadline: self.deadline,
            cancel: self.cancel,
        }
    }

    /// True once the query must stop issuing calls.
    fn halted(&mut self, stage: Stage, record: &mut StageRecord) -> bool {
        let note = if self.cancel.is_cancelled() {
            TraceNote::Cancelled { stage }
        } else if self.deadline.is_some_and(|d| d.is_expired()) {
            TraceNote::DeadlineReached { stage }
        } else {
            return false;
        };
        self.push_halt(record, note);
        true
    }

    fn push_halt(&mut self, record: &mut StageRecord, note: TraceNote) {
        self.trace.incomplete = true;
        if !record.notes.contains(&note) {
            tracing::warn!(query_id = %self.trace.query_id, "{note}");
            record.notes.push(note);
        }
    }

    fn budget_exceeded(&mut self, record: &mut StageRecord, budget: Budget, detail: String) {
        self.trace.incomplete = true;
        let note = TraceNote::BudgetExceeded { budget, detail };
        tracing::warn!(query_id = %self.trace.query_id, "{note}");
        record.notes.push(note);
    }

    fn absorb<V: Verdict>(
        &mut self,
        record: &mut StageRecord,
        outcome: std::result::Result<Validated<V>, GatewayError>,
        candidates: usize,
    ) -> CallOutcome<V> {
        match outcome {
            Ok(validated) => {
                record.calls += 1;
                for rejected in &validated.rejected {
                    record.notes.push(TraceNote::InvalidVerdict {
                        id: rejected.id.clone(),
                        reason: rejected.reason.to_string(),
                    });
                }
                if !validated.missing.is_empty() {
                    tracing::warn!(
                        query_id = %self.trace.query_id,
                        stage = record.stage.as_str(),
                        missing = validated.missing.len(),
                        "candidates without a verdict dropped"
                    );
                }
                CallOutcome::Answered(validated)
            }
            Err(GatewayError::Cancelled) => {
                let stage = record.stage;
                self.push_halt(record, TraceNote::Cancelled { stage });
                CallOutcome::Halted
            }
            Err(GatewayError::DeadlineExceeded) => {
                let stage = record.stage;
                self.push_halt(record, TraceNote::DeadlineReached { stage });
                CallOutcome::Halted
            }
            Err(err) => {
                record.calls += 1;
                record.failed_calls += 1;
                tracing::warn!(
                    query_id = %self.trace.query_id,
                    stage = record.stage.as_str(),
                    candidates,
                    error = %err,
                    "capability call failed, candidates dropped"
                );
                record.notes.push(TraceNote::CallFailed {
                    error: err.as_str().to_string(),
                    message: err.to_string(),
                    candidates,
                });
                self.last_error = Some(err.to_string());
                CallOutcome::Failed
            }
        }
    }

    /// A stage that issued calls and saw every one of them fail aborts the
    /// query.
    fn abort_if_all_failed(&mut self, stage: Stage, calls: usize, failed: usize) -> Result<()> {
        if calls > 0 && failed == calls {
            return Err(RetrievalError::QueryAborted {
                query_id: self.trace.query_id,
                stage,
                failed,
                last_error: self.last_error.take().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn finish_stage(&mut self, mut record: StageRecord, started: Instant) {
        record.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            query_id = %self.trace.query_id,
            stage = record.stage.as_str(),
            level = record.level,
            candidates = record.candidates.len(),
            kept = record.kept().count(),
            elapsed_ms = record.elapsed_ms,
            "stage completed"
        );
        self.trace.stages.push(record);
    }

    // ─────────────────────────────────────────────────────────────────────
    // DirectoryScan
    // ─────────────────────────────────────────────────────────────────────

    /// Breadth-first expansion from `start`. Returns the terminal
    /// directories whose documents are scanned next.
    async fn directory_scan(&mut self, start: Directory) -> Result<Vec<Directory>> {
        let mut terminals: Vec<Directory> = Vec::new();
        let mut frontier = vec![start];
        let mut visits = 0usize;
        let mut level = 0u32;
        let mut calls = 0usize;
        let mut failed = 0usize;

        while !frontier.is_empty() {
            level += 1;
            let started = Instant::now();
            let mut record = StageRecord::new(Stage::DirectoryScan, Some(level));
            if self.halted(Stage::DirectoryScan, &mut record) {
                terminals.append(&mut frontier);
                self.finish_stage(record, started);
                break;
            }

            let mut groups: Vec<(Directory, Vec<Directory>)> = Vec::with_capacity(frontier.len());
            for parent in frontier.drain(..) {
                let mut summarized = Vec::new();
                for child in self.store.list_children(parent.id, &self.scope).await? {
                    if child.summary.is_some() {
                        summarized.push(child);
                    } else {
                        record.notes.push(unsummarized("directory", child.id, &child.path));
                    }
                }
                groups.push((parent, summarized));
            }

            let offered: usize = groups.iter().map(|(_, children)| children.len()).sum();
            let allowed = self.config.max_directory_visits.saturating_sub(visits);
            let truncated = offered > allowed;
            if truncated {
                let mut allowance = allowed;
                for (_, children) in &mut groups {
                    let take = children.len().min(allowance);
                    children.truncate(take);
                    allowance -= take;
                }
                self.budget_exceeded(
                    &mut record,
                    Budget::Nodes,
                    format!("level {level}: {allowed} of {offered} directories scored"),
                );
            }
            visits += offered.min(allowed);

            let candidate_sets: Vec<Vec<DirectoryCandidate>> = groups
                .iter()
                .map(|(_, children)| children.iter().map(directory_candidate).collect())
                .collect();
            for (_, children) in &groups {
                record.candidates.extend(children.iter().map(|d| CandidateRecord {
                    id: d.id.to_string(),
                    label: d.path.clone(),
                }));
            }

            let gateway = self.gateway;
            let query = self.query;
            let options = self.options();
            let outcomes = join_all(candidate_sets.iter().map(|set| async move {
                if set.is_empty() {
                    None
                } else {
                    Some(gateway.analyze_directories(query, set, &options).await)
                }
            }))
            .await;

            let mut scored: Vec<(usize, Directory, DirectoryVerdict)> = Vec::new();
            for (index, ((_, children), outcome)) in groups.iter().zip(outcomes).enumerate() {
                let Some(outcome) = outcome else {
                    continue;
                };
                let CallOutcome::Answered(validated) =
                    self.absorb(&mut record, outcome, children.len())
                else {
                    continue;
                };
                let by_id: HashMap<_, _> = children.iter().map(|d| (d.id, d)).collect();
                no_verdict_notes(&mut record, &validated.missing, |id| {
                    by_id.get(&id).map(|d| d.path.clone())
                });
                for verdict in validated.accepted {
                    if let Some(directory) = by_id.get(&verdict.id) {
                        scored.push((index, (*directory).clone(), verdict));
                    }
                }
            }

            let mut verdicts: Vec<VerdictRecord> = scored
                .iter()
                .map(|(_, directory, verdict)| VerdictRecord {
                    id: directory.id.to_string(),
                    label: directory.path.clone(),
                    score: verdict.relevance,
                    kept: false,
                    should_expand: Some(verdict.should_expand),
                    context: None,
                    reasoning: verdict.reasoning.clone(),
                })
                .collect();
            let kept = select_top(
                scored,
                |(_, _, verdict)| verdict.relevance,
                self.config.directory_threshold,
                self.config.directory_width,
            );
            mark_kept(&mut verdicts, kept.iter().map(|(_, d, _)| d.id.to_string()));
            record.verdicts = verdicts;

            let mut has_kept = vec![false; groups.len()];
            let mut next = Vec::new();
            let mut level_terminals = Vec::new();
            for (index, directory, verdict) in kept {
                has_kept[index] = true;
                if !verdict.should_expand || truncated {
                    level_terminals.push(directory);
                } else if level >= self.config.max_depth {
                    let children = self.store.list_children(directory.id, &self.scope).await?;
                    if !children.is_empty() {
                        let detail = format!(
                            "{} not expanded below depth {}",
                            directory.path, self.config.max_depth
                        );
                        self.budget_exceeded(&mut record, Budget::Depth, detail);
                    }
                    level_terminals.push(directory);
                } else {
                    next.push(directory);
                }
            }
            // Expanded parents with no kept child are searched themselves.
            for ((parent, _), kept_any) in groups.into_iter().zip(has_kept) {
                if !kept_any {
                    terminals.push(parent);
                }
            }
            terminals.extend(level_terminals);

            calls += record.calls;
            failed += record.failed_calls;
            if !record.candidates.is_empty() || !record.notes.is_empty() {
                self.finish_stage(record, started);
            }
            frontier = next;
        }

        self.abort_if_all_failed(Stage::DirectoryScan, calls, failed)?;
        Ok(terminals)
    }

    // ─────────────────────────────────────────────────────────────────────
    // DocumentScan
    // ─────────────────────────────────────────────────────────────────────

    async fn document_scan(&mut self, terminals: &[Directory]) -> Result<Vec<PickedDocument>> {
        if terminals.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let mut record = StageRecord::new(Stage::DocumentScan, None);
        if self.halted(Stage::DocumentScan, &mut record) {
            self.finish_stage(record, started);
            return Ok(Vec::new());
        }

        let mut groups: Vec<(&Directory, Vec<Document>)> = Vec::with_capacity(terminals.len());
        for directory in terminals {
            let mut summarized = Vec::new();
            for document in self
                .store
                .list_documents(directory.id, &self.scope, self.versions)
                .await?
            {
                if document.summary.is_some() {
                    summarized.push(document);
                } else {
                    record.notes.push(unsummarized("document", document.id, &document.name));
                }
            }
            groups.push((directory, summarized));
        }

        let candidate_sets: Vec<Vec<DocumentCandidate>> = groups
            .iter()
            .map(|(directory, documents)| {
                documents
                    .iter()
                    .map(|doc| DocumentCandidate {
                        id: doc.id,
                        name: doc.name.clone(),
                        version: doc.version,
                        directory_path: directory.path.clone(),
                        summary: doc.summary.clone().unwrap_or_default(),
                    })
                    .collect()
            })
            .collect();
        for (_, documents) in &groups {
            record
                .candidates
                .extend(documents.iter().map(|d| CandidateRecord {
                    id: d.id.to_string(),
                    label: d.name.clone(),
                }));
        }

        let gateway = self.gateway;
        let query = self.query;
        let options = self.options();
        let outcomes = join_all(candidate_sets.iter().map(|set| async move {
            if set.is_empty() {
                None
            } else {
                Some(gateway.select_documents(query, set, &options).await)
            }
        }))
        .await;

        let mut scored = Vec::new();
        for ((directory, documents), outcome) in groups.into_iter().zip(outcomes) {
            let Some(outcome) = outcome else {
                continue;
            };
            let CallOutcome::Answered(validated) =
                self.absorb(&mut record, outcome, documents.len())
            else {
                continue;
            };
            let mut by_id: HashMap<_, _> = documents.into_iter().map(|d| (d.id, d)).collect();
            no_verdict_notes(&mut record, &validated.missing, |id| {
                by_id.get(&id).map(|d| d.name.clone())
            });
            for verdict in validated.accepted {
                if let Some(document) = by_id.remove(&verdict.id) {
                    scored.push((document, directory, verdict));
                }
            }
        }

        let mut verdicts: Vec<VerdictRecord> = scored
            .iter()
            .map(|(document, directory, verdict)| VerdictRecord {
                id: document.id.to_string(),
                label: document.name.clone(),
                score: verdict.relevance,
                kept: false,
                should_expand: None,
                context: Some(directory.path.clone()),
                reasoning: verdict.reasoning.clone(),
            })
            .collect();
        let kept = select_top(
            scored,
            |(_, _, verdict)| verdict.relevance,
            self.config.document_threshold,
            self.config.document_width,
        );
        mark_kept(&mut verdicts, kept.iter().map(|(d, _, _)| d.id.to_string()));
        record.verdicts = verdicts;

        let (calls, failed) = (record.calls, record.failed_calls);
        self.finish_stage(record, started);
        self.abort_if_all_failed(Stage::DocumentScan, calls, failed)?;

        Ok(kept
            .into_iter()
            .map(|(document, directory, _)| PickedDocument {
                document,
                directory: directory.clone(),
            })
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────
    // ChunkScan
    // ─────────────────────────────────────────────────────────────────────

    async fn chunk_scan(&mut self, documents: Vec<PickedDocument>) -> Result<Vec<PoolEntry>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let mut record = StageRecord::new(Stage::ChunkScan, None);
        if self.halted(Stage::ChunkScan, &mut record) {
            self.finish_stage(record, started);
            return Ok(Vec::new());
        }

        let mut groups: Vec<(PickedDocument, Vec<(Chunk, Option<String>)>)> =
            Vec::with_capacity(documents.len());
        for picked in documents {
            let mut usable = Vec::new();
            for chunk in self.store.list_chunks(picked.document.id, &self.scope).await? {
                match self.config.chunk_evidence {
                    ChunkEvidence::Summary if chunk.summary.is_none() => {
                        let label = chunk_label(&picked.document, &chunk);
                        record.notes.push(unsummarized("chunk", chunk.id, &label));
                    }
                    ChunkEvidence::Summary => usable.push((chunk, None)),
                    ChunkEvidence::Content => {
                        let content = self.store.chunk_content(chunk.id, &self.scope).await?;
                        usable.push((chunk, Some(content)));
                    }
                }
            }
            groups.push((picked, usable));
        }

        let candidate_sets: Vec<Vec<ChunkCandidate>> = groups
            .iter()
            .map(|(picked, chunks)| {
                chunks
                    .iter()
                    .map(|(chunk, content)| ChunkCandidate {
                        id: chunk.id,
                        ordinal: chunk.ordinal,
                        title: chunk.title.clone(),
                        document_name: picked.document.name.clone(),
                        evidence: content
                            .clone()
                            .or_else(|| chunk.summary.clone())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .collect();
        for (picked, chunks) in &groups {
            record
                .candidates
                .extend(chunks.iter().map(|(chunk, _)| CandidateRecord {
                    id: chunk.id.to_string(),
                    label: chunk_label(&picked.document, chunk),
                }));
        }

        let gateway = self.gateway;
        let query = self.query;
        let options = self.options();
        let outcomes = join_all(candidate_sets.iter().map(|set| async move {
            if set.is_empty() {
                None
            } else {
                Some(gateway.identify_chunks(query, set, &options).await)
            }
        }))
        .await;

        let mut pool = Vec::new();
        for ((picked, chunks), outcome) in groups.into_iter().zip(outcomes) {
            let Some(outcome) = outcome else {
                continue;
            };
            let CallOutcome::Answered(validated) = self.absorb(&mut record, outcome, chunks.len())
            else {
                continue;
            };
            let mut by_id: HashMap<ChunkId, (Chunk, Option<String>)> = chunks
                .into_iter()
                .map(|(chunk, content)| (chunk.id, (chunk, content)))
                .collect();
            no_verdict_notes(&mut record, &validated.missing, |id| {
                by_id
                    .get(&id)
                    .map(|(chunk, _)| chunk_label(&picked.document, chunk))
            });

            let mut scored = Vec::new();
            for verdict in validated.accepted {
                if let Some((chunk, content)) = by_id.remove(&verdict.id) {
                    scored.push((chunk, content, verdict));
                }
            }
            let mut verdicts: Vec<VerdictRecord> = scored
                .iter()
                .map(|(chunk, _, verdict)| VerdictRecord {
                    id: chunk.id.to_string(),
                    label: chunk_label(&picked.document, chunk),
                    score: verdict.relevance,
                    kept: false,
                    should_expand: None,
                    context: Some(picked.directory.path.clone()),
                    reasoning: verdict.reasoning.clone(),
                })
                .collect();
            let kept = select_top(
                scored,
                |(_, _, verdict)| verdict.relevance,
                self.config.chunk_threshold,
                self.config.chunk_width,
            );
            mark_kept(&mut verdicts, kept.iter().map(|(c, _, _)| c.id.to_string()));
            record.verdicts.extend(verdicts);

            for (chunk, content, verdict) in kept {
                pool.push(PoolEntry {
                    chunk,
                    document: picked.document.clone(),
                    directory: picked.directory.clone(),
                    relevance: verdict.relevance,
                    matched_span: verdict.matched_span,
                    content,
                });
            }
        }

        let (calls, failed) = (record.calls, record.failed_calls);
        self.finish_stage(record, started);
        self.abort_if_all_failed(Stage::ChunkScan, calls, failed)?;
        Ok(pool)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rank
    // ─────────────────────────────────────────────────────────────────────

    async fn rank(&mut self, mut pool: Vec<PoolEntry>, top_k: usize) -> Result<Vec<RankedResult>> {
        if pool.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let batch_size = self.config.rank_batch_size.max(1);
        let batches = pool.len().div_ceil(batch_size);
        let mut record = StageRecord::new(Stage::Rank, Some(batches as u32));
        record
            .candidates
            .extend(pool.iter().map(|entry| CandidateRecord {
                id: entry.chunk.id.to_string(),
                label: chunk_label(&entry.document, &entry.chunk),
            }));

        let mut ranked: Vec<(usize, RankedResult)> = Vec::new();
        let mut unranked = 0usize;

        if self.halted(Stage::Rank, &mut record) {
            for (position, entry) in pool.iter().enumerate() {
                ranked.push((position, unranked_result(entry)));
            }
            unranked = pool.len();
        } else {
            if self.config.rank_with_content {
                for entry in &mut pool {
                    if entry.content.is_none() {
                        entry.content =
                            Some(self.store.chunk_content(entry.chunk.id, &self.scope).await?);
                    }
                }
            }
            let with_content = self.config.rank_with_content;
            let candidate_sets: Vec<Vec<RankCandidate>> = pool
                .chunks(batch_size)
                .map(|batch| {
                    batch
                        .iter()
                        .map(|entry| RankCandidate {
                            id: entry.chunk.id,
                            title: entry.chunk.title.clone(),
                            document_name: entry.document.name.clone(),
                            directory_path: entry.directory.path.clone(),
                            summary: entry.chunk.summary.clone(),
                            content: if with_content {
                                entry.content.clone()
                            } else {
                                None
                            },
                        })
                        .collect()
                })
                .collect();

            let gateway = self.gateway;
            let query = self.query;
            let options = self.options();
            let outcomes = join_all(
                candidate_sets
                    .iter()
                    .map(|set| gateway.rank_and_explain(query, set, &options)),
            )
            .await;

            for ((index, batch), outcome) in pool.chunks(batch_size).enumerate().zip(outcomes) {
                let offset = index * batch_size;
                match self.absorb(&mut record, outcome, batch.len()) {
                    CallOutcome::Answered(validated) => {
                        let positions: HashMap<ChunkId, usize> = batch
                            .iter()
                            .enumerate()
                            .map(|(i, entry)| (entry.chunk.id, offset + i))
                            .collect();
                        no_verdict_notes(&mut record, &validated.missing, |id| {
                            positions
                                .get(&id)
                                .map(|p| chunk_label(&pool[*p].document, &pool[*p].chunk))
                        });
                        for verdict in validated.accepted {
                            if let Some(&position) = positions.get(&verdict.id) {
                                let mut result = unranked_result(&pool[position]);
                                result.final_score = verdict.final_score;
                                result.explanation = verdict.explanation;
                                result.ranked = true;
                                ranked.push((position, result));
                            }
                        }
                    }
                    CallOutcome::Halted => {
                        for (i, entry) in batch.iter().enumerate() {
                            ranked.push((offset + i, unranked_result(entry)));
                        }
                        unranked += batch.len();
                    }
                    CallOutcome::Failed => {}
                }
            }
        }

        if unranked > 0 {
            self.trace.incomplete = true;
            record.notes.push(TraceNote::Unranked {
                candidates: unranked,
            });
        }

        ranked.sort_by(|(pa, a), (pb, b)| {
            by_score_desc(a.final_score, b.final_score)
                .then(pa.cmp(pb))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        record.verdicts = ranked
            .iter()
            .enumerate()
            .map(|(rank, (position, result))| VerdictRecord {
                id: result.chunk_id.to_string(),
                label: chunk_label(&pool[*position].document, &pool[*position].chunk),
                score: result.final_score,
                kept: rank < top_k,
                should_expand: None,
                context: Some(result.directory_path.clone()),
                reasoning: Some(result.explanation.clone()),
            })
            .collect();
        ranked.truncate(top_k);

        let (calls, failed) = (record.calls, record.failed_calls);
        self.finish_stage(record, started);
        self.abort_if_all_failed(Stage::Rank, calls, failed)?;
        Ok(ranked.into_iter().map(|(_, result)| result).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn directory_candidate(directory: &Directory) -> DirectoryCandidate {
    DirectoryCandidate {
        id: directory.id,
        path: directory.path.clone(),
        name: directory.name.clone(),
        summary: directory.summary.clone().unwrap_or_default(),
    }
}

fn chunk_label(document: &Document, chunk: &Chunk) -> String {
    match &chunk.title {
        Some(title) => format!("{} / {title}", document.name),
        None => format!("{} #{}", document.name, chunk.ordinal),
    }
}

fn unsummarized(entity: &str, id: impl Display, label: &str) -> TraceNote {
    TraceNote::Unsummarized {
        entity: entity.to_string(),
        id: id.to_string(),
        label: label.to_string(),
    }
}

fn no_verdict_notes<I>(record: &mut StageRecord, missing: &[I], label: impl Fn(I) -> Option<String>)
where
    I: Copy + Display,
{
    for id in missing {
        record.notes.push(TraceNote::NoVerdict {
            id: id.to_string(),
            label: label(*id).unwrap_or_else(|| id.to_string()),
        });
    }
}

fn mark_kept(verdicts: &mut [VerdictRecord], kept: impl Iterator<Item = String>) {
    let kept: HashSet<String> = kept.collect();
    for verdict in verdicts {
        verdict.kept = kept.contains(&verdict.id);
    }
}

fn unranked_result(entry: &PoolEntry) -> RankedResult {
    RankedResult {
        chunk_id: entry.chunk.id,
        ordinal: entry.chunk.ordinal,
        title: entry.chunk.title.clone(),
        document_id: entry.document.id,
        lineage: entry.document.lineage,
        document_name: entry.document.name.clone(),
        version: entry.document.version,
        directory_id: entry.directory.id,
        directory_path: entry.directory.path.clone(),
        final_score: entry.relevance,
        explanation: UNRANKED_EXPLANATION.to_string(),
        relevance: entry.relevance,
        matched_span: entry.matched_span.clone(),
        ranked: false,
    }
}
