//! Deterministic capability double
//!
//! Verdicts are scripted per candidate. A script key matches either the
//! candidate id or its natural key: directory path, document name, chunk
//! title. Unscripted candidates get no verdict unless a default relevance
//! is set.

use crate::capability::{
    CapabilityError, ChunkCandidate, DirectoryCandidate, DocumentCandidate, Operation,
    RankCandidate, RawChunkVerdict, RawDirectoryVerdict, RawDocumentVerdict, RawRankedVerdict,
    ReasoningCapability,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Failure a scripted call returns instead of verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Timeout,
    Unavailable,
    Rejected,
    Malformed,
}

impl ScriptedFailure {
    fn to_error(self) -> CapabilityError {
        match self {
            Self::Timeout => CapabilityError::Timeout,
            Self::Unavailable => CapabilityError::unavailable("scripted outage"),
            Self::Rejected => CapabilityError::Rejected {
                status: 400,
                message: "scripted rejection".to_string(),
            },
            Self::Malformed => CapabilityError::Malformed("scripted garbage".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: Operation,
    /// Only calls whose candidates include this key.
    key: Option<String>,
    failure: ScriptedFailure,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct Script {
    directories: HashMap<String, (f64, bool)>,
    documents: HashMap<String, f64>,
    chunks: HashMap<String, f64>,
    ranks: HashMap<String, (f64, String)>,
    default_relevance: Option<f64>,
    extra_directory_entries: Vec<RawDirectoryVerdict>,
    failures: Vec<FailureRule>,
    delays: HashMap<Operation, Duration>,
    calls: HashMap<Operation, usize>,
    queries: Vec<(Operation, Vec<String>)>,
}

#[derive(Default)]
pub struct ScriptedCapability {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn directory(self, key: impl Into<String>, relevance: f64, should_expand: bool) -> Self {
        self.lock()
            .directories
            .insert(key.into(), (relevance, should_expand));
        self
    }

    pub fn document(self, key: impl Into<String>, relevance: f64) -> Self {
        self.lock().documents.insert(key.into(), relevance);
        self
    }

    pub fn chunk(self, key: impl Into<String>, relevance: f64) -> Self {
        self.lock().chunks.insert(key.into(), relevance);
        self
    }

    pub fn rank(self, key: impl Into<String>, final_score: f64, explanation: impl Into<String>) -> Self {
        self.lock()
            .ranks
            .insert(key.into(), (final_score, explanation.into()));
        self
    }

    /// Relevance for unscripted directories, documents and chunks. Rank
    /// falls back to the same score with a canned explanation.
    pub fn default_relevance(self, relevance: f64) -> Self {
        self.lock().default_relevance = Some(relevance);
        self
    }

    /// Append a raw entry to every directory response (for invalid-id or
    /// out-of-range tests).
    pub fn extra_directory_entry(self, entry: RawDirectoryVerdict) -> Self {
        self.lock().extra_directory_entries.push(entry);
        self
    }

    /// Fail every call of `operation`.
    pub fn fail(self, operation: Operation, failure: ScriptedFailure) -> Self {
        self.push_failure(operation, None, failure, None)
    }

    /// Fail the next `times` calls of `operation`, then recover.
    pub fn fail_times(self, operation: Operation, failure: ScriptedFailure, times: usize) -> Self {
        self.push_failure(operation, None, failure, Some(times))
    }

    /// Fail calls of `operation` whose candidates include `key`.
    pub fn fail_when_contains(
        self,
        operation: Operation,
        key: impl Into<String>,
        failure: ScriptedFailure,
    ) -> Self {
        self.push_failure(operation, Some(key.into()), failure, None)
    }

    pub fn delay(self, operation: Operation, delay: Duration) -> Self {
        self.lock().delays.insert(operation, delay);
        self
    }

    fn push_failure(
        self,
        operation: Operation,
        key: Option<String>,
        failure: ScriptedFailure,
        remaining: Option<usize>,
    ) -> Self {
        self.lock().failures.push(FailureRule {
            operation,
            key,
            failure,
            remaining,
        });
        self
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Keys of the candidates sent with each call, in call order.
    pub fn call_log(&self) -> Vec<(Operation, Vec<String>)> {
        self.lock().queries.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Record the call and decide whether it fails.
    fn begin(&self, operation: Operation, keys: &[Vec<String>]) -> Result<Option<Duration>, CapabilityError> {
        let mut script = self.lock();
        *script.calls.entry(operation).or_default() += 1;
        let logged = keys.iter().filter_map(|k| k.last().cloned()).collect();
        script.queries.push((operation, logged));

        for rule in script.failures.iter_mut() {
            if rule.operation != operation || rule.remaining == Some(0) {
                continue;
            }
            let matches = match &rule.key {
                Some(key) => keys.iter().any(|aliases| aliases.contains(key)),
                None => true,
            };
            if matches {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Err(rule.failure.to_error());
            }
        }
        Ok(script.delays.get(&operation).copied())
    }

    async fn enter(&self, operation: Operation, keys: &[Vec<String>]) -> Result<(), CapabilityError> {
        let delay = self.begin(operation, keys)?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, aliases: &[String]) -> Option<&'a T> {
    aliases.iter().find_map(|alias| map.get(alias))
}

#[async_trait]
impl ReasoningCapability for ScriptedCapability {
    async fn analyze_directories(
        &self,
        _query: &str,
        candidates: &[DirectoryCandidate],
    ) -> Result<Vec<RawDirectoryVerdict>, CapabilityError> {
        let keys: Vec<Vec<String>> = candidates
            .iter()
            .map(|c| vec![c.id.to_string(), c.path.clone()])
            .collect();
        self.enter(Operation::AnalyzeDirectories, &keys).await?;

        let script = self.lock();
        let mut out: Vec<RawDirectoryVerdict> = candidates
            .iter()
            .zip(&keys)
            .filter_map(|(candidate, aliases)| {
                let (relevance, should_expand) = lookup(&script.directories, aliases)
                    .copied()
                    .or_else(|| script.default_relevance.map(|r| (r, true)))?;
                Some(RawDirectoryVerdict {
                    id: candidate.id.to_string(),
                    relevance,
                    should_expand,
                    reasoning: Some(format!("scripted verdict for {}", candidate.path)),
                })
            })
            .collect();
        out.extend(script.extra_directory_entries.iter().cloned());
        Ok(out)
    }

    async fn select_documents(
        &self,
        _query: &str,
        candidates: &[DocumentCandidate],
    ) -> Result<Vec<RawDocumentVerdict>, CapabilityError> {
        let keys: Vec<Vec<String>> = candidates
            .iter()
            .map(|c| vec![c.id.to_string(), c.name.clone()])
            .collect();
        self.enter(Operation::SelectDocuments, &keys).await?;

        let script = self.lock();
        Ok(candidates
            .iter()
            .zip(&keys)
            .filter_map(|(candidate, aliases)| {
                let relevance = lookup(&script.documents, aliases)
                    .copied()
                    .or(script.default_relevance)?;
                Some(RawDocumentVerdict {
                    id: candidate.id.to_string(),
                    relevance,
                    reasoning: None,
                })
            })
            .collect())
    }

    async fn identify_chunks(
        &self,
        _query: &str,
        candidates: &[ChunkCandidate],
    ) -> Result<Vec<RawChunkVerdict>, CapabilityError> {
        let keys: Vec<Vec<String>> = candidates
            .iter()
            .map(|c| {
                let mut aliases = vec![c.id.to_string()];
                aliases.extend(c.title.clone());
                aliases
            })
            .collect();
        self.enter(Operation::IdentifyChunks, &keys).await?;

        let script = self.lock();
        Ok(candidates
            .iter()
            .zip(&keys)
            .filter_map(|(candidate, aliases)| {
                let relevance = lookup(&script.chunks, aliases)
                    .copied()
                    .or(script.default_relevance)?;
                Some(RawChunkVerdict {
                    id: candidate.id.to_string(),
                    relevance,
                    matched_span: None,
                    reasoning: None,
                })
            })
            .collect())
    }

    async fn rank_and_explain(
        &self,
        _query: &str,
        candidates: &[RankCandidate],
    ) -> Result<Vec<RawRankedVerdict>, CapabilityError> {
        let keys: Vec<Vec<String>> = candidates
            .iter()
            .map(|c| {
                let mut aliases = vec![c.id.to_string()];
                aliases.extend(c.title.clone());
                aliases
            })
            .collect();
        self.enter(Operation::RankAndExplain, &keys).await?;

        let script = self.lock();
        Ok(candidates
            .iter()
            .zip(&keys)
            .filter_map(|(candidate, aliases)| {
                let (final_score, explanation) = lookup(&script.ranks, aliases)
                    .cloned()
                    .or_else(|| {
                        script
                            .default_relevance
                            .map(|r| (r, "scripted default ranking".to_string()))
                    })?;
                Some(RawRankedVerdict {
                    id: candidate.id.to_string(),
                    final_score,
                    explanation,
                })
            })
            .collect())
    }
}
