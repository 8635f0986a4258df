//! Reasoning gateway
//!
//! Wraps a [`ReasoningCapability`] with request validation, a global
//! concurrency cap, per-attempt timeouts, retries and response validation.
//! It holds no retrieval logic.

use crate::capability::{
    Candidate, CapabilityError, ChunkCandidate, DirectoryCandidate, DocumentCandidate, Operation,
    RankCandidate, ReasoningCapability,
};
use crate::errors::{GatewayError, Result};
use crate::retry::{RetryError, RetryPolicy, execute_with_backoff};
use crate::validate::{
    ChunkVerdict, DirectoryVerdict, DocumentVerdict, RankedVerdict, Validated, Verdict, validate,
};
use atlas_async_utils::Deadline;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call tuning. Passed with every call so concurrent queries can use
/// different settings against one gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPolicy {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_call_timeout_ms() -> u64 {
    20_000
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything a single call needs from its query.
#[derive(Debug, Clone, Copy)]
pub struct CallOptions<'a> {
    pub policy: &'a GatewayPolicy,
    pub deadline: Option<Deadline>,
    pub cancel: &'a CancellationToken,
}

pub struct ReasoningGateway {
    capability: Arc<dyn ReasoningCapability>,
    permits: Arc<Semaphore>,
}

impl ReasoningGateway {
    /// `max_concurrent_calls` bounds in-flight capability calls across every
    /// query sharing this gateway.
    pub fn new(capability: Arc<dyn ReasoningCapability>, max_concurrent_calls: usize) -> Self {
        Self {
            capability,
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }

    pub async fn analyze_directories(
        &self,
        query: &str,
        candidates: &[DirectoryCandidate],
        options: &CallOptions<'_>,
    ) -> Result<Validated<DirectoryVerdict>> {
        self.call(Operation::AnalyzeDirectories, query, candidates, options, || {
            self.capability.analyze_directories(query, candidates)
        })
        .await
    }

    pub async fn select_documents(
        &self,
        query: &str,
        candidates: &[DocumentCandidate],
        options: &CallOptions<'_>,
    ) -> Result<Validated<DocumentVerdict>> {
        self.call(Operation::SelectDocuments, query, candidates, options, || {
            self.capability.select_documents(query, candidates)
        })
        .await
    }

    pub async fn identify_chunks(
        &self,
        query: &str,
        candidates: &[ChunkCandidate],
        options: &CallOptions<'_>,
    ) -> Result<Validated<ChunkVerdict>> {
        self.call(Operation::IdentifyChunks, query, candidates, options, || {
            self.capability.identify_chunks(query, candidates)
        })
        .await
    }

    pub async fn rank_and_explain(
        &self,
        query: &str,
        candidates: &[RankCandidate],
        options: &CallOptions<'_>,
    ) -> Result<Validated<RankedVerdict>> {
        self.call(Operation::RankAndExplain, query, candidates, options, || {
            self.capability.rank_and_explain(query, candidates)
        })
        .await
    }

    async fn call<V, C, F, Fut>(
        &self,
        operation: Operation,
        query: &str,
        candidates: &[C],
        options: &CallOptions<'_>,
        invoke: F,
    ) -> Result<Validated<V>>
    where
        V: Verdict,
        C: Candidate<Id = V::Id>,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<Vec<V::Raw>, CapabilityError>> + Send,
        V::Raw: Send,
    {
        if query.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("empty query".to_string()));
        }
        if candidates.is_empty() {
            return Err(GatewayError::InvalidRequest(format!(
                "{operation} called with no candidates"
            )));
        }

        admit(options)?;
        let started = Instant::now();
        let call_timeout = Duration::from_millis(options.policy.call_timeout_ms);
        let deadline = options.deadline;

        // A permit covers one attempt; backoff sleeps do not hold a slot.
        let outcome = execute_with_backoff(
            || {
                let permits = self.permits.clone();
                let attempt = invoke();
                async move {
                    let _permit = acquire_permit(permits, deadline).await?;
                    let timeout = deadline.map_or(call_timeout, |d| d.clamp_timeout(call_timeout));
                    match tokio::time::timeout(timeout, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(CapabilityError::Timeout),
                    }
                }
            },
            &options.policy.retry,
            options.cancel,
            deadline,
            |status| {
                tracing::debug!(
                    operation = operation.as_str(),
                    attempt = status.attempt,
                    sleep_ms = status.sleep.as_millis() as u64,
                    "{}",
                    status.reason
                );
            },
        )
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let raw = match outcome {
            Ok(raw) => raw,
            Err(err) => {
                let err = match err {
                    RetryError::Cancelled => GatewayError::Cancelled,
                    RetryError::DeadlineReached { .. } => GatewayError::DeadlineExceeded,
                    // Out of attempts because time ran out, not because the
                    // capability is failing.
                    RetryError::Exhausted {
                        error: CapabilityError::Timeout,
                        ..
                    } if deadline.is_some_and(|d| Instant::now() >= d.soft()) => {
                        GatewayError::DeadlineExceeded
                    }
                    RetryError::Permanent { attempts, error }
                    | RetryError::Exhausted { attempts, error } => {
                        GatewayError::from_capability(error, attempts)
                    }
                };
                tracing::warn!(
                    operation = operation.as_str(),
                    candidates = candidates.len(),
                    elapsed_ms,
                    error = %err,
                    "reasoning call failed"
                );
                return Err(err);
            }
        };

        let validated: Validated<V> = validate(candidates, raw);
        if !validated.rejected.is_empty() {
            tracing::warn!(
                operation = operation.as_str(),
                rejected = validated.rejected.len(),
                "capability returned invalid verdicts"
            );
        }
        tracing::debug!(
            operation = operation.as_str(),
            candidates = candidates.len(),
            accepted = validated.accepted.len(),
            missing = validated.missing.len(),
            elapsed_ms,
            "reasoning call completed"
        );
        Ok(validated)
    }
}

fn admit(options: &CallOptions<'_>) -> Result<()> {
    if options.cancel.is_cancelled() {
        return Err(GatewayError::Cancelled);
    }
    if options.deadline.is_some_and(|d| d.is_expired()) {
        return Err(GatewayError::DeadlineExceeded);
    }
    Ok(())
}

/// Waits for a slot until the soft deadline. Running out of time while
/// queued reads as a timeout, which the retry loop turns into a halt.
async fn acquire_permit(
    permits: Arc<Semaphore>,
    deadline: Option<Deadline>,
) -> std::result::Result<OwnedSemaphorePermit, CapabilityError> {
    tokio::select! {
        biased;
        permit = permits.acquire_owned() => {
            permit.map_err(|_| CapabilityError::unavailable("gateway closed"))
        }
        _ = soft_expiry(deadline) => Err(CapabilityError::Timeout),
    }
}

async fn soft_expiry(deadline: Option<Deadline>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.soft()).await,
        None => std::future::pending().await,
    }
}
