//! Chat-service backed reasoning capability

use crate::capability::{
    Candidate, CapabilityError, ChunkCandidate, DirectoryCandidate, DocumentCandidate,
    RankCandidate, RawChunkVerdict, RawDirectoryVerdict, RawDocumentVerdict, RawRankedVerdict,
    ReasoningCapability,
};
use crate::client::ChatClient;
use crate::parse::{WireEntry, parse_entries, resolve_id};
use crate::prompts;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Display;

/// Capability that asks an LLM chat service for each judgment. Every call
/// opens a fresh chat so exchanges never share context.
pub struct ChatCapability {
    client: ChatClient,
}

impl ChatCapability {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    async fn exchange<C>(
        &self,
        title: &str,
        prompt: String,
        candidates: &[C],
    ) -> Result<Vec<(String, WireEntry)>, CapabilityError>
    where
        C: Candidate,
        C::Id: Display,
    {
        let reply = self.client.ask(title, &prompt).await?;
        let entries = parse_entries(&reply)?;
        let labels = labels(candidates);
        Ok(entries
            .into_iter()
            .map(|entry| (resolve_id(&entry.id, &labels), entry))
            .collect())
    }
}

fn labels<C>(candidates: &[C]) -> HashMap<String, String>
where
    C: Candidate,
    C::Id: Display,
{
    candidates
        .iter()
        .enumerate()
        .map(|(index, c)| ((index + 1).to_string(), c.candidate_id().to_string()))
        .collect()
}

#[async_trait]
impl ReasoningCapability for ChatCapability {
    async fn analyze_directories(
        &self,
        query: &str,
        candidates: &[DirectoryCandidate],
    ) -> Result<Vec<RawDirectoryVerdict>, CapabilityError> {
        let prompt = prompts::analyze_directories_prompt(query, candidates);
        let entries = self.exchange("Directory Analysis", prompt, candidates).await?;
        Ok(entries
            .into_iter()
            .map(|(id, entry)| RawDirectoryVerdict {
                id,
                relevance: entry.relevance.unwrap_or(f64::NAN),
                should_expand: entry.should_expand.unwrap_or(true),
                reasoning: entry.reasoning,
            })
            .collect())
    }

    async fn select_documents(
        &self,
        query: &str,
        candidates: &[DocumentCandidate],
    ) -> Result<Vec<RawDocumentVerdict>, CapabilityError> {
        let prompt = prompts::select_documents_prompt(query, candidates);
        let entries = self.exchange("Document Selection", prompt, candidates).await?;
        Ok(entries
            .into_iter()
            .map(|(id, entry)| RawDocumentVerdict {
                id,
                relevance: entry.relevance.unwrap_or(f64::NAN),
                reasoning: entry.reasoning,
            })
            .collect())
    }

    async fn identify_chunks(
        &self,
        query: &str,
        candidates: &[ChunkCandidate],
    ) -> Result<Vec<RawChunkVerdict>, CapabilityError> {
        let prompt = prompts::identify_chunks_prompt(query, candidates);
        let entries = self.exchange("Chunk Identification", prompt, candidates).await?;
        Ok(entries
            .into_iter()
            .map(|(id, entry)| RawChunkVerdict {
                id,
                relevance: entry.relevance.unwrap_or(f64::NAN),
                matched_span: entry.matched_span,
                reasoning: entry.reasoning,
            })
            .collect())
    }

    async fn rank_and_explain(
        &self,
        query: &str,
        candidates: &[RankCandidate],
    ) -> Result<Vec<RawRankedVerdict>, CapabilityError> {
        let prompt = prompts::rank_and_explain_prompt(query, candidates);
        let entries = self.exchange("Result Ranking", prompt, candidates).await?;
        Ok(entries
            .into_iter()
            .map(|(id, entry)| RawRankedVerdict {
                id,
                final_score: entry.final_score.or(entry.relevance).unwrap_or(f64::NAN),
                explanation: entry.explanation.or(entry.reasoning).unwrap_or_default(),
            })
            .collect())
    }
}
