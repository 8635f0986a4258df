//! Summarizers
//!
//! Summaries are what the retrieval stages judge, so every chunk, document
//! and non-root directory gets one at ingest time.

use crate::errors::SummaryError;
use atlas_reasoning::ChatClient;
use async_trait::async_trait;
use std::fmt::Write as _;

const EXTRACTIVE_SENTENCES: usize = 3;
const EXTRACTIVE_CHARS: usize = 200;
/// Document text sent to the chat service when no chunk summaries exist.
const DOCUMENT_EXCERPT_CHARS: usize = 3_000;

/// What a directory contains, as fed to its summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry {
    Document { name: String, summary: String },
    Subdirectory { name: String, summary: String },
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_chunk(&self, text: &str) -> Result<String, SummaryError>;

    /// `chunk_summaries` may be empty, in which case `content` is used.
    async fn summarize_document(
        &self,
        name: &str,
        chunk_summaries: &[String],
        content: &str,
    ) -> Result<String, SummaryError>;

    async fn summarize_directory(
        &self,
        name: &str,
        entries: &[DirectoryEntry],
    ) -> Result<String, SummaryError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractive
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic summaries without a model: the first three sentences, or
/// the first 200 characters of shorter text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn extract(&self, text: &str) -> String {
        let text = text.trim();
        let sentences: Vec<&str> = text.split(". ").collect();
        if sentences.len() >= EXTRACTIVE_SENTENCES {
            let mut summary = sentences[..EXTRACTIVE_SENTENCES].join(". ");
            if !summary.ends_with('.') {
                summary.push('.');
            }
            return summary;
        }
        if text.chars().count() > EXTRACTIVE_CHARS {
            let mut summary: String = text.chars().take(EXTRACTIVE_CHARS).collect();
            summary.push_str("...");
            return summary;
        }
        text.to_string()
    }

    pub fn directory(&self, name: &str, entries: &[DirectoryEntry]) -> String {
        if entries.is_empty() {
            return format!("Directory '{name}' contains no summarized content");
        }
        let documents = entries
            .iter()
            .filter(|e| matches!(e, DirectoryEntry::Document { .. }))
            .count();
        let subdirectories = entries.len() - documents;
        let names: Vec<String> = entries
            .iter()
            .map(|entry| match entry {
                DirectoryEntry::Document { name, .. } => name.clone(),
                DirectoryEntry::Subdirectory { name, .. } => format!("{name}/"),
            })
            .collect();
        format!(
            "Directory '{name}' containing {documents} document(s) and {subdirectories} subdirectory(ies): {}",
            names.join(", ")
        )
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize_chunk(&self, text: &str) -> Result<String, SummaryError> {
        non_empty(self.extract(text))
    }

    async fn summarize_document(
        &self,
        _name: &str,
        _chunk_summaries: &[String],
        content: &str,
    ) -> Result<String, SummaryError> {
        non_empty(self.extract(content))
    }

    async fn summarize_directory(
        &self,
        name: &str,
        entries: &[DirectoryEntry],
    ) -> Result<String, SummaryError> {
        Ok(self.directory(name, entries))
    }
}

fn non_empty(summary: String) -> Result<String, SummaryError> {
    if summary.trim().is_empty() {
        Err(SummaryError::Empty)
    } else {
        Ok(summary)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat-backed
// ─────────────────────────────────────────────────────────────────────────────

/// Summaries written by the external chat service.
pub struct ChatSummarizer {
    client: ChatClient,
}

impl ChatSummarizer {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    async fn ask(&self, title: &str, prompt: &str) -> Result<String, SummaryError> {
        let reply = self.client.ask(title, prompt).await?;
        non_empty(reply.trim().to_string())
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize_chunk(&self, text: &str) -> Result<String, SummaryError> {
        let prompt = format!(
            "Write a concise summary (2-3 sentences) of the following text chunk. \
             Reply with the summary only.\n\n{text}"
        );
        self.ask("Chunk Summary", &prompt).await
    }

    async fn summarize_document(
        &self,
        name: &str,
        chunk_summaries: &[String],
        content: &str,
    ) -> Result<String, SummaryError> {
        let mut prompt = String::new();
        if chunk_summaries.is_empty() {
            let excerpt: String = content.chars().take(DOCUMENT_EXCERPT_CHARS).collect();
            let _ = write!(
                prompt,
                "Write a comprehensive summary (3-5 sentences) of the document \
                 \"{name}\". Reply with the summary only.\n\nContent:\n{excerpt}"
            );
            if content.chars().count() > DOCUMENT_EXCERPT_CHARS {
                prompt.push_str("...");
            }
        } else {
            let _ = writeln!(
                prompt,
                "Based on the following section summaries of the document \"{name}\", \
                 write a comprehensive document summary (3-5 sentences). Reply with \
                 the summary only.\n\nSection summaries:"
            );
            for summary in chunk_summaries {
                let _ = writeln!(prompt, "- {summary}");
            }
        }
        self.ask("Document Summary", &prompt).await
    }

    async fn summarize_directory(
        &self,
        name: &str,
        entries: &[DirectoryEntry],
    ) -> Result<String, SummaryError> {
        if entries.is_empty() {
            return Ok(ExtractiveSummarizer.directory(name, entries));
        }
        let mut prompt = format!(
            "Write a summary (2-4 sentences) of the directory \"{name}\" based on the \
             summaries of its contents. Describe what kinds of documents and \
             information it holds. Reply with the summary only.\n\n"
        );
        for entry in entries {
            let _ = match entry {
                DirectoryEntry::Document { name, summary } => {
                    writeln!(prompt, "- {name}: {summary}")
                }
                DirectoryEntry::Subdirectory { name, summary } => {
                    writeln!(prompt, "- {name}/: {summary}")
                }
            };
        }
        self.ask("Directory Summary", &prompt).await
    }
}
