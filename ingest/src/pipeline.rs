//! Ingestion pipeline
//!
//! Stores a document version, chunks it, then summarizes bottom-up: chunks,
//! the document, and every directory on the way to the root (the root
//! itself is never summarized). A failing summarizer never fails an
//! ingest; the extractive summary is used instead.

use crate::chunk::ChunkerRegistry;
use crate::config::IngestConfig;
use crate::errors::{IngestError, Result};
use crate::summarize::{DirectoryEntry, ExtractiveSummarizer, Summarizer};
use atlas_hierarchy::{
    Chunk, Directory, DirectoryId, Document, DocumentId, HierarchyWriter, NewChunk, NewDocument,
    NewVersion, Ownership, TenantScope, path,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Target directory; normalized before use (`a//b/` → `/a/b`).
    pub directory_path: String,
    pub filename: String,
    /// Already-converted plain text or Markdown.
    pub text: String,
    pub ownership: Ownership,
    /// Guessed from the extension when absent.
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document: Document,
    pub chunks: Vec<Chunk>,
    /// Paths of the directories whose summaries were refreshed, deepest
    /// first.
    pub summarized_directories: Vec<String>,
    /// Summaries that fell back to the extractive summarizer.
    pub fallbacks: usize,
}

pub struct IngestionPipeline {
    store: Arc<dyn HierarchyWriter>,
    chunkers: ChunkerRegistry,
    summarizer: Option<Arc<dyn Summarizer>>,
    extractive: ExtractiveSummarizer,
}

impl IngestionPipeline {
    /// Pipeline with the default chunkers and extractive summaries.
    pub fn new(store: Arc<dyn HierarchyWriter>, config: &IngestConfig) -> Self {
        Self {
            store,
            chunkers: ChunkerRegistry::with_defaults(config),
            summarizer: None,
            extractive: ExtractiveSummarizer,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_chunkers(mut self, chunkers: ChunkerRegistry) -> Self {
        self.chunkers = chunkers;
        self
    }

    /// Version 1 of a new document in `request.directory_path`, creating
    /// missing directories with the request's ownership.
    pub async fn ingest_document(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let started = Instant::now();
        let name = document_name(&request.filename)?;
        let directory_path = path::normalize(&request.directory_path)?;
        let directory = self
            .store
            .ensure_directory(&directory_path, request.ownership)
            .await?;

        let content = self.store.put_content(request.text.clone()).await?;
        let document = self
            .store
            .create_document(NewDocument {
                directory_id: directory.id,
                name,
                original_filename: request.filename.clone(),
                mime_type: request.mime_type.or_else(|| guess_mime(&request.filename)),
                ownership: request.ownership,
                content,
            })
            .await?;

        let outcome = self
            .finish(document, &request.filename, &request.text)
            .await?;
        tracing::info!(
            document_id = %outcome.document.id,
            directory = %directory.path,
            chunks = outcome.chunks.len(),
            fallbacks = outcome.fallbacks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document ingested"
        );
        Ok(outcome)
    }

    /// Next version of the lineage `document_id` belongs to. Directory,
    /// name and ownership are inherited; the chunk set is regenerated.
    pub async fn ingest_version(
        &self,
        document_id: DocumentId,
        filename: &str,
        text: &str,
    ) -> Result<IngestOutcome> {
        let started = Instant::now();
        document_name(filename)?;
        let previous = self.store.document(document_id).await?;
        let content = self.store.put_content(text.to_string()).await?;
        let document = self
            .store
            .create_next_version(
                previous.lineage,
                NewVersion {
                    original_filename: filename.to_string(),
                    mime_type: guess_mime(filename).or(previous.mime_type),
                    content,
                },
            )
            .await?;

        let outcome = self.finish(document, filename, text).await?;
        tracing::info!(
            document_id = %outcome.document.id,
            lineage = %outcome.document.lineage,
            version = outcome.document.version,
            chunks = outcome.chunks.len(),
            fallbacks = outcome.fallbacks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document version ingested"
        );
        Ok(outcome)
    }

    async fn finish(&self, document: Document, filename: &str, text: &str) -> Result<IngestOutcome> {
        let mut fallbacks = 0;
        let pieces = self.chunkers.chunk(filename, text);
        tracing::debug!(
            document_id = %document.id,
            chunker = self.chunkers.for_filename(filename).name(),
            chunks = pieces.len(),
            "document chunked"
        );

        let mut new_chunks = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            new_chunks.push(NewChunk {
                title: piece.title.clone(),
                content: self.store.put_content(piece.text.clone()).await?,
            });
        }
        let chunks = self.store.attach_chunks(document.id, new_chunks).await?;

        let mut chunk_summaries = Vec::with_capacity(chunks.len());
        for (chunk, piece) in chunks.iter().zip(&pieces) {
            let summary = self.chunk_summary(&piece.text, &mut fallbacks).await;
            self.store
                .set_chunk_summary(chunk.id, summary.clone())
                .await?;
            chunk_summaries.push(summary);
        }

        let summary = self
            .document_summary(&document.name, &chunk_summaries, text, &mut fallbacks)
            .await;
        self.store
            .set_document_summary(document.id, summary)
            .await?;

        let summarized_directories = self
            .summarize_directories(document.directory_id, &mut fallbacks)
            .await?;

        Ok(IngestOutcome {
            document: self.store.document(document.id).await?,
            chunks: self.store.chunks_of(document.id).await?,
            summarized_directories,
            fallbacks,
        })
    }

    /// Refresh summaries from `start` up to, but excluding, the root.
    async fn summarize_directories(
        &self,
        start: DirectoryId,
        fallbacks: &mut usize,
    ) -> Result<Vec<String>> {
        let mut refreshed = Vec::new();
        let mut directory = self.store.get_directory(start).await?;
        while let Some(parent) = directory.parent {
            let entries = self.directory_entries(&directory).await?;
            let summary = self
                .directory_summary(&directory.name, &entries, fallbacks)
                .await;
            self.store
                .set_directory_summary(directory.id, summary)
                .await?;
            refreshed.push(directory.path.clone());
            directory = self.store.get_directory(parent).await?;
        }
        Ok(refreshed)
    }

    /// Entries a directory's summary may mention: only what every reader of
    /// that directory can also see.
    async fn directory_entries(&self, directory: &Directory) -> Result<Vec<DirectoryEntry>> {
        let readers = if directory.ownership.is_private() {
            directory.ownership.as_scope()
        } else {
            TenantScope::Shared
        };
        let mut entries = Vec::new();
        for document in self.store.documents_in(directory.id).await? {
            if !document.ownership.visible_to(&readers) {
                continue;
            }
            if let Some(summary) = document.summary {
                entries.push(DirectoryEntry::Document {
                    name: document.name,
                    summary,
                });
            }
        }
        for child in self.store.children_of(directory.id).await? {
            if !child.ownership.visible_to(&readers) {
                continue;
            }
            if let Some(summary) = child.summary {
                entries.push(DirectoryEntry::Subdirectory {
                    name: child.name,
                    summary,
                });
            }
        }
        Ok(entries)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Summaries with extractive fallback
    // ─────────────────────────────────────────────────────────────────────

    async fn chunk_summary(&self, text: &str, fallbacks: &mut usize) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize_chunk(text).await {
                Ok(summary) => return summary,
                Err(err) => {
                    *fallbacks += 1;
                    tracing::warn!(error = %err, "chunk summary failed, using extractive summary");
                }
            }
        }
        self.extractive.extract(text)
    }

    async fn document_summary(
        &self,
        name: &str,
        chunk_summaries: &[String],
        content: &str,
        fallbacks: &mut usize,
    ) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer
                .summarize_document(name, chunk_summaries, content)
                .await
            {
                Ok(summary) => return summary,
                Err(err) => {
                    *fallbacks += 1;
                    tracing::warn!(
                        document = name,
                        error = %err,
                        "document summary failed, using extractive summary"
                    );
                }
            }
        }
        let summary = self.extractive.extract(content);
        if summary.is_empty() {
            format!("Empty document '{name}'")
        } else {
            summary
        }
    }

    async fn directory_summary(
        &self,
        name: &str,
        entries: &[DirectoryEntry],
        fallbacks: &mut usize,
    ) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize_directory(name, entries).await {
                Ok(summary) => return summary,
                Err(err) => {
                    *fallbacks += 1;
                    tracing::warn!(
                        directory = name,
                        error = %err,
                        "directory summary failed, using extractive summary"
                    );
                }
            }
        }
        self.extractive.directory(name, entries)
    }
}

/// Document name: the filename without its extension.
fn document_name(filename: &str) -> Result<String> {
    let invalid = |reason| IngestError::InvalidFilename {
        filename: filename.to_string(),
        reason,
    };
    let file = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| invalid("no file name"))?;
    let stem = Path::new(file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file);
    if stem.trim().is_empty() {
        return Err(invalid("empty name"));
    }
    Ok(stem.to_string())
}

fn guess_mime(filename: &str) -> Option<String> {
    let extension = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    let mime = match extension.as_str() {
        "md" | "markdown" => "text/markdown",
        "py" => "text/x-python",
        "txt" | "text" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "csv" => "text/csv",
        _ => return None,
    };
    Some(mime.to_string())
}
