#![allow(dead_code)]

use atlas_hierarchy::{
    Chunk, Directory, Document, HierarchyWriter, MemoryHierarchy, NewChunk, NewDocument,
    NewVersion, Ownership, SqliteHierarchy,
};
use atlas_reasoning::{GatewayPolicy, ReasoningGateway, RetryPolicy, ScriptedCapability};
use atlas_retrieval::{RetrievalConfig, RetrievalService};
use std::sync::Arc;

/// Chunk fixture: (title, summary).
pub type ChunkSpec<'a> = (&'a str, Option<&'a str>);

/// Builds a hierarchy for a test, one summarized node at a time.
pub struct Tree<S> {
    pub store: Arc<S>,
}

impl Tree<MemoryHierarchy> {
    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryHierarchy::new()),
        }
    }
}

impl Tree<SqliteHierarchy> {
    pub fn sqlite() -> Self {
        Self {
            store: Arc::new(SqliteHierarchy::open_in_memory().expect("sqlite")),
        }
    }
}

impl<S: HierarchyWriter + 'static> Tree<S> {
    pub async fn dir(&self, path: &str, summary: &str) -> Directory {
        self.dir_with(path, Ownership::shared(), Some(summary)).await
    }

    pub async fn dir_with(
        &self,
        path: &str,
        ownership: Ownership,
        summary: Option<&str>,
    ) -> Directory {
        let dir = self
            .store
            .ensure_directory(path, ownership)
            .await
            .expect("directory");
        if let Some(summary) = summary {
            self.store
                .set_directory_summary(dir.id, summary.to_string())
                .await
                .expect("summary");
        }
        self.store.get_directory(dir.id).await.expect("reload")
    }

    pub async fn doc(
        &self,
        dir: &Directory,
        name: &str,
        summary: Option<&str>,
        chunks: &[ChunkSpec<'_>],
    ) -> (Document, Vec<Chunk>) {
        self.doc_with(dir, name, dir.ownership, summary, chunks).await
    }

    pub async fn doc_with(
        &self,
        dir: &Directory,
        name: &str,
        ownership: Ownership,
        summary: Option<&str>,
        chunks: &[ChunkSpec<'_>],
    ) -> (Document, Vec<Chunk>) {
        let content = self
            .store
            .put_content(format!("full text of {name}"))
            .await
            .expect("content");
        let doc = self
            .store
            .create_document(NewDocument {
                directory_id: dir.id,
                name: name.to_string(),
                original_filename: name.to_string(),
                mime_type: Some("text/markdown".to_string()),
                ownership,
                content,
            })
            .await
            .expect("document");
        self.finish(doc, summary, chunks).await
    }

    pub async fn reversion(
        &self,
        previous: &Document,
        summary: Option<&str>,
        chunks: &[ChunkSpec<'_>],
    ) -> (Document, Vec<Chunk>) {
        let content = self
            .store
            .put_content(format!("new text of {}", previous.name))
            .await
            .expect("content");
        let doc = self
            .store
            .create_next_version(
                previous.lineage,
                NewVersion {
                    original_filename: previous.original_filename.clone(),
                    mime_type: previous.mime_type.clone(),
                    content,
                },
            )
            .await
            .expect("version");
        self.finish(doc, summary, chunks).await
    }

    async fn finish(
        &self,
        doc: Document,
        summary: Option<&str>,
        chunks: &[ChunkSpec<'_>],
    ) -> (Document, Vec<Chunk>) {
        let mut pieces = Vec::new();
        for (title, _) in chunks {
            pieces.push(NewChunk {
                title: Some(title.to_string()),
                content: self
                    .store
                    .put_content(format!("content of {title}"))
                    .await
                    .expect("content"),
            });
        }
        let attached = self
            .store
            .attach_chunks(doc.id, pieces)
            .await
            .expect("chunks");
        for (chunk, (_, chunk_summary)) in attached.iter().zip(chunks) {
            if let Some(text) = chunk_summary {
                self.store
                    .set_chunk_summary(chunk.id, text.to_string())
                    .await
                    .expect("chunk summary");
            }
        }
        if let Some(summary) = summary {
            self.store
                .set_document_summary(doc.id, summary.to_string())
                .await
                .expect("doc summary");
        }
        let doc = self.store.document(doc.id).await.expect("reload");
        let chunks = self.store.chunks_of(doc.id).await.expect("reload chunks");
        (doc, chunks)
    }

    pub fn service(
        &self,
        capability: &Arc<ScriptedCapability>,
        config: RetrievalConfig,
    ) -> RetrievalService {
        let gateway = Arc::new(ReasoningGateway::new(capability.clone(), 4));
        RetrievalService::new(self.store.clone(), gateway, config).expect("service")
    }
}

/// Defaults with quick, jitter-free retries.
pub fn config() -> RetrievalConfig {
    RetrievalConfig {
        gateway: GatewayPolicy {
            call_timeout_ms: 1_000,
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 5,
                max_backoff_ms: 20,
                backoff_multiplier: 2.0,
                jitter_factor: 0.0,
            },
        },
        ..RetrievalConfig::default()
    }
}

/// `Some(summary)` for a chunk titled `title`.
pub fn summarized(title: &str) -> ChunkSpec<'_> {
    (title, Some(title))
}
