use async_trait::async_trait;
use atlas_hierarchy::{
    DirectoryRef, HierarchyStore, HierarchyWriter, MemoryHierarchy, Ownership, SqliteHierarchy,
    SubtenantId, TenantScope, VersionPolicy,
};
use atlas_ingest::{
    ChatSummarizer, DirectoryEntry, IngestConfig, IngestError, IngestRequest, IngestionPipeline,
    SummaryError, Summarizer,
};
use atlas_reasoning::{ChatClient, ChatConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GUIDE: &str = "# Budget\nThe 2026 budget is 4.2M.\n\n# Hiring\nWe hire two engineers.";

fn request(dir: &str, filename: &str, text: &str) -> IngestRequest {
    IngestRequest {
        directory_path: dir.to_string(),
        filename: filename.to_string(),
        text: text.to_string(),
        ownership: Ownership::shared(),
        mime_type: None,
    }
}

/// Summaries that name what they summarize, so tests can follow them.
struct LabelSummarizer {
    calls: AtomicUsize,
}

impl LabelSummarizer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Summarizer for LabelSummarizer {
    async fn summarize_chunk(&self, text: &str) -> Result<String, SummaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("chunk: {}", text.lines().next().unwrap_or_default()))
    }

    async fn summarize_document(
        &self,
        name: &str,
        chunk_summaries: &[String],
        _content: &str,
    ) -> Result<String, SummaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("document {name} with {} chunk(s)", chunk_summaries.len()))
    }

    async fn summarize_directory(
        &self,
        name: &str,
        entries: &[DirectoryEntry],
    ) -> Result<String, SummaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("directory {name} with {} entr(ies)", entries.len()))
    }
}

#[tokio::test]
async fn markdown_is_chunked_and_summarized_bottom_up() {
    let store = Arc::new(MemoryHierarchy::new());
    let summarizer = Arc::new(LabelSummarizer::new());
    let pipeline = IngestionPipeline::new(store.clone(), &IngestConfig::default())
        .with_summarizer(summarizer.clone());

    let outcome = pipeline
        .ingest_document(request("finance//plans/", "guide.md", GUIDE))
        .await
        .expect("ingest");

    assert_eq!(outcome.document.name, "guide");
    assert_eq!(outcome.document.version, 1);
    assert_eq!(outcome.document.mime_type.as_deref(), Some("text/markdown"));
    assert_eq!(
        outcome.document.summary.as_deref(),
        Some("document guide with 2 chunk(s)")
    );
    let titles: Vec<_> = outcome
        .chunks
        .iter()
        .map(|c| (c.ordinal, c.title.clone()))
        .collect();
    assert_eq!(
        titles,
        vec![
            (0, Some("Budget".to_string())),
            (1, Some("Hiring".to_string())),
        ]
    );
    assert_eq!(
        outcome.chunks[0].summary.as_deref(),
        Some("chunk: # Budget")
    );
    assert_eq!(
        store
            .chunk_content(outcome.chunks[1].id, &TenantScope::Shared)
            .await
            .expect("content"),
        "# Hiring\nWe hire two engineers."
    );

    assert_eq!(
        outcome.summarized_directories,
        vec!["/finance/plans".to_string(), "/finance".to_string()]
    );
    let plans = store
        .directory(DirectoryRef::Path("/finance/plans"), &TenantScope::Shared)
        .await
        .expect("plans");
    assert_eq!(plans.summary.as_deref(), Some("directory plans with 1 entr(ies)"));
    let finance = store
        .directory(DirectoryRef::Path("/finance"), &TenantScope::Shared)
        .await
        .expect("finance");
    assert_eq!(finance.summary.as_deref(), Some("directory finance with 1 entr(ies)"));
    let root = store.root().await.expect("root");
    assert_eq!(root.summary, None);
    assert_eq!(outcome.fallbacks, 0);
    // Two chunks, one document, two directories.
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn new_versions_replace_chunks_without_touching_the_old_ones() {
    let store = Arc::new(MemoryHierarchy::new());
    let pipeline = IngestionPipeline::new(store.clone(), &IngestConfig::default());

    let first = pipeline
        .ingest_document(request("/docs", "guide.md", GUIDE))
        .await
        .expect("v1");
    let second = pipeline
        .ingest_version(
            first.document.id,
            "guide.md",
            "# Budget\nRevised to 5M.\n\n# Hiring\nFrozen.\n\n# Travel\nNone.",
        )
        .await
        .expect("v2");

    assert_eq!(second.document.version, 2);
    assert_eq!(second.document.lineage, first.document.lineage);
    assert_eq!(second.document.directory_id, first.document.directory_id);
    assert_eq!(second.document.name, "guide");
    assert_eq!(second.chunks.len(), 3);
    assert!(second
        .chunks
        .iter()
        .all(|c| first.chunks.iter().all(|old| old.id != c.id)));

    let dir = store
        .directory(DirectoryRef::Path("/docs"), &TenantScope::Shared)
        .await
        .expect("docs");
    let latest = store
        .list_documents(dir.id, &TenantScope::Shared, &VersionPolicy::Latest)
        .await
        .expect("latest");
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, second.document.id);
    let old_chunks = store
        .list_chunks(first.document.id, &TenantScope::Shared)
        .await
        .expect("v1 chunks");
    assert_eq!(old_chunks.len(), 2);
}

#[tokio::test]
async fn private_ingest_stays_private() {
    let store = Arc::new(MemoryHierarchy::new());
    let pipeline = IngestionPipeline::new(store.clone(), &IngestConfig::default());
    let owner = SubtenantId::new();

    let outcome = pipeline
        .ingest_document(IngestRequest {
            ownership: Ownership::private(owner),
            ..request("/private/notes", "diary.txt", "Dear diary. It rained. Then sun.")
        })
        .await
        .expect("ingest");
    assert_eq!(outcome.document.mime_type.as_deref(), Some("text/plain"));

    assert!(store
        .directory(DirectoryRef::Path("/private/notes"), &TenantScope::Shared)
        .await
        .is_err());
    let seen = store
        .directory(
            DirectoryRef::Path("/private/notes"),
            &TenantScope::Subtenant(owner),
        )
        .await
        .expect("owner sees it");
    assert_eq!(seen.ownership, Ownership::private(owner));
}

#[tokio::test]
async fn shared_summaries_never_mention_private_children() {
    let store = Arc::new(MemoryHierarchy::new());
    let pipeline = IngestionPipeline::new(store.clone(), &IngestConfig::default());
    let owner = SubtenantId::new();
    let other = SubtenantId::new();

    pipeline
        .ingest_document(request("/shared", "public.md", "Open roadmap. Shipping soon."))
        .await
        .expect("shared");
    let private = pipeline
        .ingest_document(IngestRequest {
            ownership: Ownership::private(owner),
            ..request(
                "/shared/initech-deal",
                "acquisition-target.md",
                "We intend to buy Initech. Keep quiet.",
            )
        })
        .await
        .expect("private");
    assert_eq!(
        private.summarized_directories,
        vec!["/shared/initech-deal".to_string(), "/shared".to_string()]
    );

    for scope in [TenantScope::Shared, TenantScope::Subtenant(other)] {
        let shared = store
            .directory(DirectoryRef::Path("/shared"), &scope)
            .await
            .expect("shared dir");
        assert_eq!(
            shared.summary.as_deref(),
            Some("Directory 'shared' containing 1 document(s) and 0 subdirectory(ies): public")
        );
    }

    // A private document dropped straight into the shared directory stays out too.
    pipeline
        .ingest_document(IngestRequest {
            ownership: Ownership::private(owner),
            ..request("/shared", "salary.md", "Salaries are confidential.")
        })
        .await
        .expect("private doc");
    let shared = store
        .directory(DirectoryRef::Path("/shared"), &TenantScope::Shared)
        .await
        .expect("shared dir");
    assert!(!shared.summary.unwrap_or_default().contains("salary"));

    let deal = store
        .directory(
            DirectoryRef::Path("/shared/initech-deal"),
            &TenantScope::Subtenant(owner),
        )
        .await
        .expect("owner sees the deal");
    assert_eq!(
        deal.summary.as_deref(),
        Some(
            "Directory 'initech-deal' containing 1 document(s) and 0 subdirectory(ies): \
             acquisition-target"
        )
    );
}

#[tokio::test]
async fn chat_failures_fall_back_to_extractive_summaries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = ChatClient::new(&ChatConfig {
        base_url: server.uri(),
        ..ChatConfig::default()
    })
    .expect("client");
    let store = Arc::new(MemoryHierarchy::new());
    let pipeline = IngestionPipeline::new(store.clone(), &IngestConfig::default())
        .with_summarizer(Arc::new(ChatSummarizer::new(client)));

    let outcome = pipeline
        .ingest_document(request(
            "/notes",
            "memo.txt",
            "First point. Second point. Third point. Fourth point.",
        ))
        .await
        .expect("ingest never fails on summaries");

    assert_eq!(outcome.fallbacks, 3);
    assert_eq!(
        outcome.chunks[0].summary.as_deref(),
        Some("First point. Second point. Third point.")
    );
    assert_eq!(
        outcome.document.summary.as_deref(),
        Some("First point. Second point. Third point.")
    );
    let notes = store
        .directory(DirectoryRef::Path("/notes"), &TenantScope::Shared)
        .await
        .expect("notes");
    assert_eq!(
        notes.summary.as_deref(),
        Some("Directory 'notes' containing 1 document(s) and 0 subdirectory(ies): memo")
    );
}

#[tokio::test]
async fn chat_summaries_are_stored_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "s1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api/v1/chats/s1/messages$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"content": "  A tidy summary.  "})),
        )
        .mount(&server)
        .await;

    let client = ChatClient::new(&ChatConfig {
        base_url: server.uri(),
        ..ChatConfig::default()
    })
    .expect("client");
    let store = Arc::new(MemoryHierarchy::new());
    let pipeline = IngestionPipeline::new(store.clone(), &IngestConfig::default())
        .with_summarizer(Arc::new(ChatSummarizer::new(client)));

    let outcome = pipeline
        .ingest_document(request("/notes", "memo.md", GUIDE))
        .await
        .expect("ingest");
    assert_eq!(outcome.fallbacks, 0);
    assert!(outcome
        .chunks
        .iter()
        .all(|c| c.summary.as_deref() == Some("A tidy summary.")));
    assert_eq!(outcome.document.summary.as_deref(), Some("A tidy summary."));
}

#[tokio::test]
async fn empty_documents_get_a_placeholder_summary() {
    let store = Arc::new(MemoryHierarchy::new());
    let pipeline = IngestionPipeline::new(store.clone(), &IngestConfig::default());
    let outcome = pipeline
        .ingest_document(request("/", "blank.md", "   "))
        .await
        .expect("ingest");
    assert!(outcome.chunks.is_empty());
    assert_eq!(outcome.document.summary.as_deref(), Some("Empty document 'blank'"));
    assert!(outcome.summarized_directories.is_empty());
}

#[tokio::test]
async fn bad_input_is_rejected() {
    let store = Arc::new(MemoryHierarchy::new());
    let pipeline = IngestionPipeline::new(store, &IngestConfig::default());

    let err = pipeline
        .ingest_document(request("/docs", "", "text"))
        .await
        .expect_err("no filename");
    assert!(matches!(err, IngestError::InvalidFilename { .. }));

    let err = pipeline
        .ingest_document(request("/docs/../etc", "a.md", "text"))
        .await
        .expect_err("bad path");
    assert!(matches!(err, IngestError::Hierarchy(_)));
}

#[tokio::test]
async fn sqlite_store_round_trips_an_ingest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("atlas.db");
    let document_id = {
        let store = Arc::new(SqliteHierarchy::open(&db).expect("open"));
        let pipeline = IngestionPipeline::new(store, &IngestConfig::default());
        pipeline
            .ingest_document(request("/code", "tool.py", "import os\n\ndef run():\n    pass\n"))
            .await
            .expect("ingest")
            .document
            .id
    };

    let store = SqliteHierarchy::open(&db).expect("reopen");
    let document = store.document(document_id).await.expect("document");
    assert_eq!(document.mime_type.as_deref(), Some("text/x-python"));
    let chunks = store.chunks_of(document_id).await.expect("chunks");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].title.as_deref(), Some("def run"));
    assert!(chunks[0].summary.is_some());
}
