use crate::config::AtlasConfig;
use anyhow::{Context, Result};
use atlas_hierarchy::{DocumentId, Ownership, SqliteHierarchy, SubtenantId};
use atlas_ingest::{ChatSummarizer, IngestOutcome, IngestRequest, IngestionPipeline};
use atlas_reasoning::ChatClient;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Plain text, Markdown or Python file
    pub file: PathBuf,

    /// Target directory, created if missing
    #[arg(long = "dir", value_name = "PATH", default_value = "/")]
    pub directory: String,

    /// Owning sub-tenant
    #[arg(long, value_name = "ID")]
    pub tenant: Option<SubtenantId>,

    /// Visible to the owning sub-tenant only
    #[arg(long, requires = "tenant")]
    pub private: bool,
}

#[derive(Debug, Args)]
pub struct ReversionArgs {
    /// Any version of the document to extend
    pub document: DocumentId,

    pub file: PathBuf,
}

fn pipeline(config: &AtlasConfig, store: SqliteHierarchy) -> Result<IngestionPipeline> {
    let pipeline = IngestionPipeline::new(Arc::new(store), &config.ingest);
    if !config.ingest.use_llm_summaries {
        return Ok(pipeline);
    }
    let client = ChatClient::new(&config.reasoning.chat_config())
        .context("failed to build the chat client")?;
    Ok(pipeline.with_summarizer(Arc::new(ChatSummarizer::new(client))))
}

fn read_source(path: &Path) -> Result<(String, String)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?
        .to_string();
    Ok((filename, text))
}

pub async fn run_ingest(
    args: IngestArgs,
    config: &AtlasConfig,
    store: SqliteHierarchy,
) -> Result<()> {
    let (filename, text) = read_source(&args.file)?;
    let ownership = Ownership::new(args.tenant, args.private).context("invalid ownership")?;
    let outcome = pipeline(config, store)?
        .ingest_document(IngestRequest {
            directory_path: args.directory,
            filename,
            text,
            ownership,
            mime_type: None,
        })
        .await
        .context("ingest failed")?;
    report(&outcome);
    Ok(())
}

pub async fn run_reversion(
    args: ReversionArgs,
    config: &AtlasConfig,
    store: SqliteHierarchy,
) -> Result<()> {
    let (filename, text) = read_source(&args.file)?;
    let outcome = pipeline(config, store)?
        .ingest_version(args.document, &filename, &text)
        .await
        .context("re-version failed")?;
    report(&outcome);
    Ok(())
}

fn report(outcome: &IngestOutcome) {
    let document = &outcome.document;
    println!(
        "{} v{} ({} chunk(s))",
        document.name,
        document.version,
        outcome.chunks.len()
    );
    println!("document {}", document.id);
    println!("lineage  {}", document.lineage);
    if outcome.fallbacks > 0 {
        eprintln!(
            "warning: {} summary(ies) fell back to extractive text",
            outcome.fallbacks
        );
    }
}
