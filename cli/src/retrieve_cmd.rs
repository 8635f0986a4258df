use crate::config::AtlasConfig;
use anyhow::{Context, Result, anyhow};
use atlas_hierarchy::{LineageId, SqliteHierarchy, SubtenantId, VersionPolicy};
use atlas_reasoning::{ChatCapability, ChatClient, ReasoningGateway};
use atlas_retrieval::{RetrievalRequest, RetrievalResponse, RetrievalService, render_markdown};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Args)]
pub struct RetrieveArgs {
    pub query: String,

    /// Search as this sub-tenant (shared content only by default)
    #[arg(long, value_name = "ID")]
    pub tenant: Option<SubtenantId>,

    /// Number of results (default: [retrieval] default_top_k)
    #[arg(long, value_name = "N")]
    pub top_k: Option<usize>,

    /// Wall-clock budget; partial results are returned when it runs out
    #[arg(long, value_name = "MS")]
    pub deadline_ms: Option<u64>,

    /// Start below the root
    #[arg(long = "from", value_name = "PATH")]
    pub start_path: Option<String>,

    /// Search a specific version of a lineage
    #[arg(long = "pin", value_name = "LINEAGE=VERSION", value_parser = crate::parse_pin)]
    pub pins: Vec<(LineageId, u32)>,

    /// Print the full response, trace included, as JSON
    #[arg(long, conflicts_with = "explain")]
    pub json: bool,

    /// Print the reasoning trace after the results
    #[arg(long)]
    pub explain: bool,
}

impl RetrieveArgs {
    fn request(&self, cancel: CancellationToken) -> RetrievalRequest {
        let mut request = RetrievalRequest::new(self.query.clone())
            .scope(crate::scope(self.tenant))
            .cancel_token(cancel);
        if let Some(top_k) = self.top_k {
            request = request.top_k(top_k);
        }
        if let Some(ms) = self.deadline_ms {
            request = request.deadline(Duration::from_millis(ms));
        }
        if let Some(path) = &self.start_path {
            request = request.start_at(path.clone());
        }
        if !self.pins.is_empty() {
            request = request.versions(VersionPolicy::Pinned(self.pins.iter().copied().collect()));
        }
        request
    }
}

pub async fn run_retrieve(
    args: RetrieveArgs,
    config: &AtlasConfig,
    store: SqliteHierarchy,
) -> Result<()> {
    let client = ChatClient::new(&config.reasoning.chat_config())
        .context("failed to build the chat client")?;
    let gateway = Arc::new(ReasoningGateway::new(
        Arc::new(ChatCapability::new(client)),
        config.reasoning.max_concurrent_calls,
    ));
    let service = RetrievalService::new(Arc::new(store), gateway, config.retrieval.clone())
        .map_err(|err| anyhow!("{}: {err}", err.kind().as_str()))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; returning what has been found so far");
            on_interrupt.cancel();
        }
    });

    let outcome = service.retrieve(args.request(cancel)).await;
    watcher.abort();
    let response = outcome.map_err(|err| anyhow!("{}: {err}", err.kind().as_str()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    print_results(&response);
    if args.explain {
        println!();
        print!("{}", render_markdown(&response.trace));
    }
    Ok(())
}

fn print_results(response: &RetrievalResponse) {
    if response.incomplete {
        eprintln!("warning: search was cut short; results are partial");
    }
    if response.results.is_empty() {
        println!("no results (query {})", response.query_id);
        return;
    }
    for (rank, result) in response.results.iter().enumerate() {
        let title = result.title.as_deref().unwrap_or("untitled");
        println!(
            "{}. [{:.2}] {}/{} v{} :: {title}",
            rank + 1,
            result.final_score,
            result.directory_path.trim_end_matches('/'),
            result.document_name,
            result.version,
        );
        println!("   {}", result.explanation);
        if let Some(span) = &result.matched_span {
            println!("   > {span}");
        }
    }
    println!("query {}", response.query_id);
}
