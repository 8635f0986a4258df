//! `atlas` command-line front end

mod config;
mod ingest_cmd;
mod retrieve_cmd;
mod tree_cmd;

use anyhow::{Context, Result};
use atlas_hierarchy::{LineageId, SqliteHierarchy, SubtenantId, TenantScope};
use clap::{Parser, Subcommand};
use config::AtlasConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Hierarchical knowledge base searched by a reasoning model
#[derive(Debug, Parser)]
#[command(name = "atlas", version)]
struct Cli {
    /// Config file (default: $ATLAS_CONFIG, then ~/.config/atlas/atlas.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database, overriding [store] db_path
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database if it does not exist
    Init,
    /// Ingest a text or Markdown file as a new document
    Ingest(ingest_cmd::IngestArgs),
    /// Ingest a file as the next version of an existing document
    Reversion(ingest_cmd::ReversionArgs),
    /// Print the directory tree visible to a scope
    Tree(tree_cmd::TreeArgs),
    /// Answer a query by reasoning over the hierarchy
    Retrieve(retrieve_cmd::RetrieveArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = AtlasConfig::load(cli.config.as_deref())?;
    let db_path = match cli.db {
        Some(path) => path,
        None => config.db_path()?,
    };

    match cli.command {
        Command::Init => {
            open_store(&db_path)?;
            println!("initialized {}", db_path.display());
            Ok(())
        }
        Command::Ingest(args) => ingest_cmd::run_ingest(args, &config, open_store(&db_path)?).await,
        Command::Reversion(args) => {
            ingest_cmd::run_reversion(args, &config, open_store(&db_path)?).await
        }
        Command::Tree(args) => tree_cmd::run_tree(args, open_store(&db_path)?).await,
        Command::Retrieve(args) => {
            retrieve_cmd::run_retrieve(args, &config, open_store(&db_path)?).await
        }
    }
}

fn open_store(path: &Path) -> Result<SqliteHierarchy> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    SqliteHierarchy::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn scope(tenant: Option<SubtenantId>) -> TenantScope {
    tenant.map_or(TenantScope::Shared, TenantScope::Subtenant)
}

/// `LINEAGE=VERSION`
fn parse_pin(raw: &str) -> std::result::Result<(LineageId, u32), String> {
    let (lineage, version) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LINEAGE=VERSION, got {raw:?}"))?;
    let lineage = lineage
        .parse::<LineageId>()
        .map_err(|err| format!("invalid lineage id {lineage:?}: {err}"))?;
    let version = version
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid version {version:?}: {err}"))?;
    if version == 0 {
        return Err("versions start at 1".to_string());
    }
    Ok((lineage, version))
}
