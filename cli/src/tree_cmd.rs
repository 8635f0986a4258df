use anyhow::Result;
use atlas_hierarchy::{HierarchyStore, SqliteHierarchy, SubtenantId, VersionPolicy};
use clap::Args;

#[derive(Debug, Args)]
pub struct TreeArgs {
    /// Show what this sub-tenant sees (shared content only by default)
    #[arg(long, value_name = "ID")]
    pub tenant: Option<SubtenantId>,

    /// List every version, not just the latest
    #[arg(long)]
    pub all_versions: bool,
}

pub async fn run_tree(args: TreeArgs, store: SqliteHierarchy) -> Result<()> {
    let scope = crate::scope(args.tenant);
    let policy = if args.all_versions {
        VersionPolicy::All
    } else {
        VersionPolicy::Latest
    };

    let root = store.root().await?;
    let mut stack = vec![(root, 0usize)];
    while let Some((directory, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        let label = if directory.is_root() {
            "/".to_string()
        } else {
            format!("{}/", directory.name)
        };
        let marker = if directory.summary.is_none() && !directory.is_root() {
            "  (unsummarized)"
        } else {
            ""
        };
        println!("{indent}{label}{marker}");

        for document in store.list_documents(directory.id, &scope, &policy).await? {
            let chunks = store.list_chunks(document.id, &scope).await?.len();
            let private = if document.ownership.is_private() {
                " private"
            } else {
                ""
            };
            println!(
                "{indent}  - {} v{} [{}] {chunks} chunk(s){private}",
                document.name, document.version, document.id
            );
        }

        let children = store.list_children(directory.id, &scope).await?;
        // Reverse so the stack pops children in path order.
        for child in children.into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    Ok(())
}
