//! Argument parsing for the `vendorsync` binary (spec.md §6 "CLI surface").

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vendorsync")]
#[command(about = "Source-level vendoring for Git repositories", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the vendor config file (default: vendor.yaml in the project root)
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and copy every vendor's configured mappings, updating the lockfile
    Sync(SyncArgs),
    /// Alias for `sync` limited to vendors whose locked ref has moved upstream
    Update(SyncArgs),
    /// Compare the vendored tree against the lockfile and report drift
    Verify(VerifyArgs),
    /// Pull updates through a chain of sibling projects in dependency order
    Cascade(CascadeArgs),
    /// Compose a bundled commit message and note for the last sync's changes
    CommitAnnotate(CommitAnnotateArgs),
}

#[derive(clap::Args)]
pub struct SyncArgs {
    /// Re-sync even when the cache fast-path would otherwise skip it
    #[arg(long)]
    pub force: bool,
    /// Disable the incremental sync cache for this run
    #[arg(long)]
    pub no_cache: bool,
    /// Resolve mappings and print what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,
    /// Restrict to one vendor by name
    #[arg(long, value_name = "name")]
    pub vendor: Option<String>,
    /// Restrict to vendors tagged with this group
    #[arg(long, value_name = "name")]
    pub group: Option<String>,
    /// Allow `file://` and bare local-path vendor URLs
    #[arg(long)]
    pub local: bool,
    /// Maximum concurrent external-vendor workers
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,
    /// Bundle the resulting changes into one annotated commit
    #[arg(long)]
    pub commit: bool,
}

#[derive(clap::Args)]
pub struct VerifyArgs {
    /// Restrict to one vendor by name
    #[arg(long, value_name = "name")]
    pub vendor: Option<String>,
    /// Restrict to vendors tagged with this group
    #[arg(long, value_name = "name")]
    pub group: Option<String>,
    /// Only check vendors with `source: internal`
    #[arg(long)]
    pub internal_only: bool,
}

#[derive(clap::Args)]
pub struct CascadeArgs {
    /// Resolve mappings and print the pull order without performing any pulls
    #[arg(long)]
    pub dry_run: bool,
    /// Commit each updated project's touched paths
    #[arg(long)]
    pub commit: bool,
    /// Open a pull request per updated project (requires --commit, excludes --push)
    #[arg(long)]
    pub pr: bool,
    /// Push each updated project's branch (requires --commit, excludes --pr)
    #[arg(long)]
    pub push: bool,
    /// Only consider vendors with `source: internal`
    #[arg(long)]
    pub internal_only: bool,
    /// Visit projects in reverse topological order
    #[arg(long)]
    pub reverse: bool,
}

#[derive(clap::Args)]
pub struct CommitAnnotateArgs {
    /// Verb used in the commit subject, e.g. "update" or "bump"
    #[arg(long, default_value = "update")]
    pub action: String,
}
