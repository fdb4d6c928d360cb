use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "repoindex", about = "Index git history for browsing, logs and diffs")]
pub struct Cli {
    /// TOML file with indexing options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Index database (defaults to a per-repository file in the cache dir)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// No progress bars
    #[arg(long, short)]
    pub quiet: bool,

    /// Path to the git repository
    pub repo_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index new commits
    Refresh {
        /// Reprocess every commit, not only new ones
        #[arg(long)]
        full: bool,

        #[arg(long)]
        no_notify: bool,
    },

    /// Show history newest first
    Log {
        /// Branch, tag or commit id
        #[arg(default_value = "HEAD")]
        rev: String,

        #[arg(long, default_value_t = 0)]
        skip: usize,

        #[arg(long, short = 'n', default_value_t = 20)]
        count: usize,
    },

    /// Count commits reachable from a revision
    Count {
        #[arg(default_value = "HEAD")]
        rev: String,
    },

    /// List a directory with the last commit touching each entry
    Ls {
        #[arg(default_value = "HEAD")]
        rev: String,

        #[arg(default_value = "/")]
        path: String,
    },

    /// Commit metadata and changed paths
    Show { rev: String },

    /// Index status of the repository
    Status,
}
