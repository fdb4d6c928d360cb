mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rustc_hash::FxHashSet;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use repoindex::adapter::{GitAdapter, RepositoryImplementation};
use repoindex::config::IndexConfig;
use repoindex::history::{IndicatifProgress, RefreshPipeline, RepoView};
use repoindex::model::{Commit, ObjectKind, RepoHandle, RepoStatus, Tool};
use repoindex::repository::{Database, IndexStore};
use repoindex::util::{format_size, format_timestamp, short_id};

/// Repository name and a stable id derived from its canonical path
fn repo_identity(repo_path: &Path) -> Result<(String, String)> {
    let abs_repo_path = fs::canonicalize(repo_path)
        .with_context(|| format!("Could not resolve path: {}", repo_path.display()))?;
    let name = abs_repo_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo")
        .to_string();
    let mut hasher = DefaultHasher::new();
    abs_repo_path.hash(&mut hasher);
    Ok((name, format!("{:016x}", hasher.finish())))
}

fn default_db_path(name: &str, id: &str) -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("repoindex");
    fs::create_dir_all(&cache_dir)?;
    Ok(cache_dir.join(format!("{}_{}.db", name, id)))
}

fn print_commit_line(commit: &Commit) {
    println!(
        "{}  {}  {:<20}  {}",
        short_id(&commit.id),
        format_timestamp(commit.authored.date),
        commit.authored.name,
        commit.summary()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };

    let (name, repo_id) = repo_identity(&args.repo_path)?;
    let db_path = match args.db.clone().or_else(|| config.database.clone()) {
        Some(path) => path,
        None => default_db_path(&name, &repo_id)?,
    };
    tracing::info!("Using index: {}", db_path.display());

    let db_path_str = db_path.to_str().context("Invalid path encoding")?;
    let db = Database::new(db_path_str).await?;
    if db.init_schema().await? {
        tracing::info!("Index schema upgraded, previous data discarded");
    }

    let adapter = GitAdapter::open(&args.repo_path)?;
    let stored = db.get_repo(&repo_id).await?;

    match args.command {
        Command::Refresh { full, no_notify } => {
            if no_notify {
                config.notify = false;
            }
            let mut repo = stored.unwrap_or_else(|| RepoHandle::new(&repo_id, &name, Tool::Git));
            let pipeline = RefreshPipeline::new(&db, &adapter, config)
                .with_progress(Box::new(IndicatifProgress::new(!args.quiet)));
            let outcome = pipeline.refresh(&mut repo, full).await?;
            println!(
                "Indexed {} new commits ({} total, {} runs built{})",
                outcome.new_commits,
                outcome.total_commits,
                outcome.runs,
                if outcome.rebuilt_runs { ", runs rebuilt" } else { "" }
            );
            for head in repo.refs.heads.iter().chain(repo.refs.branches.iter()) {
                println!("  {:<24} {}  {} commits", head.name, short_id(&head.object_id), head.count);
            }
        }

        Command::Status => {
            let Some(repo) = stored else {
                println!("{}: not indexed", name);
                return Ok(());
            };
            let all_ids = adapter.all_commit_ids()?;
            let mut known: FxHashSet<String> = FxHashSet::default();
            for chunk in all_ids.chunks(config.batch_size) {
                known.extend(db.known_commit_ids(chunk).await?);
            }
            println!("{} ({}): {}", repo.name, repo.tool, repo.status.as_str());
            println!(
                "  {} commits indexed, {} pending",
                known.len(),
                all_ids.len() - known.len()
            );
            for head in repo.refs.iter() {
                println!("  {:<24} {}  {} commits", head.name, short_id(&head.object_id), head.count);
            }
        }

        command => {
            let Some(repo) = stored.filter(|r| r.status != RepoStatus::Empty) else {
                bail!(
                    "{} is not indexed yet; run `repoindex {} refresh` first",
                    name,
                    args.repo_path.display()
                );
            };
            let view = RepoView::new(&db, &adapter, &repo).with_config(config);

            match command {
                Command::Log { rev, skip, count } => {
                    for commit in view.log(&rev, skip, count).await? {
                        print_commit_line(&commit);
                    }
                }

                Command::Count { rev } => {
                    println!("{}", view.count(&rev).await?);
                }

                Command::Ls { rev, path } => {
                    for entry in view.ls(&rev, &path).await? {
                        let size = match entry.kind {
                            ObjectKind::Blob => adapter
                                .blob_size(&entry.id)
                                .map(format_size)
                                .unwrap_or_default(),
                            _ => String::new(),
                        };
                        let name = match entry.kind {
                            ObjectKind::Tree => format!("{}/", entry.name),
                            _ => entry.name.clone(),
                        };
                        let last = entry
                            .last_commit
                            .map(|ci| {
                                format!("{}  {}  {}", format_timestamp(ci.date), ci.shortlink, ci.summary)
                            })
                            .unwrap_or_default();
                        println!("{:<32} {:>10}  {}", name, size, last);
                    }
                }

                Command::Show { rev } => {
                    let Some(commit) = view.commit(&rev).await? else {
                        bail!("Unknown revision: {}", rev);
                    };
                    println!("commit {}", commit.id);
                    for parent in &commit.parent_ids {
                        println!("parent {}", parent);
                    }
                    println!(
                        "Author: {} <{}>",
                        commit.authored.name, commit.authored.email
                    );
                    println!("Date:   {}", format_timestamp(commit.authored.date));
                    println!();
                    for line in commit.message.lines() {
                        println!("    {}", line);
                    }
                    println!();

                    let diffs = view.diffs(&commit.id).await?;
                    for path in &diffs.added {
                        println!("A  {}", path);
                    }
                    for path in &diffs.removed {
                        println!("D  {}", path);
                    }
                    for path in &diffs.changed {
                        println!("M  {}", path);
                    }
                    for copy in &diffs.copied {
                        println!("R{:03} {} -> {}", (copy.ratio * 100.0).round() as u32, copy.old, copy.new);
                        if !copy.diff.is_empty() {
                            print!("{}", copy.diff);
                        }
                    }
                }

                Command::Refresh { .. } | Command::Status => {}
            }
        }
    }

    Ok(())
}
