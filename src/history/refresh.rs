//! Refresh pipeline
//!
//! Reconciles the index with the live repository in dependency order:
//!
//! 1. refs and the heads-first list of every commit id
//! 2. metadata (and, for eager backends, trees) of new commits
//! 3. repository back references and shortlinks
//! 4. parent -> child links
//! 5. commit runs, rebuilt wholesale if the last known commit lost its run
//! 6. diffs and last-commit records, oldest first over every commit
//! 7. per-ref revision counts and notifications
//!
//! Every step is an idempotent upsert, so a failed refresh is recovered by
//! running it again.

use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Instant;

use crate::adapter::RepositoryImplementation;
use crate::config::IndexConfig;
use crate::error::Result;
use crate::model::{Commit, CommitInfo, Oid, RepoHandle, RepoStatus, Shortlink, Tool};
use crate::repository::IndexStore;

use super::diff::DiffEngine;
use super::last_commit::LastCommitPropagator;
use super::notify::{CommitNotice, FeedEntry, RefreshNotifier, RefreshSummary, TracingNotifier};
use super::progress::{NoopProgress, Phase, ProgressReporter};
use super::runs::CommitRunBuilder;
use super::view::count_revisions;

const LOG_EVERY: usize = 100;

/// What a refresh did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub new_commits: usize,
    pub total_commits: usize,
    /// Runs built in this refresh
    pub runs: usize,
    pub rebuilt_runs: bool,
}

/// Materialize one commit. Returns true if the commit was newly inserted.
///
/// With `lazy`, commits already in the store are skipped outright. Otherwise a
/// stored commit keeps its metadata and only its trees are materialized again.
/// An insert that loses a race with another refresh is not an error.
pub async fn refresh_commit_info<S, A>(
    store: &S,
    adapter: &A,
    commit_id: &str,
    seen: &mut FxHashSet<Oid>,
    lazy: bool,
) -> Result<bool>
where
    S: IndexStore,
    A: RepositoryImplementation + ?Sized,
{
    let (commit, inserted) = match store.get_commit(commit_id).await? {
        Some(_) if lazy => return Ok(false),
        Some(existing) => (existing, false),
        None => {
            let commit = adapter.commit_info(commit_id)?;
            let inserted = store.insert_commit(&commit).await?;
            if !inserted {
                tracing::debug!("Commit {} already indexed", commit_id);
            }
            (commit, inserted)
        }
    };

    if !adapter.tool().lazy_trees() {
        match commit.tree_id.as_deref() {
            Some(tree_id) => {
                let trees = adapter.tree_snapshot(tree_id, seen)?;
                store.insert_trees(&trees).await?;
            }
            None => {
                if let Some(mut snapshot) = adapter.compute_tree(&commit, "/")? {
                    snapshot.trees.retain(|t| seen.insert(t.id.clone()));
                    store.insert_trees(&snapshot.trees).await?;
                    store.set_commit_tree(commit_id, &snapshot.root_id).await?;
                }
            }
        }
    }
    Ok(inserted)
}

/// First commit in heads-first order that is not new
pub fn last_known_commit_id<'c>(all_ids: &'c [Oid], new_ids: &FxHashSet<Oid>) -> Option<&'c Oid> {
    all_ids.iter().find(|id| !new_ids.contains(*id))
}

/// Runs a refresh of one repository against one adapter
pub struct RefreshPipeline<'a, S: IndexStore, A: RepositoryImplementation + ?Sized> {
    store: &'a S,
    adapter: &'a A,
    config: IndexConfig,
    progress: Box<dyn ProgressReporter>,
    notifier: Box<dyn RefreshNotifier>,
}

impl<'a, S: IndexStore, A: RepositoryImplementation + ?Sized> RefreshPipeline<'a, S, A> {
    pub fn new(store: &'a S, adapter: &'a A, config: IndexConfig) -> Self {
        Self {
            store,
            adapter,
            config,
            progress: Box::new(NoopProgress),
            notifier: Box::new(TracingNotifier),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn RefreshNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Refresh `repo`. With `full`, every commit is reprocessed.
    ///
    /// The repository is marked analyzing for the duration and its status is
    /// restored even when a step fails.
    pub async fn refresh(&self, repo: &mut RepoHandle, full: bool) -> Result<RefreshOutcome> {
        let start = Instant::now();
        repo.status = RepoStatus::Analyzing;
        self.store.save_repo(repo).await?;

        let result = self.run_phases(repo, full).await;

        repo.status = match &result {
            Ok(outcome) if outcome.total_commits == 0 => RepoStatus::Empty,
            _ => RepoStatus::Ready,
        };
        if let Err(e) = self.store.set_repo_status(&repo.id, repo.status).await {
            tracing::warn!("Failed to reset status of {}: {}", repo.name, e);
        }

        match &result {
            Ok(outcome) => tracing::info!(
                "Refresh complete for {}: {} new of {} commits in {:?}",
                repo.name,
                outcome.new_commits,
                outcome.total_commits,
                start.elapsed()
            ),
            Err(e) => tracing::error!("Refresh of {} failed: {}", repo.name, e),
        }
        result
    }

    async fn run_phases(&self, repo: &mut RepoHandle, full: bool) -> Result<RefreshOutcome> {
        // Phase 1: refs and commit ids
        repo.refs = self.adapter.refs()?;
        self.store.save_repo(repo).await?;

        let all_ids = self.adapter.all_commit_ids()?;
        if all_ids.is_empty() {
            tracing::info!("Repository {} is empty", repo.name);
            return Ok(RefreshOutcome::default());
        }

        let mut known: FxHashSet<Oid> = FxHashSet::default();
        for chunk in all_ids.chunks(self.config.batch_size) {
            known.extend(self.store.known_commit_ids(chunk).await?);
        }
        let new_ids: Vec<Oid> = all_ids
            .iter()
            .filter(|id| !known.contains(*id))
            .cloned()
            .collect();
        let commit_ids: &[Oid] = if full { &all_ids } else { &new_ids };
        tracing::info!(
            "Refreshing {} commits on {} ({} new, {} total)",
            commit_ids.len(),
            repo.name,
            new_ids.len(),
            all_ids.len()
        );

        // Phase 2: commit metadata and trees
        let phase = Instant::now();
        let mut seen: FxHashSet<Oid> = FxHashSet::default();
        let bar = self.progress.start(Phase::Commits, commit_ids.len() as u64);
        for (i, commit_id) in commit_ids.iter().enumerate() {
            refresh_commit_info(self.store, self.adapter, commit_id, &mut seen, !full).await?;
            bar.inc(1);
            if (i + 1) % LOG_EVERY == 0 {
                tracing::info!("Refresh commit info {}: {}", i + 1, commit_id);
            }
        }
        bar.finish();
        tracing::debug!("Commit info: {:?}", phase.elapsed());

        // Phase 3: repository back references and shortlinks
        self.refresh_commit_repos(repo, &all_ids).await?;

        // Phase 4: child links
        for chunk in commit_ids.chunks(self.config.batch_size) {
            for commit in self.store.get_commits(chunk).await? {
                self.store.add_child(&commit.parent_ids, &commit.id).await?;
            }
        }

        // Phase 5: commit runs
        let phase = Instant::now();
        let new_set: FxHashSet<Oid> = new_ids.iter().cloned().collect();
        let mut run_ids: Vec<Oid> = commit_ids.to_vec();
        let mut rebuild = full;
        if !full {
            if let Some(last) = last_known_commit_id(&all_ids, &new_set) {
                tracing::debug!("Last known commit id: {}", last);
                if self.store.run_for_commit(last).await?.is_none() {
                    tracing::info!("Commit runs incomplete, rebuilding with all commits");
                    run_ids = all_ids.clone();
                    rebuild = true;
                }
            }
        }
        let mut builder = CommitRunBuilder::new(self.store, run_ids)
            .batch_size(self.config.batch_size)
            .rebuild(rebuild);
        let runs = builder.run().await?;
        builder.cleanup().await?;
        tracing::debug!("Commit runs: {:?}", phase.elapsed());

        // Phase 6: diffs and last commits, oldest first so the newest write wins
        if repo.tool != Tool::Svn {
            let phase = Instant::now();
            self.refresh_diffs(repo, &all_ids, full).await?;
            tracing::debug!("Diffs: {:?}", phase.elapsed());
        }

        // Phase 7: revision counts and notifications
        self.refresh_counts(repo).await?;
        if self.config.notify && !new_ids.is_empty() {
            if let Err(e) = self.send_notifications(repo, &new_ids).await {
                tracing::warn!("Notification for {} failed: {}", repo.name, e);
            }
        }

        Ok(RefreshOutcome {
            new_commits: new_ids.len(),
            total_commits: all_ids.len(),
            runs,
            rebuilt_runs: rebuild,
        })
    }

    /// Reference `repo` from every commit that does not yet, and give each
    /// such commit its shortlinks
    pub async fn refresh_commit_repos(&self, repo: &RepoHandle, all_ids: &[Oid]) -> Result<usize> {
        let mut linked = 0;
        for chunk in all_ids.chunks(self.config.batch_size) {
            let newly = self.store.add_repo_to_commits(&repo.id, chunk).await?;
            let mut links: Vec<Shortlink> = Vec::with_capacity(newly.len() * 2);
            for commit_id in &newly {
                let url = self.adapter.url_for_commit(&self.config.url_prefix, commit_id);
                let shorthand = self.adapter.shorthand_for_commit(commit_id);
                let short = shorthand
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .unwrap_or(&shorthand);
                for link in [short, commit_id.as_str()] {
                    links.push(Shortlink {
                        repo_id: repo.id.clone(),
                        link: link.to_string(),
                        ref_id: commit_id.clone(),
                        url: url.clone(),
                    });
                }
            }
            self.store.insert_shortlinks(&links).await?;
            linked += newly.len();
        }
        tracing::debug!("Linked {} commits to {}", linked, repo.name);
        Ok(linked)
    }

    async fn refresh_diffs(&self, repo: &RepoHandle, all_ids: &[Oid], full: bool) -> Result<()> {
        let mut engine = DiffEngine::new(self.store, self.adapter)
            .similarity_threshold(self.config.similarity_threshold);
        let mut propagator =
            LastCommitPropagator::new(self.store, repo.id.as_str()).batch_size(self.config.batch_size);

        let oldest_first: Vec<Oid> = all_ids.iter().rev().cloned().collect();
        let bar = self.progress.start(Phase::Diffs, oldest_first.len() as u64);
        let mut done = 0usize;
        for chunk in oldest_first.chunks(self.config.batch_size) {
            let mut by_id: FxHashMap<Oid, Commit> = self
                .store
                .get_commits(chunk)
                .await?
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect();

            for commit_id in chunk {
                let Some(commit) = by_id.remove(commit_id) else {
                    tracing::warn!("Commit {} missing from index, skipping diff", commit_id);
                    continue;
                };
                if full || self.store.get_diff_info(&commit.id).await?.is_none() {
                    let info = engine.compute_diffs(&commit).await?;
                    self.store.save_diff_info(&info).await?;
                }
                if let Some(tree_id) = commit.tree_id.as_deref() {
                    let prior = engine.parent_tree_id(&commit).await?;
                    let shortlink = self.adapter.shorthand_for_commit(&commit.id);
                    let info = CommitInfo::from_commit(&commit, shortlink);
                    propagator
                        .refresh_last_commit(engine.trees(), tree_id, prior.as_deref(), &info)
                        .await?;
                }

                done += 1;
                bar.inc(1);
                if done % LOG_EVERY == 0 {
                    tracing::info!("Compute diffs {}: {}", done, commit_id);
                }
            }
        }
        propagator.flush().await?;
        bar.finish();
        tracing::debug!("Wrote {} last-commit records", propagator.written());
        Ok(())
    }

    async fn refresh_counts(&self, repo: &mut RepoHandle) -> Result<()> {
        let mut counts: FxHashMap<Oid, u64> = FxHashMap::default();
        for commit_id in repo.refs.object_ids() {
            let n = count_revisions(self.store, self.adapter, &commit_id, self.config.batch_size)
                .await?;
            counts.insert(commit_id, n as u64);
        }
        for head in repo.refs.iter_mut() {
            head.count = counts.get(&head.object_id).copied().unwrap_or(0);
        }
        self.store.save_repo(repo).await
    }

    /// One feed entry per new commit and one summary for the refresh
    async fn send_notifications(&self, repo: &RepoHandle, new_ids: &[Oid]) -> Result<()> {
        let mut notices: Vec<CommitNotice> = Vec::with_capacity(new_ids.len());
        for chunk in new_ids.chunks(self.config.batch_size) {
            let mut by_id: FxHashMap<Oid, Commit> = self
                .store
                .get_commits(chunk)
                .await?
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect();
            for commit_id in chunk {
                let Some(commit) = by_id.remove(commit_id) else {
                    continue;
                };
                let url = self.adapter.url_for_commit(&self.config.url_prefix, &commit.id);
                let entry = FeedEntry {
                    title: "New commit".to_string(),
                    summary: crate::model::summarize(&commit.message),
                    author: commit.authored.name.clone(),
                    link: url.clone(),
                };
                if let Err(e) = self.notifier.feed(&entry) {
                    tracing::warn!("Feed entry for {} failed: {:#}", commit.id, e);
                }
                let (branches, _) = self.adapter.symbolics_for_commit(&repo.refs, &commit.id);
                notices.push(CommitNotice {
                    author: commit.authored.name,
                    message: commit.message,
                    branches,
                    url,
                });
            }
        }

        let heads = repo.refs.heads.iter().map(|h| h.name.clone()).collect();
        let summary = RefreshSummary::build(&repo.name, heads, &notices);
        self.notifier.refreshed(&summary)?;
        Ok(())
    }
}
