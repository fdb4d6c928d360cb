//! Read-side queries over an indexed repository

use rustc_hash::FxHashMap;

use crate::adapter::RepositoryImplementation;
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::model::{
    Blob, Commit, CommitDiffs, CommitInfo, LastCommit, LsEntry, ObjectKind, Oid, RepoHandle,
    RepoObject, ResolvedBlob, ResolvedTree,
};
use crate::repository::IndexStore;
use crate::util::{dir_path, path_parts};

use super::commitlog::{commitlog, CommitLog};
use super::diff::DiffEngine;
use super::runs::CommitRunBuilder;

/// Parents and children of a commit
#[derive(Debug, Clone, Default)]
pub struct CommitContext {
    pub prev: Vec<Commit>,
    pub next: Vec<Commit>,
}

/// Rebuild every run of the repository from its full commit list
pub async fn rebuild_runs<S, A>(store: &S, adapter: &A, batch_size: usize) -> Result<usize>
where
    S: IndexStore,
    A: RepositoryImplementation + ?Sized,
{
    let all_ids = adapter.all_commit_ids()?;
    tracing::info!("Rebuilding commit runs over {} commits", all_ids.len());
    let mut builder = CommitRunBuilder::new(store, all_ids)
        .batch_size(batch_size)
        .rebuild(true);
    let built = builder.run().await?;
    builder.cleanup().await?;
    Ok(built)
}

/// [`commitlog`], rebuilding runs once if a reachable commit has none
pub async fn commitlog_repaired<S, A>(
    store: &S,
    adapter: &A,
    start_ids: &[Oid],
    batch_size: usize,
) -> Result<CommitLog>
where
    S: IndexStore,
    A: RepositoryImplementation + ?Sized,
{
    match commitlog(store, start_ids).await {
        Err(IndexError::MissingRun(commit_id)) => {
            tracing::warn!("No commit run contains {}, rebuilding runs", commit_id);
            rebuild_runs(store, adapter, batch_size).await?;
            commitlog(store, start_ids).await
        }
        other => other,
    }
}

/// Number of commits reachable from `commit_id`, itself included
pub async fn count_revisions<S, A>(
    store: &S,
    adapter: &A,
    commit_id: &str,
    batch_size: usize,
) -> Result<usize>
where
    S: IndexStore,
    A: RepositoryImplementation + ?Sized,
{
    let log = commitlog_repaired(store, adapter, &[commit_id.to_string()], batch_size).await?;
    Ok(log.graph_len())
}

/// Browsing operations for one repository
pub struct RepoView<'a, S: IndexStore, A: RepositoryImplementation + ?Sized> {
    store: &'a S,
    adapter: &'a A,
    repo: &'a RepoHandle,
    config: IndexConfig,
}

impl<'a, S: IndexStore, A: RepositoryImplementation + ?Sized> RepoView<'a, S, A> {
    pub fn new(store: &'a S, adapter: &'a A, repo: &'a RepoHandle) -> Self {
        Self {
            store,
            adapter,
            repo,
            config: IndexConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve a ref name (head, branch or tag) to its commit id; anything
    /// else is taken as a commit id
    pub fn resolve(&self, rev: &str) -> Oid {
        self.repo
            .refs
            .iter()
            .find(|r| r.name == rev)
            .map(|r| r.object_id.clone())
            .unwrap_or_else(|| rev.to_string())
    }

    pub async fn commit(&self, rev: &str) -> Result<Option<Commit>> {
        self.store.get_commit(&self.resolve(rev)).await
    }

    async fn require_commit(&self, rev: &str) -> Result<Commit> {
        let commit_id = self.resolve(rev);
        self.store
            .get_commit(&commit_id)
            .await?
            .ok_or(IndexError::CommitNotFound(commit_id))
    }

    /// Newest commit of `branch`, or of the repository head
    pub async fn latest(&self, branch: Option<&str>) -> Result<Option<Commit>> {
        let target = match branch {
            Some(name) => self
                .repo
                .refs
                .branches
                .iter()
                .find(|b| b.name == name)
                .map(|b| b.object_id.clone()),
            None => self.repo.head().map(|h| h.object_id.clone()),
        };
        match target {
            Some(id) => self.store.get_commit(&id).await,
            None => Ok(None),
        }
    }

    /// Commit ids newest first, starting at `rev`
    pub async fn log_ids(&self, rev: &str, skip: usize, count: usize) -> Result<Vec<Oid>> {
        let start = self.resolve(rev);
        let log = commitlog_repaired(self.store, self.adapter, &[start], self.config.batch_size)
            .await?;
        Ok(log.skip(skip).take(count).collect())
    }

    pub async fn log(&self, rev: &str, skip: usize, count: usize) -> Result<Vec<Commit>> {
        let ids = self.log_ids(rev, skip, count).await?;
        self.commits_in_order(&ids).await
    }

    pub async fn count(&self, rev: &str) -> Result<usize> {
        self.count_revisions(&self.resolve(rev)).await
    }

    pub async fn count_revisions(&self, commit_id: &str) -> Result<usize> {
        count_revisions(self.store, self.adapter, commit_id, self.config.batch_size).await
    }

    /// Parents as `prev`, children as `next`
    pub async fn context(&self, rev: &str) -> Result<CommitContext> {
        let commit = self.require_commit(rev).await?;
        Ok(CommitContext {
            prev: self.commits_in_order(&commit.parent_ids).await?,
            next: self.commits_in_order(&commit.child_ids).await?,
        })
    }

    async fn commits_in_order(&self, ids: &[Oid]) -> Result<Vec<Commit>> {
        let mut by_id: FxHashMap<Oid, Commit> = FxHashMap::default();
        for chunk in ids.chunks(self.config.batch_size) {
            for commit in self.store.get_commits(chunk).await? {
                by_id.insert(commit.id.clone(), commit);
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Root tree id of a commit, synthesizing and storing it if absent
    pub async fn ensure_tree(&self, commit: &Commit) -> Result<Option<Oid>> {
        if let Some(tree_id) = &commit.tree_id {
            if self.store.get_tree(tree_id).await?.is_some() {
                return Ok(Some(tree_id.clone()));
            }
        }
        let Some(snapshot) = self.adapter.compute_tree(commit, "/")? else {
            return Ok(None);
        };
        self.store.insert_trees(&snapshot.trees).await?;
        if commit.tree_id.as_deref() != Some(snapshot.root_id.as_str()) {
            self.store.set_commit_tree(&commit.id, &snapshot.root_id).await?;
        }
        Ok(Some(snapshot.root_id))
    }

    /// The tree or blob at `path` in `rev`; None if the path does not exist
    pub async fn get_path(&self, rev: &str, path: &str) -> Result<Option<RepoObject>> {
        let commit = self.require_commit(rev).await?;
        let Some(root_id) = self.ensure_tree(&commit).await? else {
            return Ok(None);
        };
        let parts = path_parts(path);
        let mut tree = self
            .store
            .get_tree(&root_id)
            .await?
            .ok_or(IndexError::TreeNotFound(root_id))?;

        for (depth, part) in parts.iter().enumerate() {
            let Some(entry) = tree.get(part).cloned() else {
                return Ok(None);
            };
            let is_last = depth + 1 == parts.len();
            match entry.kind {
                ObjectKind::Tree => {
                    tree = self
                        .store
                        .get_tree(&entry.id)
                        .await?
                        .ok_or(IndexError::TreeNotFound(entry.id))?;
                }
                ObjectKind::Blob if is_last => {
                    return Ok(Some(RepoObject::Blob(ResolvedBlob {
                        blob: Blob::new(entry.id, entry.name),
                        commit_id: commit.id,
                        path: format!("/{}", parts.join("/")),
                    })));
                }
                _ => return Ok(None),
            }
        }

        Ok(Some(RepoObject::Tree(ResolvedTree {
            tree,
            commit_id: commit.id,
            path: dir_path(&parts),
        })))
    }

    /// Directory listing (subdirectories, files, then other entries, each by
    /// name) with the last commit that touched each entry
    pub async fn ls(&self, rev: &str, path: &str) -> Result<Vec<LsEntry>> {
        let Some(RepoObject::Tree(resolved)) = self.get_path(rev, path).await? else {
            return Ok(Vec::new());
        };

        let by_name: FxHashMap<String, LastCommit> = self
            .store
            .last_commits_in_dir(&self.repo.id, &resolved.path)
            .await?
            .into_iter()
            .map(|lc| (lc.name.clone(), lc))
            .collect();

        let unmatched: Vec<Oid> = resolved
            .tree
            .entries
            .iter()
            .filter(|e| by_name.get(&e.name).is_none_or(|lc| lc.object_id != e.id))
            .map(|e| e.id.clone())
            .collect();
        let mut by_object: FxHashMap<Oid, CommitInfo> = FxHashMap::default();
        for chunk in unmatched.chunks(self.config.batch_size) {
            for lc in self.store.last_commits_by_object(&self.repo.id, chunk).await? {
                by_object.entry(lc.object_id).or_insert(lc.info);
            }
        }

        let mut entries: Vec<LsEntry> = resolved
            .tree
            .entries
            .iter()
            .map(|e| {
                let last_commit = match by_name.get(&e.name) {
                    Some(lc) if lc.object_id == e.id => Some(lc.info.clone()),
                    _ => by_object.get(&e.id).cloned(),
                };
                LsEntry {
                    kind: e.kind,
                    name: e.name.clone(),
                    id: e.id.clone(),
                    last_commit,
                }
            })
            .collect();
        entries.sort_by(|a, b| kind_rank(a.kind).cmp(&kind_rank(b.kind)).then(a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Added/removed/changed/copied paths of a commit. Diffs missing from the
    /// store (lazy backends) are computed and cached.
    pub async fn diffs(&self, rev: &str) -> Result<CommitDiffs> {
        let mut commit = self.require_commit(rev).await?;
        let mut engine = DiffEngine::new(self.store, self.adapter)
            .similarity_threshold(self.config.similarity_threshold);

        let info = match self.store.get_diff_info(&commit.id).await? {
            Some(info) => info,
            None => {
                commit.tree_id = self.ensure_tree(&commit).await?;
                if let Some(parent_id) = commit.first_parent() {
                    if let Some(parent) = self.store.get_commit(parent_id).await? {
                        self.ensure_tree(&parent).await?;
                    }
                }
                let info = engine.compute_diffs(&commit).await?;
                self.store.save_diff_info(&info).await?;
                info
            }
        };

        Ok(if self.config.detect_renames {
            engine.detect_copies(&info)
        } else {
            info.partition()
        })
    }

    /// Last commit recorded for a tree or blob reached through a path
    pub async fn get_last_commit(&self, object: &RepoObject) -> Result<Option<CommitInfo>> {
        let (path, object_id) = match object {
            RepoObject::Commit(_) => return Ok(None),
            RepoObject::Tree(t) => (t.path.as_str(), t.tree.id.as_str()),
            RepoObject::Blob(b) => (b.path.as_str(), b.blob.id.as_str()),
        };
        let parts = path_parts(path);
        if let Some((name, dirs)) = parts.split_last() {
            if let Some(lc) = self
                .store
                .get_last_commit(&self.repo.id, &dir_path(dirs), name)
                .await?
            {
                return Ok(Some(lc.info));
            }
        }
        let legacy = self
            .store
            .last_commits_by_object(&self.repo.id, &[object_id.to_string()])
            .await?;
        Ok(legacy.into_iter().next().map(|lc| lc.info))
    }
}

fn kind_rank(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Tree => 0,
        ObjectKind::Blob => 1,
        ObjectKind::Other => 2,
    }
}
