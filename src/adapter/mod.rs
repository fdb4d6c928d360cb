//! Native VCS adapters
//!
//! The history engine sees a repository only through [`RepositoryImplementation`]:
//!
//! - **git**: [`GitAdapter`], native trees read through gix
//! - **memory**: [`MemoryAdapter`], scripted histories with synthesized trees
//! - **git_like_tree**: tree hashing shared by adapters without native trees

mod git;
mod git_like_tree;
mod memory;

pub use git::GitAdapter;
pub use git_like_tree::GitLikeTree;
pub use memory::MemoryAdapter;

use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::Read;

use crate::history::topological_sort;
use crate::model::{Commit, Oid, RefSet, Tool, Tree};

/// Commit identity plus parent links, as the native backend sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCommit {
    pub id: Oid,
    pub parent_ids: Vec<Oid>,
}

/// A synthesized tree and every subtree below it (root last)
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    pub root_id: Oid,
    pub trees: Vec<Tree>,
}

/// Read access to one native repository
pub trait RepositoryImplementation {
    fn tool(&self) -> Tool;

    /// Current heads, branches and tags
    fn refs(&self) -> Result<RefSet>;

    fn native_commit(&self, commit_id: &str) -> Result<NativeCommit>;

    fn commit_parents(&self, commit: &NativeCommit) -> Result<Vec<NativeCommit>> {
        commit
            .parent_ids
            .iter()
            .map(|id| self.native_commit(id))
            .collect()
    }

    /// Commits reachable from the refs, heads first in topological order.
    ///
    /// Unless `all` is set, the walk stops at commits in `known`.
    fn new_commits(&self, known: &FxHashSet<Oid>, all: bool) -> Result<Vec<NativeCommit>> {
        let mut graph: FxHashMap<Oid, Vec<Oid>> = FxHashMap::default();
        let mut natives: FxHashMap<Oid, NativeCommit> = FxHashMap::default();
        let mut to_visit: Vec<NativeCommit> = Vec::new();

        for id in self.refs()?.object_ids() {
            if all || !known.contains(&id) {
                to_visit.push(self.native_commit(&id)?);
            }
        }
        while let Some(commit) = to_visit.pop() {
            if graph.contains_key(&commit.id) {
                continue;
            }
            for parent in self.commit_parents(&commit)? {
                if !graph.contains_key(&parent.id) && (all || !known.contains(&parent.id)) {
                    to_visit.push(parent);
                }
            }
            graph.insert(commit.id.clone(), commit.parent_ids.clone());
            natives.insert(commit.id.clone(), commit);
        }

        let mut order = topological_sort(&graph)?;
        order.reverse();
        Ok(order
            .into_iter()
            .filter_map(|id| natives.remove(&id))
            .collect())
    }

    /// Every commit id, heads first in topological order
    fn all_commit_ids(&self) -> Result<Vec<Oid>> {
        Ok(self
            .new_commits(&FxHashSet::default(), true)?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    /// Commit metadata. `tree_id` is None for backends without native trees.
    fn commit_info(&self, commit_id: &str) -> Result<Commit>;

    /// Native trees reachable from `tree_id`, skipping (and extending) `seen`
    fn tree_snapshot(&self, _tree_id: &str, _seen: &mut FxHashSet<Oid>) -> Result<Vec<Tree>> {
        Ok(Vec::new())
    }

    /// Synthesize the tree at `path` of `commit`; None if the path is not a directory
    fn compute_tree(&self, commit: &Commit, path: &str) -> Result<Option<TreeSnapshot>>;

    fn open_blob(&self, blob_id: &str) -> Result<Box<dyn Read + '_>>;

    fn blob_size(&self, blob_id: &str) -> Result<u64> {
        let mut reader = self.open_blob(blob_id)?;
        Ok(std::io::copy(&mut reader, &mut std::io::sink())?)
    }

    /// Branch and tag names pointing at `commit_id`
    fn symbolics_for_commit(&self, refs: &RefSet, commit_id: &str) -> (Vec<String>, Vec<String>) {
        refs.symbolics_for(commit_id)
    }

    fn shorthand_for_commit(&self, commit_id: &str) -> String {
        let end = commit_id
            .char_indices()
            .nth(6)
            .map_or(commit_id.len(), |(i, _)| i);
        format!("[{}]", &commit_id[..end])
    }

    fn url_for_commit(&self, url_prefix: &str, commit_id: &str) -> String {
        format!("{}ci/{}/", url_prefix, commit_id)
    }
}
