//! In-memory repository for tests, benchmarks and non-git stand-ins

use anyhow::{anyhow, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use sha1::{Digest, Sha1};
use std::io::{Cursor, Read};

use crate::model::{Commit, HeadRef, Oid, RefSet, Signature, Tool, Tree};

use super::git_like_tree::GitLikeTree;
use super::{NativeCommit, RepositoryImplementation, TreeSnapshot};

const START_TIME: i64 = 1_600_000_000;

#[derive(Debug, Clone)]
struct MemCommit {
    parent_ids: Vec<Oid>,
    author: Signature,
    message: String,
    files: GitLikeTree,
}

/// Scripted history. Commits get increasing timestamps one minute apart.
///
/// With [`Tool::Git`] commits carry a synthesized tree id up front; with
/// `Hg`/`Svn` trees are only available through `compute_tree`.
pub struct MemoryAdapter {
    tool: Tool,
    commits: FxHashMap<Oid, MemCommit>,
    blobs: FxHashMap<Oid, Vec<u8>>,
    branches: Vec<HeadRef>,
    tags: Vec<HeadRef>,
    author: (String, String),
    clock: i64,
    /// Ids whose lookup fails, to exercise error paths
    broken: FxHashSet<Oid>,
}

impl MemoryAdapter {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            commits: FxHashMap::default(),
            blobs: FxHashMap::default(),
            branches: Vec::new(),
            tags: Vec::new(),
            author: ("Test User".to_string(), "test@example.com".to_string()),
            clock: START_TIME,
            broken: FxHashSet::default(),
        }
    }

    /// Author used for subsequent commits
    pub fn set_author(&mut self, name: &str, email: &str) {
        self.author = (name.to_string(), email.to_string());
    }

    fn branch_head(&self, branch: &str) -> Option<&HeadRef> {
        self.branches.iter().find(|b| b.name == branch)
    }

    pub fn head_of(&self, branch: &str) -> Option<Oid> {
        self.branch_head(branch).map(|b| b.object_id.clone())
    }

    /// Commit `files` on top of `branch` (created on first use)
    pub fn commit(&mut self, branch: &str, message: &str, files: &[(&str, &str)]) -> Oid {
        self.commit_changes(branch, message, files, &[])
    }

    /// Commit writes and removals on top of `branch`
    pub fn commit_changes(
        &mut self,
        branch: &str,
        message: &str,
        writes: &[(&str, &str)],
        removes: &[&str],
    ) -> Oid {
        let parent = self.head_of(branch);
        let mut files = parent
            .as_ref()
            .and_then(|p| self.commits.get(p))
            .map(|c| c.files.clone())
            .unwrap_or_default();
        for (path, content) in writes {
            let oid = self.store_blob(content.as_bytes());
            files.set_blob(path, oid);
        }
        for path in removes {
            files.remove_blob(path);
        }
        self.add_commit(branch, message, parent.into_iter().collect(), files)
    }

    /// Merge commit on `branch` with `other` as second parent; keeps `branch`'s files
    pub fn merge(&mut self, branch: &str, other: &str, message: &str) -> Oid {
        let mut parents: Vec<Oid> = Vec::new();
        parents.extend(self.head_of(branch));
        parents.extend(self.head_of(other));
        let files = parents
            .first()
            .and_then(|p| self.commits.get(p))
            .map(|c| c.files.clone())
            .unwrap_or_default();
        self.add_commit(branch, message, parents, files)
    }

    /// Point `name` at `commit_id`, creating or moving the branch
    pub fn branch(&mut self, name: &str, commit_id: &str) {
        self.set_ref(name, commit_id);
    }

    pub fn tag(&mut self, name: &str, commit_id: &str) {
        self.tags.retain(|t| t.name != name);
        self.tags.push(HeadRef::new(name, commit_id));
    }

    /// Make lookups of `commit_id` fail
    pub fn break_commit(&mut self, commit_id: &str) {
        self.broken.insert(commit_id.to_string());
    }

    fn set_ref(&mut self, name: &str, commit_id: &str) {
        match self.branches.iter_mut().find(|b| b.name == name) {
            Some(b) => b.object_id = commit_id.to_string(),
            None => self.branches.push(HeadRef::new(name, commit_id)),
        }
    }

    fn store_blob(&mut self, data: &[u8]) -> Oid {
        let mut hasher = Sha1::new();
        hasher.update(format!("blob {}\0", data.len()).as_bytes());
        hasher.update(data);
        let oid = hex::encode(hasher.finalize());
        self.blobs.entry(oid.clone()).or_insert_with(|| data.to_vec());
        oid
    }

    fn add_commit(
        &mut self,
        branch: &str,
        message: &str,
        parent_ids: Vec<Oid>,
        files: GitLikeTree,
    ) -> Oid {
        self.clock += 60;
        let author = Signature::new(self.author.0.as_str(), self.author.1.as_str(), self.clock);

        let mut hasher = Sha1::new();
        hasher.update(b"commit\n");
        hasher.update(files.hex().as_bytes());
        for parent in &parent_ids {
            hasher.update(parent.as_bytes());
        }
        hasher.update(self.clock.to_le_bytes());
        hasher.update(message.as_bytes());
        let id = hex::encode(hasher.finalize());

        self.commits.insert(
            id.clone(),
            MemCommit {
                parent_ids,
                author,
                message: message.to_string(),
                files,
            },
        );
        self.set_ref(branch, &id);
        id
    }

    fn get(&self, commit_id: &str) -> Result<&MemCommit> {
        if self.broken.contains(commit_id) {
            return Err(anyhow!("object {} is corrupt", commit_id));
        }
        self.commits
            .get(commit_id)
            .ok_or_else(|| anyhow!("unknown commit {}", commit_id))
    }
}

impl RepositoryImplementation for MemoryAdapter {
    fn tool(&self) -> Tool {
        self.tool
    }

    fn refs(&self) -> Result<RefSet> {
        let heads = self
            .branches
            .iter()
            .find(|b| b.name == "main" || b.name == "master")
            .or_else(|| self.branches.first())
            .map(|b| HeadRef::new("HEAD", b.object_id.as_str()))
            .into_iter()
            .collect();
        Ok(RefSet {
            heads,
            branches: self.branches.clone(),
            tags: self.tags.clone(),
        })
    }

    fn native_commit(&self, commit_id: &str) -> Result<NativeCommit> {
        let commit = self.get(commit_id)?;
        Ok(NativeCommit {
            id: commit_id.to_string(),
            parent_ids: commit.parent_ids.clone(),
        })
    }

    fn commit_info(&self, commit_id: &str) -> Result<Commit> {
        let commit = self.get(commit_id)?;
        let tree_id = match self.tool {
            Tool::Git => Some(commit.files.hex()),
            Tool::Hg | Tool::Svn => None,
        };
        Ok(Commit {
            id: commit_id.to_string(),
            tree_id,
            authored: commit.author.clone(),
            committed: commit.author.clone(),
            message: commit.message.clone(),
            parent_ids: commit.parent_ids.clone(),
            child_ids: Vec::new(),
            repo_ids: Vec::new(),
        })
    }

    fn tree_snapshot(&self, tree_id: &str, seen: &mut FxHashSet<Oid>) -> Result<Vec<Tree>> {
        if self.tool != Tool::Git {
            return Ok(Vec::new());
        }
        let files = self
            .commits
            .values()
            .map(|c| &c.files)
            .find(|f| f.hex() == tree_id)
            .ok_or_else(|| anyhow!("unknown tree {}", tree_id))?;
        let mut trees = Vec::new();
        files.to_trees(&mut trees);
        trees.retain(|t| seen.insert(t.id.clone()));
        Ok(trees)
    }

    fn compute_tree(&self, commit: &Commit, path: &str) -> Result<Option<TreeSnapshot>> {
        let native = self.get(&commit.id)?;
        let Some(sub) = native.files.find_tree(path) else {
            return Ok(None);
        };
        let mut trees = Vec::new();
        let root_id = sub.to_trees(&mut trees);
        Ok(Some(TreeSnapshot { root_id, trees }))
    }

    fn open_blob(&self, blob_id: &str) -> Result<Box<dyn Read + '_>> {
        let data = self
            .blobs
            .get(blob_id)
            .ok_or_else(|| anyhow!("unknown blob {}", blob_id))?;
        Ok(Box::new(Cursor::new(data.as_slice())))
    }

    fn blob_size(&self, blob_id: &str) -> Result<u64> {
        self.blobs
            .get(blob_id)
            .map(|d| d.len() as u64)
            .ok_or_else(|| anyhow!("unknown blob {}", blob_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_inherits_parent_files() {
        let mut repo = MemoryAdapter::new(Tool::Hg);
        let a = repo.commit("main", "first", &[("a.txt", "one"), ("dir/b.txt", "two")]);
        let b = repo.commit_changes("main", "second", &[("c.txt", "three")], &["a.txt"]);

        let info = repo.commit_info(&b).unwrap();
        assert_eq!(info.parent_ids, vec![a]);
        assert!(info.tree_id.is_none());

        let snapshot = repo.compute_tree(&info, "/").unwrap().unwrap();
        let root = snapshot.trees.last().unwrap();
        let names: Vec<&str> = root.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["dir", "c.txt"]);
        assert!(repo.compute_tree(&info, "missing").unwrap().is_none());
    }

    #[test]
    fn test_identical_content_shares_blob() {
        let mut repo = MemoryAdapter::new(Tool::Git);
        let a = repo.commit("main", "first", &[("x", "same"), ("y", "same")]);
        let info = repo.commit_info(&a).unwrap();
        let mut seen = FxHashSet::default();
        let trees = repo
            .tree_snapshot(info.tree_id.as_deref().unwrap(), &mut seen)
            .unwrap();
        let root = &trees[0];
        assert_eq!(root.entries[0].id, root.entries[1].id);
        assert_eq!(repo.blob_size(&root.entries[0].id).unwrap(), 4);

        // Already seen trees are skipped
        let again = repo
            .tree_snapshot(info.tree_id.as_deref().unwrap(), &mut seen)
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_broken_commit_errors() {
        let mut repo = MemoryAdapter::new(Tool::Git);
        let a = repo.commit("main", "first", &[("x", "1")]);
        repo.break_commit(&a);
        assert!(repo.commit_info(&a).is_err());
    }
}
