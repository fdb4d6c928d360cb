//! Git adapter backed by gix

use anyhow::{anyhow, Context, Result};
use gix::prelude::FindExt;
use gix::ObjectId;
use rustc_hash::FxHashSet;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::model::{Commit, HeadRef, ObjectKind, Oid, RefSet, Signature, Tool, Tree, TreeEntry};

use super::{NativeCommit, RepositoryImplementation, TreeSnapshot};

type RefIterError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Buffer pool for reusing decode buffers across tree recursion
#[derive(Default)]
struct BufferPool {
    buffers: Vec<Vec<u8>>,
}

impl BufferPool {
    fn take(&mut self) -> Vec<u8> {
        self.buffers
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(8 * 1024))
    }

    fn give(&mut self, mut buf: Vec<u8>) {
        buf.clear();
        self.buffers.push(buf);
    }
}

/// Read-only view of a git repository on disk
pub struct GitAdapter {
    repo: gix::Repository,
    path: PathBuf,
}

impl GitAdapter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let repo = gix::open(&path)
            .with_context(|| format!("Failed to open git repository at {}", path.display()))?;
        Ok(Self { repo, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_id(id: &str) -> Result<ObjectId> {
        ObjectId::from_hex(id.as_bytes()).with_context(|| format!("Invalid object id: {}", id))
    }

    /// Resolve a branch, tag or hex id to a commit id
    pub fn resolve(&self, rev: &str) -> Result<Oid> {
        let refs = self.refs()?;
        if let Some(r) = refs.iter().find(|r| r.name == rev) {
            return Ok(r.object_id.clone());
        }
        Self::parse_id(rev).map(|id| id.to_hex().to_string())
    }

    fn collect_refs<'r>(
        iter: impl Iterator<Item = std::result::Result<gix::Reference<'r>, RefIterError>>,
    ) -> Result<Vec<HeadRef>> {
        let mut out = Vec::new();
        for reference in iter {
            let reference = reference.map_err(|e| anyhow!("Failed to read reference: {}", e))?;
            let name = reference.name().shorten().to_string();
            let id = reference
                .into_fully_peeled_id()
                .with_context(|| format!("Failed to peel {}", name))?;
            out.push(HeadRef::new(name, id.to_hex().to_string()));
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn read_tree(
        &self,
        tree_id: ObjectId,
        seen: &mut FxHashSet<Oid>,
        pool: &mut BufferPool,
        out: &mut Vec<Tree>,
    ) -> Result<()> {
        let hex_id = tree_id.to_hex().to_string();
        if !seen.insert(hex_id.clone()) {
            return Ok(());
        }

        let mut buf = pool.take();
        let tree = self
            .repo
            .objects
            .find_tree(&tree_id, &mut buf)
            .with_context(|| format!("Failed to read tree {}", hex_id))?;

        let mut entries = Vec::with_capacity(tree.entries.len());
        let mut subtrees = Vec::new();
        for entry in tree.entries.iter() {
            let oid = entry.oid.to_owned();
            let kind = if entry.mode.is_tree() {
                subtrees.push(oid);
                ObjectKind::Tree
            } else if entry.mode.is_blob() {
                ObjectKind::Blob
            } else {
                ObjectKind::Other
            };
            entries.push(TreeEntry::new(
                entry.filename.to_string(),
                oid.to_hex().to_string(),
                kind,
            ));
        }
        pool.give(buf);

        for sub in subtrees {
            self.read_tree(sub, seen, pool, out)?;
        }
        out.push(Tree::new(hex_id, entries));
        Ok(())
    }
}

impl RepositoryImplementation for GitAdapter {
    fn tool(&self) -> Tool {
        Tool::Git
    }

    fn refs(&self) -> Result<RefSet> {
        let platform = self.repo.references().context("Failed to list references")?;
        let branches = Self::collect_refs(platform.local_branches()?)?;
        let tags = Self::collect_refs(platform.tags()?)?;
        // An unborn HEAD simply has no head ref yet
        let heads = match self.repo.head_id() {
            Ok(id) => vec![HeadRef::new("HEAD", id.detach().to_hex().to_string())],
            Err(_) => Vec::new(),
        };
        Ok(RefSet {
            heads,
            branches,
            tags,
        })
    }

    fn native_commit(&self, commit_id: &str) -> Result<NativeCommit> {
        let oid = Self::parse_id(commit_id)?;
        let mut buf = Vec::new();
        let commit = self
            .repo
            .objects
            .find_commit(&oid, &mut buf)
            .with_context(|| format!("Failed to read commit {}", commit_id))?;
        Ok(NativeCommit {
            id: commit_id.to_string(),
            parent_ids: commit.parents().map(|p| p.to_hex().to_string()).collect(),
        })
    }

    fn commit_info(&self, commit_id: &str) -> Result<Commit> {
        let oid = Self::parse_id(commit_id)?;
        let mut buf = Vec::new();
        let commit = self
            .repo
            .objects
            .find_commit(&oid, &mut buf)
            .with_context(|| format!("Failed to read commit {}", commit_id))?;

        let author = commit
            .author()
            .with_context(|| format!("Bad author in {}", commit_id))?;
        let committer = commit
            .committer()
            .with_context(|| format!("Bad committer in {}", commit_id))?;

        Ok(Commit {
            id: commit_id.to_string(),
            tree_id: Some(commit.tree().to_hex().to_string()),
            authored: Signature::new(
                author.name.to_string(),
                author.email.to_string(),
                author.seconds(),
            ),
            committed: Signature::new(
                committer.name.to_string(),
                committer.email.to_string(),
                committer.seconds(),
            ),
            message: commit.message.to_string(),
            parent_ids: commit.parents().map(|p| p.to_hex().to_string()).collect(),
            child_ids: Vec::new(),
            repo_ids: Vec::new(),
        })
    }

    fn tree_snapshot(&self, tree_id: &str, seen: &mut FxHashSet<Oid>) -> Result<Vec<Tree>> {
        let mut out = Vec::new();
        let mut pool = BufferPool::default();
        self.read_tree(Self::parse_id(tree_id)?, seen, &mut pool, &mut out)?;
        Ok(out)
    }

    /// Git trees are native; this walks down to `path` in the commit's tree
    fn compute_tree(&self, commit: &Commit, path: &str) -> Result<Option<TreeSnapshot>> {
        let Some(root) = commit.tree_id.as_deref() else {
            return Ok(None);
        };
        let mut seen = FxHashSet::default();
        let trees = self.tree_snapshot(root, &mut seen)?;

        let mut current = root.to_string();
        for part in crate::util::path_parts(path) {
            let next = trees
                .iter()
                .find(|t| t.id == current)
                .and_then(|t| t.get(part))
                .filter(|e| e.kind == ObjectKind::Tree)
                .map(|e| e.id.clone());
            match next {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        Ok(Some(TreeSnapshot {
            root_id: current,
            trees,
        }))
    }

    fn open_blob(&self, blob_id: &str) -> Result<Box<dyn Read + '_>> {
        let oid = Self::parse_id(blob_id)?;
        let mut buf = Vec::new();
        let blob = self
            .repo
            .objects
            .find_blob(&oid, &mut buf)
            .with_context(|| format!("Failed to read blob {}", blob_id))?;
        Ok(Box::new(Cursor::new(blob.data.to_vec())))
    }
}
