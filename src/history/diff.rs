//! Tree diffs and rename detection
//!
//! A commit's diff is the set of paths whose object ids differ between its
//! tree and its first parent's tree. One-sided directories are reported as a
//! single entry rather than expanded.

use rustc_hash::FxHashMap;
use similar::{Algorithm, TextDiff};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::RepositoryImplementation;
use crate::error::{IndexError, Result};
use crate::model::{Commit, CommitDiffs, CopiedPath, DiffEntry, DiffInfo, ObjectKind, Oid, Tree};
use crate::repository::IndexStore;
use crate::util::join_diff_path;

/// Character-level similarity above this combined size falls back to lines
const CHAR_DIFF_LIMIT: usize = 64 * 1024;
/// Upper bound on cached trees before the cache is dropped
const TREE_CACHE_LIMIT: usize = 20_000;

/// Read-through cache over stored trees
pub struct TreeCache<'a, S: IndexStore> {
    store: &'a S,
    trees: FxHashMap<Oid, Arc<Tree>>,
}

impl<'a, S: IndexStore> TreeCache<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            trees: FxHashMap::default(),
        }
    }

    pub async fn get(&mut self, tree_id: &str) -> Result<Arc<Tree>> {
        if let Some(tree) = self.trees.get(tree_id) {
            return Ok(Arc::clone(tree));
        }
        let tree = self
            .store
            .get_tree(tree_id)
            .await?
            .ok_or_else(|| IndexError::TreeNotFound(tree_id.to_string()))?;
        if self.trees.len() >= TREE_CACHE_LIMIT {
            self.trees.clear();
        }
        let tree = Arc::new(tree);
        self.trees.insert(tree_id.to_string(), Arc::clone(&tree));
        Ok(tree)
    }

    /// The stored tree, or an empty one when `tree_id` is None
    pub async fn get_or_empty(&mut self, tree_id: Option<&str>) -> Result<Arc<Tree>> {
        match tree_id {
            Some(id) => self.get(id).await,
            None => Ok(Arc::new(Tree::empty())),
        }
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

/// Computes per-commit diffs from stored trees and matches renames using
/// blob content from the adapter.
pub struct DiffEngine<'a, S: IndexStore, A: RepositoryImplementation + ?Sized> {
    store: &'a S,
    adapter: &'a A,
    trees: TreeCache<'a, S>,
    similarity_threshold: f64,
}

impl<'a, S: IndexStore, A: RepositoryImplementation + ?Sized> DiffEngine<'a, S, A> {
    pub fn new(store: &'a S, adapter: &'a A) -> Self {
        Self {
            store,
            adapter,
            trees: TreeCache::new(store),
            similarity_threshold: 0.5,
        }
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn trees(&mut self) -> &mut TreeCache<'a, S> {
        &mut self.trees
    }

    /// Tree id of the commit's first parent, None for root commits
    pub async fn parent_tree_id(&self, commit: &Commit) -> Result<Option<Oid>> {
        let Some(parent_id) = commit.first_parent() else {
            return Ok(None);
        };
        let parent = self
            .store
            .get_commit(parent_id)
            .await?
            .ok_or_else(|| IndexError::CommitNotFound(parent_id.to_string()))?;
        Ok(parent.tree_id)
    }

    /// Diff against the first parent. Commits without a tree yet diff as empty.
    pub async fn compute_diffs(&mut self, commit: &Commit) -> Result<DiffInfo> {
        let Some(rhs) = commit.tree_id.as_deref() else {
            return Ok(DiffInfo {
                commit_id: commit.id.clone(),
                differences: Vec::new(),
            });
        };
        let lhs = self.parent_tree_id(commit).await?;
        let differences = self.diff_trees(lhs.as_deref(), rhs).await?;
        Ok(DiffInfo {
            commit_id: commit.id.clone(),
            differences,
        })
    }

    /// Lockstep walk of two trees by child name, sorted by path
    pub async fn diff_trees(&mut self, lhs: Option<&str>, rhs: &str) -> Result<Vec<DiffEntry>> {
        let mut out: Vec<DiffEntry> = Vec::new();
        let mut stack: Vec<(Option<Oid>, Oid, String)> =
            vec![(lhs.map(str::to_string), rhs.to_string(), String::new())];

        while let Some((lhs_id, rhs_id, prefix)) = stack.pop() {
            if lhs_id.as_deref() == Some(rhs_id.as_str()) {
                continue;
            }
            let lhs_tree = self.trees.get_or_empty(lhs_id.as_deref()).await?;
            let rhs_tree = self.trees.get(&rhs_id).await?;

            for rhs_entry in &rhs_tree.entries {
                let path = join_diff_path(&prefix, &rhs_entry.name);
                match lhs_tree.get(&rhs_entry.name) {
                    None => out.push(added(path, rhs_entry.id.clone(), rhs_entry.kind)),
                    Some(lhs_entry) if lhs_entry.id == rhs_entry.id => {}
                    Some(lhs_entry)
                        if lhs_entry.kind == ObjectKind::Tree
                            && rhs_entry.kind == ObjectKind::Tree =>
                    {
                        stack.push((Some(lhs_entry.id.clone()), rhs_entry.id.clone(), path));
                    }
                    Some(lhs_entry) if lhs_entry.kind == rhs_entry.kind => out.push(DiffEntry {
                        path,
                        lhs_id: Some(lhs_entry.id.clone()),
                        rhs_id: Some(rhs_entry.id.clone()),
                        kind: rhs_entry.kind,
                    }),
                    Some(lhs_entry) => {
                        // A file replaced by a directory (or the reverse)
                        out.push(removed(path.clone(), lhs_entry.id.clone(), lhs_entry.kind));
                        out.push(added(path, rhs_entry.id.clone(), rhs_entry.kind));
                    }
                }
            }
            for lhs_entry in &lhs_tree.entries {
                if rhs_tree.get(&lhs_entry.name).is_none() {
                    let path = join_diff_path(&prefix, &lhs_entry.name);
                    out.push(removed(path, lhs_entry.id.clone(), lhs_entry.kind));
                }
            }
        }

        out.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.is_added().cmp(&b.is_added()))
        });
        Ok(out)
    }

    /// Partition a diff, pairing removed paths with added ones by similarity.
    ///
    /// Directories pair only with identical directories. Unreadable or binary
    /// blobs never pair unless byte-identical.
    pub fn detect_copies(&self, info: &DiffInfo) -> CommitDiffs {
        let mut diffs = info.partition();
        diffs.removed.clear();
        diffs.added.clear();

        let mut added: Vec<&DiffEntry> = info
            .differences
            .iter()
            .filter(|e| e.is_added() && !e.is_removed())
            .collect();

        for old in info.differences.iter().filter(|e| e.is_removed() && !e.is_added()) {
            match self.best_match(old, &added) {
                Some((index, ratio)) => {
                    let new = added.remove(index);
                    diffs.copied.push(CopiedPath {
                        old: old.path.clone(),
                        new: new.path.clone(),
                        ratio,
                        diff: self.copy_diff(old, new, ratio),
                    });
                }
                None => diffs.removed.push(old.path.clone()),
            }
        }
        diffs.added = added.into_iter().map(|e| e.path.clone()).collect();
        diffs
    }

    fn best_match(&self, old: &DiffEntry, candidates: &[&DiffEntry]) -> Option<(usize, f64)> {
        let old_id = old.lhs_id.as_deref()?;
        let old_data = match old.kind {
            ObjectKind::Blob => Some(self.read_blob(old_id)?),
            _ => None,
        };

        let mut best: Option<(usize, f64)> = None;
        for (index, new) in candidates.iter().enumerate() {
            if new.kind != old.kind {
                continue;
            }
            let Some(new_id) = new.rhs_id.as_deref() else {
                continue;
            };
            let ratio = match &old_data {
                Some(old_data) => match self.read_blob(new_id) {
                    Some(new_data) => similarity(old_data, &new_data),
                    None => 0.0,
                },
                None if new_id == old_id => 1.0,
                None => 0.0,
            };
            if ratio > self.similarity_threshold && best.is_none_or(|(_, r)| ratio > r) {
                best = Some((index, ratio));
                if ratio >= 1.0 {
                    break;
                }
            }
        }
        best
    }

    fn copy_diff(&self, old: &DiffEntry, new: &DiffEntry, ratio: f64) -> String {
        if ratio >= 1.0 || old.kind != ObjectKind::Blob {
            return String::new();
        }
        let (Some(old_id), Some(new_id)) = (old.lhs_id.as_deref(), new.rhs_id.as_deref()) else {
            return String::new();
        };
        let (Some(old_data), Some(new_data)) = (self.read_blob(old_id), self.read_blob(new_id))
        else {
            return String::new();
        };
        match (as_text(&old_data), as_text(&new_data)) {
            (Some(a), Some(b)) => unified_diff(a, b, &old.path, &new.path),
            _ => String::new(),
        }
    }

    fn read_blob(&self, blob_id: &str) -> Option<Vec<u8>> {
        let mut data = Vec::new();
        let read = self
            .adapter
            .open_blob(blob_id)
            .and_then(|mut reader| Ok(reader.read_to_end(&mut data)?));
        match read {
            Ok(_) => Some(data),
            Err(e) => {
                tracing::debug!("Cannot read blob {}: {:#}", blob_id, e);
                None
            }
        }
    }
}

fn added(path: String, id: Oid, kind: ObjectKind) -> DiffEntry {
    DiffEntry {
        path,
        lhs_id: None,
        rhs_id: Some(id),
        kind,
    }
}

fn removed(path: String, id: Oid, kind: ObjectKind) -> DiffEntry {
    DiffEntry {
        path,
        lhs_id: Some(id),
        rhs_id: None,
        kind,
    }
}

fn as_text(data: &[u8]) -> Option<&str> {
    if data.contains(&0) {
        return None;
    }
    std::str::from_utf8(data).ok()
}

/// LCS-based similarity in [0, 1]. Binary content only matches itself.
pub fn similarity(a: &[u8], b: &[u8]) -> f64 {
    if a == b {
        return 1.0;
    }
    let (Some(a), Some(b)) = (as_text(a), as_text(b)) else {
        return 0.0;
    };
    let mut config = TextDiff::configure();
    config
        .algorithm(Algorithm::Myers)
        .timeout(Duration::from_secs(1));
    let diff = if a.len() + b.len() <= CHAR_DIFF_LIMIT {
        config.diff_chars(a, b)
    } else {
        config.diff_lines(a, b)
    };
    diff.ratio() as f64
}

/// Unified diff with `a/` and `b/` path headers
pub fn unified_diff(old: &str, new: &str, old_path: &str, new_path: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(&format!("a/{}", old_path), &format!("b/{}", new_path))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_identical_and_disjoint() {
        assert_eq!(similarity(b"hello\n", b"hello\n"), 1.0);
        assert_eq!(similarity(b"aaaa", b"zzzz"), 0.0);
    }

    #[test]
    fn test_similarity_minor_edit_is_high() {
        let a = b"line one\nline two\nline three\n";
        let b = b"line one\nline 2\nline three\n";
        let ratio = similarity(a, b);
        assert!(ratio > 0.8 && ratio < 1.0, "ratio {}", ratio);
    }

    #[test]
    fn test_similarity_binary_only_matches_itself() {
        assert_eq!(similarity(b"\0abc", b"\0abd"), 0.0);
        assert_eq!(similarity(b"\0abc", b"\0abc"), 1.0);
        assert_eq!(similarity(&[0xff, 0xfe], b"text"), 0.0);
    }

    #[test]
    fn test_unified_diff_headers() {
        let text = unified_diff("a\nb\n", "a\nc\n", "old.txt", "new.txt");
        assert!(text.starts_with("--- a/old.txt\n+++ b/new.txt\n"));
        assert!(text.contains("-b\n"));
        assert!(text.contains("+c\n"));
    }
}
