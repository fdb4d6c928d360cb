//! Git-style tree builder for backends without native tree objects

use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

use crate::model::{ObjectKind, Oid, Tree, TreeEntry};
use crate::util::path_parts;

/// Nested name -> subtree / name -> blob id maps with a stable content hash.
///
/// The hash is not a real git hash; it only has to be a stable function of
/// the tree contents so identical trees collapse to one stored `Tree`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitLikeTree {
    pub blobs: BTreeMap<String, Oid>,
    pub trees: BTreeMap<String, GitLikeTree>,
}

impl GitLikeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subtree at `path`, created if missing
    pub fn get_tree(&mut self, path: &str) -> &mut GitLikeTree {
        let mut cur = self;
        for part in path_parts(path) {
            cur = cur.trees.entry(part.to_string()).or_default();
        }
        cur
    }

    /// Read-only lookup of the subtree at `path`
    pub fn find_tree(&self, path: &str) -> Option<&GitLikeTree> {
        let mut cur = self;
        for part in path_parts(path) {
            cur = cur.trees.get(part)?;
        }
        Some(cur)
    }

    pub fn get_blob(&self, path: &str) -> Option<&Oid> {
        let parts = path_parts(path);
        let (name, dirs) = parts.split_last()?;
        let mut cur = self;
        for part in dirs {
            cur = cur.trees.get(*part)?;
        }
        cur.blobs.get(*name)
    }

    /// Set the blob at `path`, creating intermediate directories
    pub fn set_blob(&mut self, path: &str, oid: impl Into<Oid>) {
        let parts = path_parts(path);
        let Some((name, dirs)) = parts.split_last() else {
            return;
        };
        let mut cur = self;
        for part in dirs {
            cur = cur.trees.entry(part.to_string()).or_default();
        }
        cur.blobs.insert(name.to_string(), oid.into());
    }

    /// Remove the blob at `path`; directories left empty are pruned
    pub fn remove_blob(&mut self, path: &str) -> Option<Oid> {
        let parts = path_parts(path);
        self.remove_parts(&parts)
    }

    fn remove_parts(&mut self, parts: &[&str]) -> Option<Oid> {
        match parts {
            [] => None,
            [name] => self.blobs.remove(*name),
            [dir, rest @ ..] => {
                let sub = self.trees.get_mut(*dir)?;
                let removed = sub.remove_parts(rest);
                if sub.is_empty() {
                    self.trees.remove(*dir);
                }
                removed
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty() && self.trees.is_empty()
    }

    /// Sorted, newline-joined `t <hex> <name>` / `b <oid> <name>` lines
    pub fn repr(&self) -> String {
        let mut lines: Vec<String> = self
            .trees
            .iter()
            .map(|(name, t)| format!("t {} {}", t.hex(), name))
            .chain(self.blobs.iter().map(|(name, oid)| format!("b {} {}", oid, name)))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    /// Recursive SHA-1 of `"tree\n" + repr()`
    pub fn hex(&self) -> String {
        Self::hash_repr(&self.repr())
    }

    fn hash_repr(repr: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(b"tree\n");
        hasher.update(repr.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Flatten into stored trees (root last). Returns the root id.
    pub fn to_trees(&self, out: &mut Vec<Tree>) -> Oid {
        let mut entries: Vec<TreeEntry> = Vec::with_capacity(self.trees.len() + self.blobs.len());
        let mut lines: Vec<String> = Vec::with_capacity(entries.capacity());
        for (name, sub) in &self.trees {
            let id = sub.to_trees(out);
            lines.push(format!("t {} {}", id, name));
            entries.push(TreeEntry::new(name.as_str(), id, ObjectKind::Tree));
        }
        for (name, oid) in &self.blobs {
            lines.push(format!("b {} {}", oid, name));
            entries.push(TreeEntry::new(name.as_str(), oid.as_str(), ObjectKind::Blob));
        }
        lines.sort();
        let id = Self::hash_repr(&lines.join("\n"));
        out.push(Tree::new(id.clone(), entries));
        id
    }
}
