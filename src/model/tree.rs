use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::commit::Oid;

/// Kind of a tree child
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Tree,
    Blob,
    /// Submodules and anything else the backend reports
    Other,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Other => "other",
        }
    }
}

/// One named child of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub id: Oid,
    pub kind: ObjectKind,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, id: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            kind,
        }
    }
}

/// A directory snapshot, content-addressed and shared between commits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub id: Oid,
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(id: impl Into<String>, entries: Vec<TreeEntry>) -> Self {
        Self {
            id: id.into(),
            entries,
        }
    }

    /// Stand-in for the parent tree of a root commit
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn subtrees(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.kind == ObjectKind::Tree)
    }

    pub fn blobs(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.kind == ObjectKind::Blob)
    }

    /// Hash over the sorted entry lines; not a real VCS hash
    pub fn compute_hash(&self) -> String {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}{}{}", e.kind.as_str(), e.name, e.id))
            .collect();
        lines.sort();

        let mut hasher = Sha1::new();
        for line in &lines {
            hasher.update(line.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
