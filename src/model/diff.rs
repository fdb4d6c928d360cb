use serde::{Deserialize, Serialize};

use super::commit::Oid;
use super::tree::ObjectKind;

/// One path that differs between a commit's tree and its first parent's tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Slash-separated, no leading slash
    pub path: String,
    pub lhs_id: Option<Oid>,
    pub rhs_id: Option<Oid>,
    pub kind: ObjectKind,
}

impl DiffEntry {
    pub fn is_added(&self) -> bool {
        self.lhs_id.is_none()
    }

    pub fn is_removed(&self) -> bool {
        self.rhs_id.is_none()
    }
}

/// Stored per-commit diff (one per commit id)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffInfo {
    pub commit_id: Oid,
    pub differences: Vec<DiffEntry>,
}

/// A removed path matched to an added one by content similarity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopiedPath {
    pub old: String,
    pub new: String,
    pub ratio: f64,
    /// Unified diff between the two blobs; empty for exact renames
    pub diff: String,
}

/// Path-level change sets of a commit, as shown to users
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitDiffs {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub copied: Vec<CopiedPath>,
}

impl DiffInfo {
    /// Splits differences into added/removed/changed; `copied` is left empty
    pub fn partition(&self) -> CommitDiffs {
        let mut diffs = CommitDiffs::default();
        for entry in &self.differences {
            if entry.is_removed() {
                diffs.removed.push(entry.path.clone());
            } else if entry.is_added() {
                diffs.added.push(entry.path.clone());
            } else {
                diffs.changed.push(entry.path.clone());
            }
        }
        diffs
    }

    pub fn entry(&self, path: &str) -> Option<&DiffEntry> {
        self.differences.iter().find(|e| e.path == path)
    }
}
