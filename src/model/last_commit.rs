use serde::Serialize;

use super::commit::{CommitInfo, Oid};
use super::tree::ObjectKind;

/// Most recent commit that changed `path + name` in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCommit {
    pub repo_id: String,
    /// Directory path: "/" or "/a/b/"
    pub path: String,
    pub name: String,
    /// Object id of the child at the time of the commit (legacy lookup key)
    pub object_id: Oid,
    pub info: CommitInfo,
}

impl LastCommit {
    pub fn key(&self) -> String {
        Self::make_key(&self.repo_id, &self.path, &self.name)
    }

    pub fn make_key(repo_id: &str, path: &str, name: &str) -> String {
        format!("{}:{}:{}", repo_id, path, name)
    }
}

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LsEntry {
    pub kind: ObjectKind,
    pub name: String,
    pub id: Oid,
    /// Missing when no refresh has recorded a change for this path yet
    pub last_commit: Option<CommitInfo>,
}
