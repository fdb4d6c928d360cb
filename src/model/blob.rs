use crate::util::blob_extension;

use super::commit::{Commit, Oid};
use super::tree::Tree;

/// File content identity. Content itself is fetched from the adapter on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub id: Oid,
    pub name: String,
    pub extension: String,
}

impl Blob {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let extension = blob_extension(&name).to_string();
        Self {
            id: id.into(),
            name,
            extension,
        }
    }
}

/// A tree reached through a commit, with the path it was reached by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTree {
    pub tree: Tree,
    pub commit_id: Oid,
    /// "/" for the root, "/a/b/" below it
    pub path: String,
}

/// A blob reached through a commit's tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBlob {
    pub blob: Blob,
    pub commit_id: Oid,
    /// Full path, e.g. "/src/main.rs"
    pub path: String,
}

/// Any object addressable inside a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoObject {
    Commit(Commit),
    Tree(ResolvedTree),
    Blob(ResolvedBlob),
}

impl RepoObject {
    pub fn id(&self) -> &str {
        match self {
            RepoObject::Commit(c) => &c.id,
            RepoObject::Tree(t) => &t.tree.id,
            RepoObject::Blob(b) => &b.blob.id,
        }
    }

    pub fn as_tree(&self) -> Option<&ResolvedTree> {
        match self {
            RepoObject::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&ResolvedBlob> {
        match self {
            RepoObject::Blob(b) => Some(b),
            _ => None,
        }
    }
}
