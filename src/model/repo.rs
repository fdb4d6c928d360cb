use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::commit::Oid;

/// Version control system behind a repository
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Git,
    Hg,
    Svn,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Git => "git",
            Tool::Hg => "hg",
            Tool::Svn => "svn",
        }
    }

    /// Backends whose trees and diffs are too expensive to build eagerly
    pub fn lazy_trees(self) -> bool {
        matches!(self, Tool::Svn)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(Tool::Git),
            "hg" => Ok(Tool::Hg),
            "svn" => Ok(Tool::Svn),
            other => Err(format!("unknown tool: {}", other)),
        }
    }
}

/// Repository lifecycle state
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Empty,
    Analyzing,
    Ready,
}

impl RepoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RepoStatus::Empty => "empty",
            RepoStatus::Analyzing => "analyzing",
            RepoStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "analyzing" => RepoStatus::Analyzing,
            "ready" => RepoStatus::Ready,
            _ => RepoStatus::Empty,
        }
    }
}

/// A named ref and the commit it points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRef {
    pub name: String,
    pub object_id: Oid,
    /// Commits reachable from this ref; filled in after a refresh
    #[serde(default)]
    pub count: u64,
}

impl HeadRef {
    pub fn new(name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_id: object_id.into(),
            count: 0,
        }
    }
}

/// Heads, branches and tags of a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSet {
    pub heads: Vec<HeadRef>,
    pub branches: Vec<HeadRef>,
    pub tags: Vec<HeadRef>,
}

impl RefSet {
    pub fn iter(&self) -> impl Iterator<Item = &HeadRef> {
        self.heads
            .iter()
            .chain(self.branches.iter())
            .chain(self.tags.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HeadRef> {
        self.heads
            .iter_mut()
            .chain(self.branches.iter_mut())
            .chain(self.tags.iter_mut())
    }

    /// Distinct target commit ids, in ref order
    pub fn object_ids(&self) -> Vec<Oid> {
        let mut out: Vec<Oid> = Vec::new();
        for head in self.iter() {
            if !out.contains(&head.object_id) {
                out.push(head.object_id.clone());
            }
        }
        out
    }

    /// Branch and tag names pointing at `commit_id`
    pub fn symbolics_for(&self, commit_id: &str) -> (Vec<String>, Vec<String>) {
        let names = |refs: &[HeadRef]| {
            refs.iter()
                .filter(|r| r.object_id == commit_id)
                .map(|r| r.name.clone())
                .collect::<Vec<_>>()
        };
        (names(&self.branches), names(&self.tags))
    }
}

/// Short reference resolving to a commit URL within one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortlink {
    pub repo_id: String,
    pub link: String,
    pub ref_id: Oid,
    pub url: String,
}

/// Repository record owned by the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub id: String,
    pub name: String,
    pub tool: Tool,
    pub status: RepoStatus,
    pub refs: RefSet,
}

impl RepoHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tool: Tool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tool,
            status: RepoStatus::Empty,
            refs: RefSet::default(),
        }
    }

    pub fn head(&self) -> Option<&HeadRef> {
        self.refs.heads.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ids_deduplicated() {
        let refs = RefSet {
            heads: vec![HeadRef::new("HEAD", "c1")],
            branches: vec![HeadRef::new("main", "c1"), HeadRef::new("dev", "c2")],
            tags: vec![HeadRef::new("v1", "c2")],
        };
        assert_eq!(refs.object_ids(), vec!["c1", "c2"]);
        let (branches, tags) = refs.symbolics_for("c2");
        assert_eq!(branches, vec!["dev"]);
        assert_eq!(tags, vec!["v1"]);
    }

    #[test]
    fn test_tool_round_trip_and_laziness() {
        assert_eq!("hg".parse::<Tool>(), Ok(Tool::Hg));
        assert!("cvs".parse::<Tool>().is_err());
        assert!(Tool::Svn.lazy_trees());
        assert!(!Tool::Git.lazy_trees());
    }

    #[test]
    fn test_status_parse_defaults_to_empty() {
        assert_eq!(RepoStatus::parse("ready"), RepoStatus::Ready);
        assert_eq!(RepoStatus::parse("bogus"), RepoStatus::Empty);
    }
}
