use serde::{Deserialize, Serialize};

/// Native VCS object id (hex sha for git/hg, synthesized for svn)
pub type Oid = String;

const SUMMARY_LEN: usize = 50;

/// Name/email/time triple for authorship
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Unix seconds
    pub date: i64,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, date: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date,
        }
    }
}

/// Indexed commit metadata, keyed by the native commit id
///
/// `child_ids` and `repo_ids` are back-references maintained by refresh;
/// everything else is immutable once written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    pub id: Oid,
    /// None until computed for backends without native trees
    pub tree_id: Option<Oid>,
    pub authored: Signature,
    pub committed: Signature,
    pub message: String,
    pub parent_ids: Vec<Oid>,
    pub child_ids: Vec<Oid>,
    pub repo_ids: Vec<String>,
}

impl Commit {
    /// First line of the message, truncated for listings
    pub fn summary(&self) -> String {
        let first_line = self.message.split('\n').next().unwrap_or("");
        truncate(first_line.trim_end_matches('\r'), SUMMARY_LEN)
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }
}

/// Commit details denormalized into LastCommit records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: Oid,
    pub author: String,
    pub author_email: String,
    pub date: i64,
    pub shortlink: String,
    pub summary: String,
}

impl CommitInfo {
    pub fn from_commit(commit: &Commit, shortlink: String) -> Self {
        Self {
            id: commit.id.clone(),
            author: commit.authored.name.clone(),
            author_email: commit.authored.email.clone(),
            date: commit.authored.date,
            shortlink,
            summary: commit.summary(),
        }
    }
}

/// Joins the leading non-blank lines of a commit message
pub fn summarize(message: &str) -> String {
    message
        .lines()
        .map(str::trim_end)
        .take_while(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(text: &str, len: usize) -> String {
    const INDICATOR: &str = "...";
    if text.chars().count() <= len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(len - INDICATOR.len()).collect();
    out.push_str(INDICATOR);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_with_message(message: &str) -> Commit {
        Commit {
            id: "abc".into(),
            message: message.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_first_line() {
        let ci = commit_with_message("Fix parser\n\nLonger body here");
        assert_eq!(ci.summary(), "Fix parser");
    }

    #[test]
    fn test_summary_truncates_long_lines() {
        let ci = commit_with_message(&"x".repeat(80));
        let summary = ci.summary();
        assert_eq!(summary.chars().count(), 50);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_summarize_joins_leading_lines() {
        assert_eq!(summarize("one\ntwo  \n\nthree"), "one two");
        assert_eq!(summarize(""), "");
    }
}
