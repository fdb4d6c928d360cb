//! Refresh notifications and feed entries

use serde::Serialize;

use crate::model::summarize;

/// One newly indexed commit, as posted to an activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub summary: String,
    pub author: String,
    pub link: String,
}

/// Per-commit input for building a [`RefreshSummary`]
#[derive(Debug, Clone)]
pub struct CommitNotice {
    pub author: String,
    pub message: String,
    pub branches: Vec<String>,
    pub url: String,
}

/// The "repository refreshed" message for one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub repo_name: String,
    pub commit_count: usize,
    pub heads: Vec<String>,
    pub subject: String,
    pub text: String,
}

impl RefreshSummary {
    /// Builds subject and text from the new commits, newest first
    pub fn build(repo_name: &str, heads: Vec<String>, notices: &[CommitNotice]) -> Self {
        let (subject, text) = match notices {
            [] => (format!("No new commits to {}", repo_name), String::new()),
            [only] => (
                format!(
                    "{} committed to {}: {}",
                    only.author,
                    repo_name,
                    summarize(&only.message)
                ),
                format!("{}: {} {}", only.branches.join(","), only.message, only.url),
            ),
            many => {
                let text = many
                    .iter()
                    .map(|n| {
                        format!(
                            "{}: {} by {} {}",
                            n.branches.join(","),
                            summarize(&n.message),
                            n.author,
                            n.url
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (format!("{} new commits to {}", many.len(), repo_name), text)
            }
        };
        Self {
            repo_name: repo_name.to_string(),
            commit_count: notices.len(),
            heads,
            subject,
            text,
        }
    }
}

/// Receiver for refresh events. Failures are logged by the caller, never fatal.
pub trait RefreshNotifier {
    fn feed(&self, entry: &FeedEntry) -> anyhow::Result<()>;

    fn refreshed(&self, summary: &RefreshSummary) -> anyhow::Result<()>;
}

/// Writes events to the log
pub struct TracingNotifier;

impl RefreshNotifier for TracingNotifier {
    fn feed(&self, entry: &FeedEntry) -> anyhow::Result<()> {
        tracing::debug!(
            "{}: {} by {} ({})",
            entry.title,
            entry.summary,
            entry.author,
            entry.link
        );
        Ok(())
    }

    fn refreshed(&self, summary: &RefreshSummary) -> anyhow::Result<()> {
        tracing::info!("{}", summary.subject);
        Ok(())
    }
}
