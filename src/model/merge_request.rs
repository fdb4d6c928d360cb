use serde::{Deserialize, Serialize};

use super::commit::Oid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStatus {
    Open,
    Merged,
    Rejected,
}

impl MergeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStatus::Open => "open",
            MergeStatus::Merged => "merged",
            MergeStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "merged" => MergeStatus::Merged,
            "rejected" => MergeStatus::Rejected,
            _ => MergeStatus::Open,
        }
    }
}

/// Request to merge a downstream commit into a branch of the target repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub target_repo_id: String,
    /// Per-target sequence number, starting at 1
    pub request_number: i64,
    pub status: MergeStatus,
    pub downstream_repo_id: String,
    pub commit_id: Oid,
    pub target_branch: String,
    pub summary: String,
    pub description: String,
    pub creator: String,
    /// Unix seconds
    pub created: i64,
}

impl MergeRequest {
    pub fn url(&self, url_prefix: &str) -> String {
        format!("{}merge-requests/{}/", url_prefix, self.request_number)
    }
}
