//! Merge requests between a fork and its upstream

use rustc_hash::FxHashSet;
use std::collections::VecDeque;

use crate::error::{IndexError, Result};
use crate::model::{Commit, MergeRequest, MergeStatus, Oid};
use crate::repository::IndexStore;

/// Give up on allocating a request number after this many collisions
const MAX_NUMBER_ATTEMPTS: usize = 100;

/// Fields of a new merge request; the number is allocated on insert
#[derive(Debug, Clone)]
pub struct NewMergeRequest {
    pub target_repo_id: String,
    pub downstream_repo_id: String,
    pub commit_id: Oid,
    pub target_branch: String,
    pub summary: String,
    pub description: String,
    pub creator: String,
    pub created: i64,
}

/// Store `request` under the next free number of its target repository.
///
/// Numbering starts at the current count plus one and moves up on each
/// duplicate, so concurrent creators end up with distinct numbers.
pub async fn create_merge_request(
    store: &impl IndexStore,
    request: NewMergeRequest,
) -> Result<MergeRequest> {
    let mut number = store.count_merge_requests(&request.target_repo_id).await? + 1;
    let mut merge_request = MergeRequest {
        target_repo_id: request.target_repo_id,
        request_number: number,
        status: MergeStatus::Open,
        downstream_repo_id: request.downstream_repo_id,
        commit_id: request.commit_id,
        target_branch: request.target_branch,
        summary: request.summary,
        description: request.description,
        creator: request.creator,
        created: request.created,
    };

    for _ in 0..MAX_NUMBER_ATTEMPTS {
        merge_request.request_number = number;
        if store.insert_merge_request(&merge_request).await? {
            tracing::info!(
                "Created merge request #{} on {}",
                number,
                merge_request.target_repo_id
            );
            return Ok(merge_request);
        }
        number += 1;
    }
    Err(IndexError::MergeRequestNumbers {
        repo_id: merge_request.target_repo_id,
        attempts: MAX_NUMBER_ATTEMPTS,
    })
}

/// Commits the request would bring in: everything reachable from its commit
/// that the target repository does not already reference, newest first
pub async fn merge_request_commits(
    store: &impl IndexStore,
    request: &MergeRequest,
) -> Result<Vec<Commit>> {
    let mut result: Vec<Commit> = Vec::new();
    let mut seen: FxHashSet<Oid> = FxHashSet::default();
    let mut next: VecDeque<Oid> = VecDeque::from([request.commit_id.clone()]);

    while let Some(commit_id) = next.pop_front() {
        if !seen.insert(commit_id.clone()) {
            continue;
        }
        let commit = store
            .get_commit(&commit_id)
            .await?
            .ok_or_else(|| IndexError::CommitNotFound(commit_id.clone()))?;
        if commit.repo_ids.contains(&request.target_repo_id) {
            continue;
        }
        next.extend(commit.parent_ids.iter().cloned());
        result.push(commit);
    }
    Ok(result)
}

/// Update the stored status and the in-memory copy
pub async fn set_merge_request_status(
    store: &impl IndexStore,
    request: &mut MergeRequest,
    status: MergeStatus,
) -> Result<()> {
    store
        .set_merge_request_status(&request.target_repo_id, request.request_number, status)
        .await?;
    request.status = status;
    Ok(())
}
