//! Index store trait for persistence abstraction
//!
//! Decouples the history engine from database implementation details.

use rustc_hash::FxHashSet;

use crate::error::Result;
use crate::model::{
    Commit, CommitRun, DiffInfo, LastCommit, MergeRequest, MergeStatus, Oid, RepoHandle,
    RepoStatus, Shortlink, Tree,
};

/// Persistence layer for indexed repository history
///
/// Every write is either content-addressed or an idempotent upsert, so any
/// operation may be retried after a failure.
#[allow(async_fn_in_trait)]
pub trait IndexStore {
    // Repositories

    async fn get_repo(&self, repo_id: &str) -> Result<Option<RepoHandle>>;

    /// Insert or replace the repository record, refs included
    async fn save_repo(&self, repo: &RepoHandle) -> Result<()>;

    async fn set_repo_status(&self, repo_id: &str, status: RepoStatus) -> Result<()>;

    // Commits

    async fn get_commit(&self, commit_id: &str) -> Result<Option<Commit>>;

    /// Commits for the given ids, in no particular order; unknown ids are skipped
    async fn get_commits(&self, commit_ids: &[Oid]) -> Result<Vec<Commit>>;

    /// The subset of `commit_ids` already present
    async fn known_commit_ids(&self, commit_ids: &[Oid]) -> Result<FxHashSet<Oid>>;

    /// Insert a new commit. Returns false if a commit with that id already exists.
    async fn insert_commit(&self, commit: &Commit) -> Result<bool>;

    /// Add `child_id` to the child set of every commit in `parent_ids`
    async fn add_child(&self, parent_ids: &[Oid], child_id: &str) -> Result<()>;

    async fn set_commit_tree(&self, commit_id: &str, tree_id: &str) -> Result<()>;

    /// Reference `repo_id` from every listed commit that does not yet do so.
    /// Returns the ids that were newly referenced.
    async fn add_repo_to_commits(&self, repo_id: &str, commit_ids: &[Oid]) -> Result<Vec<Oid>>;

    // Trees

    async fn get_tree(&self, tree_id: &str) -> Result<Option<Tree>>;

    /// Store trees, ignoring ids that already exist
    async fn insert_trees(&self, trees: &[Tree]) -> Result<()>;

    // Diffs

    async fn get_diff_info(&self, commit_id: &str) -> Result<Option<DiffInfo>>;

    async fn save_diff_info(&self, diff: &DiffInfo) -> Result<()>;

    // Commit runs

    /// A run containing `commit_id`, preferring the longest if several overlap
    async fn run_for_commit(&self, commit_id: &str) -> Result<Option<CommitRun>>;

    /// Runs that contain any of `commit_ids`
    async fn runs_containing(&self, commit_ids: &[Oid]) -> Result<Vec<CommitRun>>;

    /// Runs whose parent list mentions any of `commit_ids`
    async fn runs_with_parents(&self, commit_ids: &[Oid]) -> Result<Vec<CommitRun>>;

    /// Insert or replace runs by id
    async fn save_runs(&self, runs: &[CommitRun]) -> Result<()>;

    async fn delete_runs(&self, run_ids: &[Oid]) -> Result<()>;

    // Last commits

    /// Insert or overwrite records by key
    async fn save_last_commits(&self, records: &[LastCommit]) -> Result<()>;

    async fn get_last_commit(
        &self,
        repo_id: &str,
        path: &str,
        name: &str,
    ) -> Result<Option<LastCommit>>;

    /// All records for children of the directory `path` ("/" or "/a/b/")
    async fn last_commits_in_dir(&self, repo_id: &str, path: &str) -> Result<Vec<LastCommit>>;

    /// Legacy lookup by child object id
    async fn last_commits_by_object(
        &self,
        repo_id: &str,
        object_ids: &[Oid],
    ) -> Result<Vec<LastCommit>>;

    // Shortlinks

    /// Store links, skipping ones that already exist. Returns the number inserted.
    async fn insert_shortlinks(&self, links: &[Shortlink]) -> Result<usize>;

    async fn get_shortlink(&self, repo_id: &str, link: &str) -> Result<Option<Shortlink>>;

    // Merge requests

    async fn count_merge_requests(&self, target_repo_id: &str) -> Result<i64>;

    /// Insert a merge request. Returns false if its number is already taken.
    async fn insert_merge_request(&self, request: &MergeRequest) -> Result<bool>;

    async fn get_merge_request(
        &self,
        target_repo_id: &str,
        request_number: i64,
    ) -> Result<Option<MergeRequest>>;

    async fn merge_requests_by_status(
        &self,
        target_repo_id: &str,
        statuses: &[MergeStatus],
    ) -> Result<Vec<MergeRequest>>;

    async fn set_merge_request_status(
        &self,
        target_repo_id: &str,
        request_number: i64,
        status: MergeStatus,
    ) -> Result<()>;
}
