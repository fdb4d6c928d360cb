//! History engine
//!
//! - **refresh**: the pipeline that reconciles the index with a repository
//! - **runs**: commit run construction and cleanup
//! - **commitlog**: newest-first traversal over runs, topological sort
//! - **diff**: tree diffs and rename detection
//! - **last_commit**: last-commit-per-path propagation
//! - **view**: read-side queries (log, count, ls, diffs)
//! - **merge_request**: merge request numbering and commit listing
//! - **notify**: refresh notifications
//! - **progress**: progress reporting abstraction

mod commitlog;
mod diff;
mod last_commit;
mod merge_request;
mod notify;
mod progress;
mod refresh;
mod runs;
mod view;

pub use commitlog::{commitlog, topological_sort, CommitLog};
pub use diff::{similarity, unified_diff, DiffEngine, TreeCache};
pub use last_commit::LastCommitPropagator;
pub use merge_request::{
    create_merge_request, merge_request_commits, set_merge_request_status, NewMergeRequest,
};
pub use notify::{CommitNotice, FeedEntry, RefreshNotifier, RefreshSummary, TracingNotifier};
pub use progress::{IndicatifProgress, NoopProgress, Phase, ProgressHandle, ProgressReporter};
pub use refresh::{last_known_commit_id, refresh_commit_info, RefreshOutcome, RefreshPipeline};
pub use runs::CommitRunBuilder;
pub use view::{
    commitlog_repaired, count_revisions, rebuild_runs, CommitContext, RepoView,
};
