mod blob;
mod commit;
mod diff;
mod last_commit;
mod merge_request;
mod repo;
mod run;
mod tree;

pub use blob::{Blob, RepoObject, ResolvedBlob, ResolvedTree};
pub use commit::{summarize, Commit, CommitInfo, Oid, Signature};
pub use diff::{CommitDiffs, CopiedPath, DiffEntry, DiffInfo};
pub use last_commit::{LastCommit, LsEntry};
pub use merge_request::{MergeRequest, MergeStatus};
pub use repo::{HeadRef, RefSet, RepoHandle, RepoStatus, Shortlink, Tool};
pub use run::CommitRun;
pub use tree::{ObjectKind, Tree, TreeEntry};
