use thiserror::Error;

/// Errors raised by the indexing engine
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Native VCS failure (command error, corrupt object). Fatal for the refresh.
    #[error("Adapter error: {0:#}")]
    Adapter(#[from] anyhow::Error),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Tree not found: {0}")]
    TreeNotFound(String),

    /// No commit run covers the commit; runs must be rebuilt before retrying.
    #[error("No commit run contains {0}")]
    MissingRun(String),

    #[error("Cycle detected in commit graph ({0} commits left unsorted)")]
    CycleDetected(usize),

    /// Every candidate request number was taken by concurrent inserts
    #[error("No free merge request number for {repo_id} after {attempts} attempts")]
    MergeRequestNumbers { repo_id: String, attempts: usize },

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
