// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use git2::{Repository, Time};
use repoindex::adapter::MemoryAdapter;
use repoindex::config::IndexConfig;
use repoindex::model::{Commit, Oid, RepoHandle, Signature, Tool};
use repoindex::repository::Database;
use std::path::PathBuf;
use tempfile::TempDir;

/// In-memory database without any tables yet
pub async fn create_bare_db() -> Database {
    Database::new(":memory:").await.unwrap()
}

/// Create an in-memory test database with the schema in place
pub async fn create_test_db() -> Database {
    let db = create_bare_db().await;
    db.init_schema().await.unwrap();
    db
}

/// Commit fixture with a fixed author and the given parents
pub fn make_commit(id: &str, parents: &[&str], date: i64) -> Commit {
    let sig = Signature::new("Test User", "test@example.com", date);
    Commit {
        id: id.to_string(),
        tree_id: None,
        authored: sig.clone(),
        committed: sig,
        message: format!("commit {}\n\nbody", id),
        parent_ids: parents.iter().map(|p| p.to_string()).collect(),
        child_ids: Vec::new(),
        repo_ids: Vec::new(),
    }
}

pub fn test_repo_handle(tool: Tool) -> RepoHandle {
    RepoHandle::new("repo-1", "demo", tool)
}

/// Config used by tests: no notifications, small batches to cross chunk borders
pub fn test_config() -> IndexConfig {
    IndexConfig {
        batch_size: 3,
        notify: false,
        url_prefix: "/p/demo/".to_string(),
        ..IndexConfig::default()
    }
}

/// A -> B -> C -> D on `main`, one file rewritten per commit. Returns ids oldest first.
pub fn linear_history(tool: Tool) -> (MemoryAdapter, Vec<Oid>) {
    let mut repo = MemoryAdapter::new(tool);
    let ids = ["A", "B", "C", "D"]
        .iter()
        .map(|name| {
            repo.commit(
                "main",
                name,
                &[("README", *name), ("src/lib.rs", "fn main() {}\n")],
            )
        })
        .collect();
    (repo, ids)
}

/// Create a temporary git repository
pub fn create_test_repo() -> (TempDir, PathBuf, Repository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = Repository::init(&repo_path).unwrap();

    // Configure git user for commits
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();

    (dir, repo_path, repo)
}

/// Write files, stage them and commit on HEAD at `time` (Unix seconds)
pub fn add_commit(repo: &Repository, files: &[(&str, &[u8])], message: &str, time: i64) -> git2::Oid {
    let sig = git2::Signature::new("Test User", "test@example.com", &Time::new(time, 0)).unwrap();

    let mut index = repo.index().unwrap();

    for (path, content) in files {
        // Write file to working directory
        let full_path = repo.workdir().unwrap().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();

        // Add to index
        index.add_path(std::path::Path::new(path)).unwrap();
    }

    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    // Get parent commit if exists
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Remove a file from the repository and commit
pub fn remove_file_commit(repo: &Repository, path: &str, message: &str, time: i64) -> git2::Oid {
    let sig = git2::Signature::new("Test User", "test@example.com", &Time::new(time, 0)).unwrap();

    // Remove from working directory
    let full_path = repo.workdir().unwrap().join(path);
    if full_path.exists() {
        std::fs::remove_file(&full_path).unwrap();
    }

    // Remove from index
    let mut index = repo.index().unwrap();
    index.remove_path(std::path::Path::new(path)).unwrap();
    index.write().unwrap();

    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().unwrap().peel_to_commit().unwrap();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
        .unwrap()
}

/// Tag HEAD with a lightweight tag
pub fn tag_head(repo: &Repository, name: &str) {
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    repo.tag_lightweight(name, head.as_object(), false).unwrap();
}
