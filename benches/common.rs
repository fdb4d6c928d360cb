// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use repoindex::adapter::MemoryAdapter;
use repoindex::model::{Commit, Oid, Signature, Tool};
use repoindex::repository::{Database, IndexStore};
use rustc_hash::FxHashMap;

pub fn commit_id(i: usize) -> Oid {
    format!("{:040x}", i)
}

/// Mostly linear history with a merge every 10th commit, oldest first
pub fn generate_history(num_commits: usize) -> Vec<Commit> {
    (0..num_commits)
        .map(|i| {
            let parent_ids = match i {
                0 => Vec::new(),
                1 => vec![commit_id(0)],
                _ if i % 10 == 0 => vec![commit_id(i - 1), commit_id(i - 2)],
                _ => vec![commit_id(i - 1)],
            };
            let sig = Signature::new("Bench User", "bench@example.com", 1_700_000_000 + i as i64);
            Commit {
                id: commit_id(i),
                tree_id: None,
                authored: sig.clone(),
                committed: sig,
                message: format!("commit {}", i),
                parent_ids,
                child_ids: Vec::new(),
                repo_ids: Vec::new(),
            }
        })
        .collect()
}

/// Parent graph of a generated history
pub fn history_graph(commits: &[Commit]) -> FxHashMap<Oid, Vec<Oid>> {
    commits
        .iter()
        .map(|c| (c.id.clone(), c.parent_ids.clone()))
        .collect()
}

/// Create in-memory database for benchmarks
pub async fn setup_bench_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Database holding the generated commits, without runs
pub async fn setup_history_db(commits: &[Commit]) -> Database {
    let db = setup_bench_db().await;
    for commit in commits {
        db.insert_commit(commit).await.unwrap();
    }
    db
}

/// In-memory repository with `num_commits` commits touching `num_files` files
pub fn generate_repo(num_commits: usize, num_files: usize) -> MemoryAdapter {
    let mut repo = MemoryAdapter::new(Tool::Git);
    for i in 0..num_commits {
        let path = format!("src/dir_{}/file_{}.rs", i % 10, i % num_files);
        let content = format!("// revision {}\nfn func_{}() {{}}\n", i, i % num_files);
        repo.commit("main", &format!("commit {}", i), &[(path.as_str(), content.as_str())]);
    }
    repo
}

/// Text with `lines` lines and a small edit every 7th line when `edited`
pub fn generate_text(lines: usize, edited: bool) -> String {
    (0..lines)
        .map(|i| {
            if edited && i % 7 == 0 {
                format!("let value_{} = compute({}) + 1;\n", i, i)
            } else {
                format!("let value_{} = compute({});\n", i, i)
            }
        })
        .collect()
}
