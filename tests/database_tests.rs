// Database integration tests
// Tests SQLite operations in isolation using in-memory database

mod common;

use common::make_commit;
use repoindex::model::{
    CommitInfo, CommitRun, DiffEntry, DiffInfo, HeadRef, LastCommit, MergeRequest, MergeStatus,
    ObjectKind, RepoStatus, Shortlink, Tool, Tree, TreeEntry,
};
use repoindex::repository::{IndexStore, SCHEMA_VERSION};

fn run(ids: &[&str], parents: &[&str]) -> CommitRun {
    CommitRun {
        id: ids[0].to_string(),
        parent_commit_ids: parents.iter().map(|s| s.to_string()).collect(),
        commit_ids: ids.iter().map(|s| s.to_string()).collect(),
        commit_times: (0..ids.len() as i64).rev().collect(),
    }
}

fn last_commit(path: &str, name: &str, object_id: &str, commit_id: &str) -> LastCommit {
    LastCommit {
        repo_id: "repo-1".to_string(),
        path: path.to_string(),
        name: name.to_string(),
        object_id: object_id.to_string(),
        info: CommitInfo {
            id: commit_id.to_string(),
            author: "Test User".to_string(),
            author_email: "test@example.com".to_string(),
            date: 1000,
            shortlink: format!("[{}]", commit_id),
            summary: format!("commit {}", commit_id),
        },
    }
}

fn merge_request(number: i64, status: MergeStatus) -> MergeRequest {
    MergeRequest {
        target_repo_id: "repo-1".to_string(),
        request_number: number,
        status,
        downstream_repo_id: "fork-1".to_string(),
        commit_id: "c3".to_string(),
        target_branch: "main".to_string(),
        summary: format!("request {}", number),
        description: String::new(),
        creator: "tester".to_string(),
        created: 1000 + number,
    }
}

#[tokio::test]
async fn test_schema_init() {
    let db = common::create_bare_db().await;

    // First init should return true (schema was rebuilt/created)
    let rebuilt = db.init_schema().await.unwrap();
    assert!(rebuilt, "First init_schema should return true");

    // Second init should return false (schema exists and version matches)
    let rebuilt = db.init_schema().await.unwrap();
    assert!(!rebuilt, "Second init_schema should return false");

    let version = db.get_metadata("schema_version").await.unwrap();
    assert_eq!(version.as_deref(), Some(SCHEMA_VERSION));
}

#[tokio::test]
async fn test_schema_version_change_discards_data() {
    let db = common::create_test_db().await;
    db.insert_commit(&make_commit("c1", &[], 100)).await.unwrap();
    db.set_metadata("schema_version", "0").await.unwrap();

    assert!(db.init_schema().await.unwrap());
    assert_eq!(db.count_rows("commits").await.unwrap(), 0);
    assert_eq!(
        db.get_metadata("schema_version").await.unwrap().as_deref(),
        Some(SCHEMA_VERSION)
    );
}

#[tokio::test]
async fn test_metadata_roundtrip() {
    let db = common::create_test_db().await;

    db.set_metadata("test_key", "test_value").await.unwrap();
    let value = db.get_metadata("test_key").await.unwrap();
    assert_eq!(value.as_deref(), Some("test_value"));

    db.set_metadata("test_key", "updated_value").await.unwrap();
    let value = db.get_metadata("test_key").await.unwrap();
    assert_eq!(value.as_deref(), Some("updated_value"));

    // Non-existent key returns None
    assert!(db.get_metadata("nonexistent").await.unwrap().is_none());
}

#[tokio::test]
async fn test_count_rows_rejects_unknown_table() {
    let db = common::create_test_db().await;
    assert_eq!(db.count_rows("trees").await.unwrap(), 0);
    assert!(db.count_rows("sqlite_master").await.is_err());
}

#[tokio::test]
async fn test_repo_roundtrip_and_status() {
    let db = common::create_test_db().await;
    let mut repo = common::test_repo_handle(Tool::Hg);
    repo.refs.heads.push(HeadRef::new("HEAD", "c2"));
    repo.refs.branches.push(HeadRef::new("default", "c2"));
    repo.refs.tags.push(HeadRef::new("v1", "c1"));
    db.save_repo(&repo).await.unwrap();

    let loaded = db.get_repo("repo-1").await.unwrap().unwrap();
    assert_eq!(loaded, repo);

    db.set_repo_status("repo-1", RepoStatus::Ready).await.unwrap();
    let loaded = db.get_repo("repo-1").await.unwrap().unwrap();
    assert_eq!(loaded.status, RepoStatus::Ready);

    assert!(db.set_repo_status("missing", RepoStatus::Ready).await.is_err());
    assert!(db.get_repo("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_commit_is_idempotent() {
    let db = common::create_test_db().await;
    let commit = make_commit("c1", &[], 100);

    assert!(db.insert_commit(&commit).await.unwrap());
    assert!(!db.insert_commit(&commit).await.unwrap(), "duplicate insert should report false");

    let loaded = db.get_commit("c1").await.unwrap().unwrap();
    assert_eq!(loaded.message, commit.message);
    assert_eq!(loaded.authored, commit.authored);
    assert!(loaded.parent_ids.is_empty());
    assert_eq!(db.count_rows("commits").await.unwrap(), 1);
}

#[tokio::test]
async fn test_commit_backrefs() {
    let db = common::create_test_db().await;
    db.insert_commit(&make_commit("c1", &[], 100)).await.unwrap();
    db.insert_commit(&make_commit("c2", &["c1"], 200)).await.unwrap();
    db.insert_commit(&make_commit("c3", &["c1"], 300)).await.unwrap();

    db.add_child(&["c1".to_string()], "c2").await.unwrap();
    db.add_child(&["c1".to_string()], "c3").await.unwrap();
    // Repeated calls do not duplicate children
    db.add_child(&["c1".to_string()], "c2").await.unwrap();

    let ids: Vec<String> = vec!["c1".into(), "c2".into(), "c3".into()];
    let added = db.add_repo_to_commits("repo-1", &ids).await.unwrap();
    assert_eq!(added, ids);
    let added = db.add_repo_to_commits("repo-1", &ids).await.unwrap();
    assert!(added.is_empty());
    db.add_repo_to_commits("fork-1", &ids[..1]).await.unwrap();

    let c1 = db.get_commit("c1").await.unwrap().unwrap();
    assert_eq!(c1.child_ids, vec!["c2", "c3"]);
    assert_eq!(c1.repo_ids, vec!["repo-1", "fork-1"]);

    let mut commits = db.get_commits(&ids).await.unwrap();
    commits.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(commits.len(), 3);
    assert!(commits[1].child_ids.is_empty());
    assert_eq!(commits[2].repo_ids, vec!["repo-1"]);
}

#[tokio::test]
async fn test_known_commit_ids() {
    let db = common::create_test_db().await;
    db.insert_commit(&make_commit("c1", &[], 100)).await.unwrap();

    let known = db
        .known_commit_ids(&["c1".to_string(), "c9".to_string()])
        .await
        .unwrap();
    assert_eq!(known.len(), 1);
    assert!(known.contains("c1"));
}

#[tokio::test]
async fn test_trees_and_commit_tree() {
    let db = common::create_test_db().await;
    db.insert_commit(&make_commit("c1", &[], 100)).await.unwrap();

    let tree = Tree::new(
        "t1",
        vec![
            TreeEntry::new("src", "t2", ObjectKind::Tree),
            TreeEntry::new("README", "b1", ObjectKind::Blob),
        ],
    );
    db.insert_trees(&[tree.clone()]).await.unwrap();
    // Existing ids are ignored
    db.insert_trees(&[tree.clone()]).await.unwrap();
    assert_eq!(db.count_rows("trees").await.unwrap(), 1);

    assert_eq!(db.get_tree("t1").await.unwrap(), Some(tree));
    assert!(db.get_tree("t9").await.unwrap().is_none());

    db.set_commit_tree("c1", "t1").await.unwrap();
    let c1 = db.get_commit("c1").await.unwrap().unwrap();
    assert_eq!(c1.tree_id.as_deref(), Some("t1"));
}

#[tokio::test]
async fn test_diff_info_roundtrip() {
    let db = common::create_test_db().await;
    let diff = DiffInfo {
        commit_id: "c2".to_string(),
        differences: vec![
            DiffEntry {
                path: "a".to_string(),
                lhs_id: None,
                rhs_id: Some("b1".to_string()),
                kind: ObjectKind::Blob,
            },
            DiffEntry {
                path: "b".to_string(),
                lhs_id: Some("b2".to_string()),
                rhs_id: None,
                kind: ObjectKind::Blob,
            },
        ],
    };
    db.save_diff_info(&diff).await.unwrap();
    db.save_diff_info(&diff).await.unwrap();

    assert_eq!(db.get_diff_info("c2").await.unwrap(), Some(diff));
    assert!(db.get_diff_info("c1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_runs_save_lookup_delete() {
    let db = common::create_test_db().await;
    let long = run(&["c4", "c3", "c2"], &["c1"]);
    let short = run(&["c3", "c2"], &["c1"]);
    db.save_runs(&[long.clone(), short.clone()]).await.unwrap();

    // Longest run wins when several contain the commit
    let found = db.run_for_commit("c2").await.unwrap().unwrap();
    assert_eq!(found, long);
    assert!(db.run_for_commit("c1").await.unwrap().is_none());

    let containing = db.runs_containing(&["c3".to_string()]).await.unwrap();
    assert_eq!(containing.len(), 2);
    let with_parent = db.runs_with_parents(&["c1".to_string()]).await.unwrap();
    assert_eq!(with_parent.len(), 2);

    // Saving by id replaces the old membership
    let mut replaced = long.clone();
    replaced.commit_ids.truncate(1);
    replaced.commit_times.truncate(1);
    replaced.parent_commit_ids = vec!["c3".to_string()];
    db.save_runs(&[replaced.clone()]).await.unwrap();
    assert_eq!(db.run_for_commit("c4").await.unwrap(), Some(replaced));
    assert_eq!(db.run_for_commit("c2").await.unwrap(), Some(short.clone()));

    db.delete_runs(&["c4".to_string(), "c3".to_string()]).await.unwrap();
    assert_eq!(db.count_rows("commit_runs").await.unwrap(), 0);
    assert_eq!(db.count_rows("commit_run_commits").await.unwrap(), 0);
    assert_eq!(db.count_rows("commit_run_parents").await.unwrap(), 0);
}

#[tokio::test]
async fn test_last_commits_by_name_and_object() {
    let db = common::create_test_db().await;
    db.save_last_commits(&[
        last_commit("/", "src", "t2", "c1"),
        last_commit("/", "README", "b1", "c1"),
        last_commit("/src/", "lib.rs", "b2", "c1"),
    ])
    .await
    .unwrap();

    // Overwrite by key
    db.save_last_commits(&[last_commit("/", "README", "b3", "c2")])
        .await
        .unwrap();

    let readme = db.get_last_commit("repo-1", "/", "README").await.unwrap().unwrap();
    assert_eq!(readme.object_id, "b3");
    assert_eq!(readme.info.id, "c2");

    let root: Vec<String> = db
        .last_commits_in_dir("repo-1", "/")
        .await
        .unwrap()
        .into_iter()
        .map(|lc| lc.name)
        .collect();
    assert_eq!(root, vec!["README", "src"]);

    let by_object = db
        .last_commits_by_object("repo-1", &["b2".to_string(), "b1".to_string()])
        .await
        .unwrap();
    assert_eq!(by_object.len(), 1);
    assert_eq!(by_object[0].name, "lib.rs");

    assert!(db.get_last_commit("other", "/", "README").await.unwrap().is_none());
}

#[tokio::test]
async fn test_shortlinks_dedupe() {
    let db = common::create_test_db().await;
    let link = Shortlink {
        repo_id: "repo-1".to_string(),
        link: "abc123".to_string(),
        ref_id: "abc123def".to_string(),
        url: "/p/demo/ci/abc123def/".to_string(),
    };
    assert_eq!(db.insert_shortlinks(&[link.clone()]).await.unwrap(), 1);
    assert_eq!(db.insert_shortlinks(&[link.clone()]).await.unwrap(), 0);

    assert_eq!(db.get_shortlink("repo-1", "abc123").await.unwrap(), Some(link));
    assert!(db.get_shortlink("fork-1", "abc123").await.unwrap().is_none());
}

#[tokio::test]
async fn test_merge_requests() {
    let db = common::create_test_db().await;
    assert_eq!(db.count_merge_requests("repo-1").await.unwrap(), 0);

    assert!(db.insert_merge_request(&merge_request(2, MergeStatus::Open)).await.unwrap());
    assert!(db.insert_merge_request(&merge_request(1, MergeStatus::Merged)).await.unwrap());
    assert!(!db.insert_merge_request(&merge_request(1, MergeStatus::Open)).await.unwrap());
    assert_eq!(db.count_merge_requests("repo-1").await.unwrap(), 2);

    let open = db
        .merge_requests_by_status("repo-1", &[MergeStatus::Open, MergeStatus::Merged])
        .await
        .unwrap();
    let numbers: Vec<i64> = open.iter().map(|r| r.request_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    db.set_merge_request_status("repo-1", 2, MergeStatus::Rejected)
        .await
        .unwrap();
    let loaded = db.get_merge_request("repo-1", 2).await.unwrap().unwrap();
    assert_eq!(loaded.status, MergeStatus::Rejected);
    assert!(db
        .merge_requests_by_status("repo-1", &[MergeStatus::Open])
        .await
        .unwrap()
        .is_empty());
}
