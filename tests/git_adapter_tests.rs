// GitAdapter against real repositories created with git2

mod common;

use common::{
    add_commit, create_test_repo, remove_file_commit, tag_head, test_config, test_repo_handle,
};
use repoindex::adapter::{GitAdapter, RepositoryImplementation};
use repoindex::history::{RefreshPipeline, RepoView};
use repoindex::model::{ObjectKind, RepoStatus, Tool};
use rustc_hash::FxHashSet;
use std::io::Read;

const T0: i64 = 1_700_000_000;

/// Three commits: layout, lib edit (tagged v1), util removal
fn sample_repo() -> (tempfile::TempDir, std::path::PathBuf, Vec<String>) {
    let (dir, path, repo) = create_test_repo();
    let c1 = add_commit(
        &repo,
        &[
            ("README", "hello\n".as_bytes()),
            ("src/lib.rs", "pub fn a() {}\n".as_bytes()),
            ("src/util.rs", "pub fn u() {}\n".as_bytes()),
        ],
        "Initial commit",
        T0,
    );
    let c2 = add_commit(&repo, &[("src/lib.rs", "pub fn b() {}\n".as_bytes())], "Edit lib", T0 + 60);
    tag_head(&repo, "v1");
    let c3 = remove_file_commit(&repo, "src/util.rs", "Drop util", T0 + 120);
    let ids = [c1, c2, c3].iter().map(|id| id.to_string()).collect();
    (dir, path, ids)
}

#[test]
fn test_refs_and_commit_ids() {
    let (_dir, path, ids) = sample_repo();
    let adapter = GitAdapter::open(&path).unwrap();
    assert_eq!(adapter.tool(), Tool::Git);

    let refs = adapter.refs().unwrap();
    assert_eq!(refs.heads.len(), 1);
    assert_eq!(refs.heads[0].object_id, ids[2]);
    assert_eq!(refs.branches.len(), 1);
    assert_eq!(refs.tags.len(), 1);
    assert_eq!(refs.tags[0].name, "v1");
    assert_eq!(refs.tags[0].object_id, ids[1]);

    let all = adapter.all_commit_ids().unwrap();
    let newest_first: Vec<String> = ids.iter().rev().cloned().collect();
    assert_eq!(all, newest_first);

    assert_eq!(adapter.resolve("v1").unwrap(), ids[1]);
    assert_eq!(adapter.resolve(&ids[0]).unwrap(), ids[0]);
    assert!(adapter.resolve("not-a-ref").is_err());
}

#[test]
fn test_commit_info() {
    let (_dir, path, ids) = sample_repo();
    let adapter = GitAdapter::open(&path).unwrap();

    let commit = adapter.commit_info(&ids[1]).unwrap();
    assert_eq!(commit.message, "Edit lib");
    assert_eq!(commit.authored.name, "Test User");
    assert_eq!(commit.authored.email, "test@example.com");
    assert_eq!(commit.authored.date, T0 + 60);
    assert_eq!(commit.parent_ids, vec![ids[0].clone()]);
    assert!(commit.tree_id.is_some());

    let root = adapter.native_commit(&ids[0]).unwrap();
    assert!(root.parent_ids.is_empty());
    assert_eq!(adapter.shorthand_for_commit(&ids[0]), format!("[{}]", &ids[0][..6]));
}

#[test]
fn test_trees_and_blobs() {
    let (_dir, path, ids) = sample_repo();
    let adapter = GitAdapter::open(&path).unwrap();
    let commit = adapter.commit_info(&ids[0]).unwrap();
    let tree_id = commit.tree_id.clone().unwrap();

    let mut seen = FxHashSet::default();
    let trees = adapter.tree_snapshot(&tree_id, &mut seen).unwrap();
    assert_eq!(trees.len(), 2);
    let root = trees.last().unwrap();
    assert_eq!(root.id, tree_id);
    assert_eq!(root.get("src").map(|e| e.kind), Some(ObjectKind::Tree));
    assert!(adapter.tree_snapshot(&tree_id, &mut seen).unwrap().is_empty());

    let snapshot = adapter.compute_tree(&commit, "/src").unwrap().unwrap();
    assert_eq!(Some(snapshot.root_id.as_str()), root.get("src").map(|e| e.id.as_str()));
    assert!(adapter.compute_tree(&commit, "README").unwrap().is_none());

    let readme = root.get("README").unwrap();
    let mut content = String::new();
    adapter
        .open_blob(&readme.id)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "hello\n");
    assert_eq!(adapter.blob_size(&readme.id).unwrap(), 6);
}

#[tokio::test]
async fn test_refresh_real_repository() {
    let (_dir, path, ids) = sample_repo();
    let adapter = GitAdapter::open(&path).unwrap();
    let db = common::create_test_db().await;
    let mut repo = test_repo_handle(Tool::Git);

    let outcome = RefreshPipeline::new(&db, &adapter, test_config())
        .refresh(&mut repo, false)
        .await
        .unwrap();
    assert_eq!(outcome.new_commits, 3);
    assert_eq!(outcome.runs, 1);
    assert_eq!(repo.status, RepoStatus::Ready);

    let view = RepoView::new(&db, &adapter, &repo).with_config(test_config());
    assert_eq!(view.count("HEAD").await.unwrap(), 3);
    assert_eq!(view.count("v1").await.unwrap(), 2);

    let diffs = view.diffs(&ids[2]).await.unwrap();
    assert_eq!(diffs.removed, vec!["src/util.rs"]);
    let diffs = view.diffs(&ids[1]).await.unwrap();
    assert_eq!(diffs.changed, vec!["src/lib.rs"]);

    let entries = view.ls("HEAD", "/src").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "lib.rs");
    assert_eq!(entries[0].last_commit.as_ref().unwrap().id, ids[1]);

    let root = view.ls("HEAD", "/").await.unwrap();
    let src = root.iter().find(|e| e.name == "src").unwrap();
    assert_eq!(src.last_commit.as_ref().unwrap().summary, "Drop util");
}
