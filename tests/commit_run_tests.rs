// Commit run building and reconciliation against the SQLite store

mod common;

use common::make_commit;
use repoindex::history::{commitlog, CommitRunBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use repoindex::model::CommitRun;
use repoindex::repository::{Database, IndexStore};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn stored_run(members: &[&str], parents: &[&str]) -> CommitRun {
    CommitRun {
        id: members[0].to_string(),
        parent_commit_ids: ids(parents),
        commit_ids: ids(members),
        commit_times: (0..members.len() as i64).rev().collect(),
    }
}

/// Insert commits given as (id, parents), oldest first, one minute apart
async fn insert_history(db: &Database, history: &[(&str, &[&str])]) {
    for (i, (id, parents)) in history.iter().enumerate() {
        let commit = make_commit(id, parents, 1000 + 60 * i as i64);
        db.insert_commit(&commit).await.unwrap();
    }
}

#[tokio::test]
async fn test_linear_history_single_run() {
    let db = common::create_test_db().await;
    insert_history(&db, &[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &["c"])]).await;

    let mut builder = CommitRunBuilder::new(&db, ids(&["a", "b", "c", "d"])).batch_size(3);
    assert_eq!(builder.run().await.unwrap(), 1);
    assert_eq!(builder.cleanup().await.unwrap(), 0);

    let run = db.run_for_commit("b").await.unwrap().unwrap();
    assert_eq!(run.id, "d");
    assert_eq!(run.commit_ids, ids(&["d", "c", "b", "a"]));
    assert!(run.parent_commit_ids.is_empty());
    assert_eq!(run.commit_times, vec![1180, 1120, 1060, 1000]);
    assert_eq!(builder.stop_reason("d"), Some("0 parents"));
}

#[tokio::test]
async fn test_cleanup_removes_subset_run() {
    let db = common::create_test_db().await;
    db.save_runs(&[stored_run(&["c3", "c2", "c1"], &[]), stored_run(&["c2", "c1"], &[])])
        .await
        .unwrap();

    let mut builder = CommitRunBuilder::new(&db, ids(&["c2"]));
    assert_eq!(builder.cleanup().await.unwrap(), 1);

    assert_eq!(db.count_rows("commit_runs").await.unwrap(), 1);
    let run = db.run_for_commit("c1").await.unwrap().unwrap();
    assert_eq!(run.id, "c3");
}

#[tokio::test]
async fn test_incremental_run_joins_stored_run() {
    let db = common::create_test_db().await;
    insert_history(&db, &[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &["c"])]).await;

    let mut first = CommitRunBuilder::new(&db, ids(&["a", "b"]));
    first.run().await.unwrap();
    first.cleanup().await.unwrap();
    assert_eq!(db.run_for_commit("a").await.unwrap().unwrap().id, "b");

    let mut second = CommitRunBuilder::new(&db, ids(&["c", "d"]));
    assert_eq!(second.run().await.unwrap(), 1);
    assert_eq!(second.stop_reason("d"), Some("parent commit not found"));
    assert_eq!(second.cleanup().await.unwrap(), 1, "run b should be folded into run d");

    assert_eq!(db.count_rows("commit_runs").await.unwrap(), 1);
    let run = db.run_for_commit("a").await.unwrap().unwrap();
    assert_eq!(run.id, "d");
    assert_eq!(run.commit_ids, ids(&["d", "c", "b", "a"]));
    assert!(run.parent_commit_ids.is_empty());
}

#[tokio::test]
async fn test_covered_commits_are_skipped_unless_rebuilding() {
    let db = common::create_test_db().await;
    insert_history(&db, &[("a", &[]), ("b", &["a"])]).await;

    let mut builder = CommitRunBuilder::new(&db, ids(&["a", "b"]));
    assert_eq!(builder.run().await.unwrap(), 1);

    let mut again = CommitRunBuilder::new(&db, ids(&["a", "b"]));
    assert_eq!(again.run().await.unwrap(), 0);

    let mut rebuild = CommitRunBuilder::new(&db, ids(&["a", "b"])).rebuild(true);
    assert_eq!(rebuild.run().await.unwrap(), 1);
    assert_eq!(rebuild.cleanup().await.unwrap(), 0);
    assert_eq!(db.count_rows("commit_runs").await.unwrap(), 1);
}

#[tokio::test]
async fn test_merge_commits_split_runs() {
    let db = common::create_test_db().await;
    insert_history(
        &db,
        &[("base", &[]), ("x", &["base"]), ("y", &["base"]), ("m", &["x", "y"])],
    )
    .await;

    let mut builder = CommitRunBuilder::new(&db, ids(&["base", "x", "y", "m"]));
    assert_eq!(builder.run().await.unwrap(), 3);
    builder.cleanup().await.unwrap();

    assert_eq!(builder.stop_reason("m"), Some("2 parents"));
    assert_eq!(
        builder.stop_reason("y"),
        Some("parent does not start with parent commit")
    );

    // Every commit lands in exactly one run
    for id in ["base", "x", "y", "m"] {
        let containing = db.runs_containing(&ids(&[id])).await.unwrap();
        assert_eq!(containing.len(), 1, "commit {} in {} runs", id, containing.len());
    }
    let m = db.run_for_commit("m").await.unwrap().unwrap();
    assert_eq!(m.commit_ids, ids(&["m"]));
    assert_eq!(m.parent_commit_ids, ids(&["x", "y"]));
    let x = db.run_for_commit("base").await.unwrap().unwrap();
    assert_eq!(x.commit_ids, ids(&["x", "base"]));
}

#[tokio::test]
async fn test_cleanup_follows_parent_runs_to_root() {
    // Runs left behind by a refresh that stopped before cleanup
    let db = common::create_test_db().await;
    insert_history(&db, &[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &["c"])]).await;
    db.save_runs(&[stored_run(&["b", "a"], &[]), stored_run(&["c"], &["b"])])
        .await
        .unwrap();

    let mut builder = CommitRunBuilder::new(&db, ids(&["d"]));
    assert_eq!(builder.run().await.unwrap(), 1);
    assert_eq!(builder.cleanup().await.unwrap(), 2);

    assert_eq!(db.count_rows("commit_runs").await.unwrap(), 1);
    let run = db.run_for_commit("a").await.unwrap().unwrap();
    assert_eq!(run.id, "d");
    assert_eq!(run.commit_ids, ids(&["d", "c", "b", "a"]));
    assert!(run.parent_commit_ids.is_empty());
    for id in ["a", "b", "c", "d"] {
        assert_eq!(db.runs_containing(&ids(&[id])).await.unwrap().len(), 1);
    }
}

/// Store `history` and build its runs
async fn indexed_history(history: &[(&str, &[&str])]) -> Database {
    let db = common::create_test_db().await;
    insert_history(&db, history).await;
    let all: Vec<&str> = history.iter().map(|(id, _)| *id).collect();
    let mut builder = CommitRunBuilder::new(&db, ids(&all));
    builder.run().await.unwrap();
    builder.cleanup().await.unwrap();
    db
}

/// Walk from `starts` and check the log yields every reachable commit once,
/// each one after all of its reachable children
async fn checked_log(db: &Database, history: &[(&str, &[&str])], starts: &[&str]) -> Vec<String> {
    let parents: FxHashMap<&str, &[&str]> = history.iter().copied().collect();
    let mut reachable: FxHashSet<&str> = FxHashSet::default();
    let mut stack: Vec<&str> = starts.to_vec();
    while let Some(id) = stack.pop() {
        if reachable.insert(id) {
            stack.extend(parents[id].iter().copied());
        }
    }

    let log: Vec<String> = commitlog(db, &ids(starts)).await.unwrap().collect();
    let unique: FxHashSet<&str> = log.iter().map(String::as_str).collect();
    assert_eq!(unique.len(), log.len(), "duplicate in {:?}", log);
    assert_eq!(unique, reachable);

    let position = |id: &str| log.iter().position(|l| l == id).unwrap();
    for (id, ps) in history {
        if !reachable.contains(id) {
            continue;
        }
        for parent in ps.iter() {
            assert!(
                position(*id) < position(*parent),
                "{} yielded before its child {} in {:?}",
                parent,
                id,
                log
            );
        }
    }
    log
}

#[tokio::test]
async fn test_commitlog_with_start_inside_another_starts_history() {
    let history: &[(&str, &[&str])] = &[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &["c"])];
    let db = indexed_history(history).await;

    let log = checked_log(&db, history, &["b", "d"]).await;
    assert_eq!(log, ids(&["d", "c", "b", "a"]));

    let log = checked_log(&db, history, &["d", "b", "d"]).await;
    assert_eq!(log, ids(&["d", "c", "b", "a"]));
}

#[tokio::test]
async fn test_commitlog_with_branching_starts() {
    // base <- x1 <- x2 <- m, base <- y1 <- m
    let history: &[(&str, &[&str])] = &[
        ("base", &[]),
        ("x1", &["base"]),
        ("y1", &["base"]),
        ("x2", &["x1"]),
        ("m", &["x2", "y1"]),
    ];
    let db = indexed_history(history).await;

    let log = checked_log(&db, history, &["y1", "m"]).await;
    assert_eq!(log.first().map(String::as_str), Some("m"));
    assert_eq!(log.last().map(String::as_str), Some("base"));

    // Two branch tips: the newer tip goes first, base comes last
    let log = checked_log(&db, history, &["y1", "x2"]).await;
    assert_eq!(log, ids(&["x2", "x1", "y1", "base"]));

    let log = checked_log(&db, history, &["x1", "y1"]).await;
    assert_eq!(log, ids(&["y1", "x1", "base"]));
}
