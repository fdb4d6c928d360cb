//! Database implementation of IndexStore

use rustc_hash::{FxHashMap, FxHashSet};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::error::{IndexError, Result};
use crate::model::{
    Commit, CommitRun, DiffEntry, DiffInfo, LastCommit, MergeRequest, MergeStatus, Oid,
    RepoHandle, RepoStatus, Shortlink, Tree, TreeEntry,
};

use super::database::{
    commit_from_row, is_duplicate, last_commit_from_row, merge_request_from_row, push_id_list,
    refs_to_json, repo_from_row, Database,
};
use super::store::IndexStore;

/// Ids per `IN (...)` list, well under SQLite's bound-parameter limit
const QUERY_CHUNK: usize = 500;

impl Database {
    /// Fill `child_ids` and `repo_ids` from the back-reference tables
    async fn attach_backrefs(&self, commits: &mut [Commit]) -> Result<()> {
        if commits.is_empty() {
            return Ok(());
        }
        let ids: Vec<Oid> = commits.iter().map(|c| c.id.clone()).collect();
        let mut children: FxHashMap<String, Vec<Oid>> = FxHashMap::default();
        let mut repos: FxHashMap<String, Vec<String>> = FxHashMap::default();

        for chunk in ids.chunks(QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT parent_id, child_id FROM commit_children WHERE parent_id IN ",
            );
            push_id_list(&mut qb, chunk);
            qb.push(" ORDER BY rowid");
            for row in qb.build().fetch_all(self.pool()).await? {
                children
                    .entry(row.get("parent_id"))
                    .or_default()
                    .push(row.get("child_id"));
            }

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT commit_id, repo_id FROM commit_repos WHERE commit_id IN ",
            );
            push_id_list(&mut qb, chunk);
            qb.push(" ORDER BY rowid");
            for row in qb.build().fetch_all(self.pool()).await? {
                repos
                    .entry(row.get("commit_id"))
                    .or_default()
                    .push(row.get("repo_id"));
            }
        }

        for commit in commits.iter_mut() {
            commit.child_ids = children.remove(&commit.id).unwrap_or_default();
            commit.repo_ids = repos.remove(&commit.id).unwrap_or_default();
        }
        Ok(())
    }

    /// Load runs by id, members in stored order
    async fn load_runs(&self, run_ids: &[Oid]) -> Result<Vec<CommitRun>> {
        let mut runs: Vec<CommitRun> = Vec::with_capacity(run_ids.len());
        for chunk in run_ids.chunks(QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id, parent_commit_ids FROM commit_runs WHERE id IN ");
            push_id_list(&mut qb, chunk);
            qb.push(" ORDER BY id");
            let mut by_id: FxHashMap<String, usize> = FxHashMap::default();
            for row in qb.build().fetch_all(self.pool()).await? {
                let id: String = row.get("id");
                let parents: String = row.get("parent_commit_ids");
                by_id.insert(id.clone(), runs.len());
                runs.push(CommitRun {
                    id,
                    parent_commit_ids: serde_json::from_str(&parents)?,
                    commit_ids: Vec::new(),
                    commit_times: Vec::new(),
                });
            }

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT run_id, commit_id, commit_time FROM commit_run_commits WHERE run_id IN ",
            );
            push_id_list(&mut qb, chunk);
            qb.push(" ORDER BY run_id, position");
            for row in qb.build().fetch_all(self.pool()).await? {
                let run_id: String = row.get("run_id");
                if let Some(&idx) = by_id.get(&run_id) {
                    runs[idx].commit_ids.push(row.get("commit_id"));
                    runs[idx].commit_times.push(row.get("commit_time"));
                }
            }
        }
        runs.retain(|r| !r.commit_ids.is_empty());
        Ok(runs)
    }

    /// Distinct run ids matched by `column IN ids` on a member table
    async fn run_ids_where(&self, table: &str, column: &str, ids: &[Oid]) -> Result<Vec<Oid>> {
        let mut out: Vec<Oid> = Vec::new();
        for chunk in ids.chunks(QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT DISTINCT run_id FROM {} WHERE {} IN ",
                table, column
            ));
            push_id_list(&mut qb, chunk);
            let found: Vec<String> = qb.build_query_scalar().fetch_all(self.pool()).await?;
            for id in found {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }
}

impl IndexStore for Database {
    async fn get_repo(&self, repo_id: &str) -> Result<Option<RepoHandle>> {
        let row = sqlx::query("SELECT * FROM repositories WHERE id = ?")
            .bind(repo_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(repo_from_row).transpose()
    }

    async fn save_repo(&self, repo: &RepoHandle) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO repositories (id, name, tool, status, refs) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&repo.id)
        .bind(&repo.name)
        .bind(repo.tool.as_str())
        .bind(repo.status.as_str())
        .bind(refs_to_json(&repo.refs)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_repo_status(&self, repo_id: &str, status: RepoStatus) -> Result<()> {
        let result = sqlx::query("UPDATE repositories SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(repo_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(IndexError::RepositoryNotFound(repo_id.to_string()));
        }
        Ok(())
    }

    async fn get_commit(&self, commit_id: &str) -> Result<Option<Commit>> {
        let row = sqlx::query("SELECT * FROM commits WHERE id = ?")
            .bind(commit_id)
            .fetch_optional(self.pool())
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut commits = [commit_from_row(&row)?];
        self.attach_backrefs(&mut commits).await?;
        let [commit] = commits;
        Ok(Some(commit))
    }

    async fn get_commits(&self, commit_ids: &[Oid]) -> Result<Vec<Commit>> {
        let mut commits: Vec<Commit> = Vec::with_capacity(commit_ids.len());
        for chunk in commit_ids.chunks(QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT * FROM commits WHERE id IN ");
            push_id_list(&mut qb, chunk);
            for row in qb.build().fetch_all(self.pool()).await? {
                commits.push(commit_from_row(&row)?);
            }
        }
        self.attach_backrefs(&mut commits).await?;
        Ok(commits)
    }

    async fn known_commit_ids(&self, commit_ids: &[Oid]) -> Result<FxHashSet<Oid>> {
        let mut known: FxHashSet<Oid> = FxHashSet::default();
        for chunk in commit_ids.chunks(QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id FROM commits WHERE id IN ");
            push_id_list(&mut qb, chunk);
            let found: Vec<String> = qb.build_query_scalar().fetch_all(self.pool()).await?;
            known.extend(found);
        }
        Ok(known)
    }

    async fn insert_commit(&self, commit: &Commit) -> Result<bool> {
        let mut tx = self.pool().begin().await?;
        match self.save_commit_in_tx(&mut tx, commit).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(true)
            }
            Err(IndexError::Database(e)) if is_duplicate(&e) => {
                tx.rollback().await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn add_child(&self, parent_ids: &[Oid], child_id: &str) -> Result<()> {
        if parent_ids.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT OR IGNORE INTO commit_children (parent_id, child_id) ");
        qb.push_values(parent_ids, |mut row, parent| {
            row.push_bind(parent).push_bind(child_id);
        });
        qb.build().execute(self.pool()).await?;
        Ok(())
    }

    async fn set_commit_tree(&self, commit_id: &str, tree_id: &str) -> Result<()> {
        sqlx::query("UPDATE commits SET tree_id = ? WHERE id = ?")
            .bind(tree_id)
            .bind(commit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn add_repo_to_commits(&self, repo_id: &str, commit_ids: &[Oid]) -> Result<Vec<Oid>> {
        let mut added: Vec<Oid> = Vec::new();
        for chunk in commit_ids.chunks(QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id FROM commits WHERE id IN ");
            push_id_list(&mut qb, chunk);
            qb.push(" AND id NOT IN (SELECT commit_id FROM commit_repos WHERE repo_id = ");
            qb.push_bind(repo_id);
            qb.push(")");
            let missing: FxHashSet<String> = qb
                .build_query_scalar::<String>()
                .fetch_all(self.pool())
                .await?
                .into_iter()
                .collect();
            if missing.is_empty() {
                continue;
            }

            let newly: Vec<&Oid> = chunk.iter().filter(|id| missing.contains(*id)).collect();
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO commit_repos (commit_id, repo_id) ");
            qb.push_values(&newly, |mut row, id| {
                row.push_bind(*id).push_bind(repo_id);
            });
            qb.build().execute(self.pool()).await?;
            added.extend(newly.into_iter().cloned());
        }
        Ok(added)
    }

    async fn get_tree(&self, tree_id: &str) -> Result<Option<Tree>> {
        let entries: Option<String> = sqlx::query_scalar("SELECT entries FROM trees WHERE id = ?")
            .bind(tree_id)
            .fetch_optional(self.pool())
            .await?;
        entries
            .map(|json| {
                let entries: Vec<TreeEntry> = serde_json::from_str(&json)?;
                Ok(Tree::new(tree_id, entries))
            })
            .transpose()
    }

    async fn insert_trees(&self, trees: &[Tree]) -> Result<()> {
        if trees.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        self.save_trees_in_tx(&mut tx, trees).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_diff_info(&self, commit_id: &str) -> Result<Option<DiffInfo>> {
        let differences: Option<String> =
            sqlx::query_scalar("SELECT differences FROM diff_infos WHERE commit_id = ?")
                .bind(commit_id)
                .fetch_optional(self.pool())
                .await?;
        differences
            .map(|json| {
                let differences: Vec<DiffEntry> = serde_json::from_str(&json)?;
                Ok(DiffInfo {
                    commit_id: commit_id.to_string(),
                    differences,
                })
            })
            .transpose()
    }

    async fn save_diff_info(&self, diff: &DiffInfo) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO diff_infos (commit_id, differences) VALUES (?, ?)")
            .bind(&diff.commit_id)
            .bind(serde_json::to_string(&diff.differences)?)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn run_for_commit(&self, commit_id: &str) -> Result<Option<CommitRun>> {
        let run_ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT run_id FROM commit_run_commits WHERE commit_id = ?")
                .bind(commit_id)
                .fetch_all(self.pool())
                .await?;
        let runs = self.load_runs(&run_ids).await?;
        Ok(runs
            .into_iter()
            .max_by(|a, b| a.commit_ids.len().cmp(&b.commit_ids.len()).then(b.id.cmp(&a.id))))
    }

    async fn runs_containing(&self, commit_ids: &[Oid]) -> Result<Vec<CommitRun>> {
        let run_ids = self
            .run_ids_where("commit_run_commits", "commit_id", commit_ids)
            .await?;
        self.load_runs(&run_ids).await
    }

    async fn runs_with_parents(&self, commit_ids: &[Oid]) -> Result<Vec<CommitRun>> {
        let run_ids = self
            .run_ids_where("commit_run_parents", "parent_id", commit_ids)
            .await?;
        self.load_runs(&run_ids).await
    }

    async fn save_runs(&self, runs: &[CommitRun]) -> Result<()> {
        if runs.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        self.save_runs_in_tx(&mut tx, runs).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_runs(&self, run_ids: &[Oid]) -> Result<()> {
        if run_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for run_id in run_ids {
            self.delete_run_in_tx(&mut tx, run_id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_last_commits(&self, records: &[LastCommit]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        self.save_last_commits_in_tx(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_last_commit(
        &self,
        repo_id: &str,
        path: &str,
        name: &str,
    ) -> Result<Option<LastCommit>> {
        let row = sqlx::query("SELECT * FROM last_commits WHERE key = ?")
            .bind(LastCommit::make_key(repo_id, path, name))
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(last_commit_from_row).transpose()
    }

    async fn last_commits_in_dir(&self, repo_id: &str, path: &str) -> Result<Vec<LastCommit>> {
        let rows = sqlx::query("SELECT * FROM last_commits WHERE repo_id = ? AND path = ? ORDER BY name")
            .bind(repo_id)
            .bind(path)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(last_commit_from_row).collect()
    }

    async fn last_commits_by_object(
        &self,
        repo_id: &str,
        object_ids: &[Oid],
    ) -> Result<Vec<LastCommit>> {
        let mut out: Vec<LastCommit> = Vec::new();
        for chunk in object_ids.chunks(QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT * FROM last_commits WHERE repo_id = ");
            qb.push_bind(repo_id);
            qb.push(" AND object_id IN ");
            push_id_list(&mut qb, chunk);
            for row in qb.build().fetch_all(self.pool()).await? {
                out.push(last_commit_from_row(&row)?);
            }
        }
        Ok(out)
    }

    async fn insert_shortlinks(&self, links: &[Shortlink]) -> Result<usize> {
        let mut inserted = 0;
        for link in links {
            let result = sqlx::query(
                "INSERT INTO shortlinks (repo_id, link, ref_id, url) VALUES (?, ?, ?, ?)",
            )
            .bind(&link.repo_id)
            .bind(&link.link)
            .bind(&link.ref_id)
            .bind(&link.url)
            .execute(self.pool())
            .await;
            match result {
                Ok(_) => inserted += 1,
                Err(e) if is_duplicate(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(inserted)
    }

    async fn get_shortlink(&self, repo_id: &str, link: &str) -> Result<Option<Shortlink>> {
        let row = sqlx::query("SELECT * FROM shortlinks WHERE repo_id = ? AND link = ?")
            .bind(repo_id)
            .bind(link)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|row| Shortlink {
            repo_id: row.get("repo_id"),
            link: row.get("link"),
            ref_id: row.get("ref_id"),
            url: row.get("url"),
        }))
    }

    async fn count_merge_requests(&self, target_repo_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM merge_requests WHERE target_repo_id = ?")
            .bind(target_repo_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    async fn insert_merge_request(&self, request: &MergeRequest) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO merge_requests (target_repo_id, request_number, status, downstream_repo_id,
                commit_id, target_branch, summary, description, creator, created)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.target_repo_id)
        .bind(request.request_number)
        .bind(request.status.as_str())
        .bind(&request.downstream_repo_id)
        .bind(&request.commit_id)
        .bind(&request.target_branch)
        .bind(&request.summary)
        .bind(&request.description)
        .bind(&request.creator)
        .bind(request.created)
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_merge_request(
        &self,
        target_repo_id: &str,
        request_number: i64,
    ) -> Result<Option<MergeRequest>> {
        let row = sqlx::query(
            "SELECT * FROM merge_requests WHERE target_repo_id = ? AND request_number = ?",
        )
        .bind(target_repo_id)
        .bind(request_number)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.as_ref().map(merge_request_from_row))
    }

    async fn merge_requests_by_status(
        &self,
        target_repo_id: &str,
        statuses: &[MergeStatus],
    ) -> Result<Vec<MergeRequest>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM merge_requests WHERE target_repo_id = ");
        qb.push_bind(target_repo_id);
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(") ORDER BY request_number");
        let rows = qb.build().fetch_all(self.pool()).await?;
        Ok(rows.iter().map(merge_request_from_row).collect())
    }

    async fn set_merge_request_status(
        &self,
        target_repo_id: &str,
        request_number: i64,
        status: MergeStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE merge_requests SET status = ? WHERE target_repo_id = ? AND request_number = ?",
        )
        .bind(status.as_str())
        .bind(target_repo_id)
        .bind(request_number)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
