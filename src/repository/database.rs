use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite, Transaction};
use std::str::FromStr;

use crate::error::Result;
use crate::model::{
    Commit, CommitInfo, CommitRun, LastCommit, MergeRequest, MergeStatus, Oid, RefSet,
    RepoHandle, RepoStatus, Signature, Tool, Tree,
};

use super::SCHEMA_VERSION;

/// Rows per multi-row INSERT
const BATCH_SIZE: usize = 500;

/// Tables owned by the index, in drop order
const TABLES: &[&str] = &[
    "repositories",
    "commits",
    "commit_children",
    "commit_repos",
    "trees",
    "diff_infos",
    "commit_runs",
    "commit_run_commits",
    "commit_run_parents",
    "last_commits",
    "shortlinks",
    "merge_requests",
];

/// Database abstraction for SQLite operations
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "-64000"); // 64MB cache

        // A single connection keeps `:memory:` databases alive and serializes writers
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Initialize database schema, returns true if schema was rebuilt
    pub async fn init_schema(&self) -> Result<bool> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let stored_version = self.get_metadata("schema_version").await?;
        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if let Some(old) = &stored_version {
                tracing::warn!(
                    "Schema version changed ({} -> {}), rebuilding index",
                    old,
                    SCHEMA_VERSION
                );
            }
            for table in TABLES {
                sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                    .execute(&self.pool)
                    .await?;
            }
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        let statements = [
            "CREATE TABLE IF NOT EXISTS repositories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                tool TEXT NOT NULL,
                status TEXT NOT NULL,
                refs TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS commits (
                id TEXT PRIMARY KEY,
                tree_id TEXT,
                author_name TEXT NOT NULL,
                author_email TEXT NOT NULL,
                author_date INTEGER NOT NULL,
                committer_name TEXT NOT NULL,
                committer_email TEXT NOT NULL,
                committer_date INTEGER NOT NULL,
                message TEXT NOT NULL,
                parent_ids TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS commit_children (
                parent_id TEXT NOT NULL,
                child_id TEXT NOT NULL,
                PRIMARY KEY (parent_id, child_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_commit_children_child ON commit_children (child_id)",
            "CREATE TABLE IF NOT EXISTS commit_repos (
                commit_id TEXT NOT NULL,
                repo_id TEXT NOT NULL,
                PRIMARY KEY (commit_id, repo_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_commit_repos_repo ON commit_repos (repo_id)",
            "CREATE TABLE IF NOT EXISTS trees (
                id TEXT PRIMARY KEY,
                entries TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS diff_infos (
                commit_id TEXT PRIMARY KEY,
                differences TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS commit_runs (
                id TEXT PRIMARY KEY,
                parent_commit_ids TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS commit_run_commits (
                run_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                commit_id TEXT NOT NULL,
                commit_time INTEGER NOT NULL,
                PRIMARY KEY (run_id, position)
            )",
            "CREATE INDEX IF NOT EXISTS idx_run_commits_commit ON commit_run_commits (commit_id)",
            "CREATE TABLE IF NOT EXISTS commit_run_parents (
                run_id TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                PRIMARY KEY (run_id, parent_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_run_parents_parent ON commit_run_parents (parent_id)",
            "CREATE TABLE IF NOT EXISTS last_commits (
                key TEXT PRIMARY KEY,
                repo_id TEXT NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                object_id TEXT NOT NULL,
                commit_info TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_last_commits_dir ON last_commits (repo_id, path)",
            "CREATE INDEX IF NOT EXISTS idx_last_commits_object ON last_commits (repo_id, object_id)",
            "CREATE TABLE IF NOT EXISTS shortlinks (
                repo_id TEXT NOT NULL,
                link TEXT NOT NULL,
                ref_id TEXT NOT NULL,
                url TEXT NOT NULL,
                PRIMARY KEY (repo_id, link)
            )",
            "CREATE TABLE IF NOT EXISTS merge_requests (
                target_repo_id TEXT NOT NULL,
                request_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                downstream_repo_id TEXT NOT NULL,
                commit_id TEXT NOT NULL,
                target_branch TEXT NOT NULL,
                summary TEXT NOT NULL,
                description TEXT NOT NULL,
                creator TEXT NOT NULL,
                created INTEGER NOT NULL,
                PRIMARY KEY (target_repo_id, request_number)
            )",
            "CREATE INDEX IF NOT EXISTS idx_merge_requests_commit ON merge_requests (commit_id)",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        if needs_rebuild {
            self.set_metadata("schema_version", SCHEMA_VERSION).await?;
        }

        Ok(needs_rebuild)
    }

    /// Get metadata value by key
    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Set metadata value
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of rows in one of the index tables (used by tests and `status`)
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let table = TABLES
            .iter()
            .find(|t| **t == table)
            .ok_or_else(|| crate::error::IndexError::Config(format!("unknown table {}", table)))?;
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Every row of an index table as one `|`-joined line of SQL literals,
    /// ordered by all columns so equal contents give equal dumps
    pub async fn dump_rows(&self, table: &str) -> Result<Vec<String>> {
        let table = TABLES
            .iter()
            .find(|t| **t == table)
            .ok_or_else(|| crate::error::IndexError::Config(format!("unknown table {}", table)))?;
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(*table)
                .fetch_all(&self.pool)
                .await?;
        let columns: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
        let line = columns
            .iter()
            .map(|c| format!("quote({})", c))
            .collect::<Vec<_>>()
            .join(" || '|' || ");
        let rows = sqlx::query_scalar(&format!(
            "SELECT {} FROM {} ORDER BY {}",
            line,
            table,
            columns.join(", ")
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub(crate) async fn save_commit_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        commit: &Commit,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO commits (id, tree_id, author_name, author_email, author_date,
                committer_name, committer_email, committer_date, message, parent_ids)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&commit.id)
        .bind(commit.tree_id.as_deref())
        .bind(&commit.authored.name)
        .bind(&commit.authored.email)
        .bind(commit.authored.date)
        .bind(&commit.committed.name)
        .bind(&commit.committed.email)
        .bind(commit.committed.date)
        .bind(&commit.message)
        .bind(serde_json::to_string(&commit.parent_ids)?)
        .execute(&mut **tx)
        .await?;

        for child in &commit.child_ids {
            sqlx::query("INSERT OR IGNORE INTO commit_children (parent_id, child_id) VALUES (?, ?)")
                .bind(&commit.id)
                .bind(child)
                .execute(&mut **tx)
                .await?;
        }
        for repo_id in &commit.repo_ids {
            sqlx::query("INSERT OR IGNORE INTO commit_repos (commit_id, repo_id) VALUES (?, ?)")
                .bind(&commit.id)
                .bind(repo_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn save_runs_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        runs: &[CommitRun],
    ) -> Result<()> {
        for run in runs {
            self.delete_run_in_tx(tx, &run.id).await?;

            sqlx::query("INSERT INTO commit_runs (id, parent_commit_ids) VALUES (?, ?)")
                .bind(&run.id)
                .bind(serde_json::to_string(&run.parent_commit_ids)?)
                .execute(&mut **tx)
                .await?;

            let members: Vec<(usize, (&Oid, &i64))> = run
                .commit_ids
                .iter()
                .zip(run.commit_times.iter())
                .enumerate()
                .collect();
            for chunk in members.chunks(BATCH_SIZE) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO commit_run_commits (run_id, position, commit_id, commit_time) ",
                );
                qb.push_values(chunk, |mut row, (pos, (oid, time))| {
                    row.push_bind(&run.id)
                        .push_bind(*pos as i64)
                        .push_bind(*oid)
                        .push_bind(**time);
                });
                qb.build().execute(&mut **tx).await?;
            }

            if !run.parent_commit_ids.is_empty() {
                let mut qb: QueryBuilder<Sqlite> =
                    QueryBuilder::new("INSERT OR IGNORE INTO commit_run_parents (run_id, parent_id) ");
                qb.push_values(&run.parent_commit_ids, |mut row, parent| {
                    row.push_bind(&run.id).push_bind(parent);
                });
                qb.build().execute(&mut **tx).await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn delete_run_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        run_id: &str,
    ) -> Result<()> {
        for sql in [
            "DELETE FROM commit_runs WHERE id = ?",
            "DELETE FROM commit_run_commits WHERE run_id = ?",
            "DELETE FROM commit_run_parents WHERE run_id = ?",
        ] {
            sqlx::query(sql).bind(run_id).execute(&mut **tx).await?;
        }
        Ok(())
    }

    pub(crate) async fn save_last_commits_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        records: &[LastCommit],
    ) -> Result<()> {
        for chunk in records.chunks(BATCH_SIZE) {
            let rows = chunk
                .iter()
                .map(|lc| Ok((lc, serde_json::to_string(&lc.info)?)))
                .collect::<Result<Vec<_>>>()?;

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR REPLACE INTO last_commits (key, repo_id, path, name, object_id, commit_info) ",
            );
            qb.push_values(&rows, |mut row, (lc, info)| {
                row.push_bind(lc.key())
                    .push_bind(&lc.repo_id)
                    .push_bind(&lc.path)
                    .push_bind(&lc.name)
                    .push_bind(&lc.object_id)
                    .push_bind(info);
            });
            qb.build().execute(&mut **tx).await?;
        }
        Ok(())
    }

    pub(crate) async fn save_trees_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        trees: &[Tree],
    ) -> Result<()> {
        for chunk in trees.chunks(BATCH_SIZE) {
            let rows = chunk
                .iter()
                .map(|t| Ok((&t.id, serde_json::to_string(&t.entries)?)))
                .collect::<Result<Vec<_>>>()?;

            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO trees (id, entries) ");
            qb.push_values(&rows, |mut row, (id, entries)| {
                row.push_bind(*id).push_bind(entries);
            });
            qb.build().execute(&mut **tx).await?;
        }
        Ok(())
    }
}

/// True when an insert failed because the key already exists
pub(crate) fn is_duplicate(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Appends `(?, ?, ...)` binding every id
pub(crate) fn push_id_list<'a>(qb: &mut QueryBuilder<'a, Sqlite>, ids: &'a [Oid]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");
}

pub(crate) fn repo_from_row(row: &SqliteRow) -> Result<RepoHandle> {
    let tool: String = row.get("tool");
    let status: String = row.get("status");
    let refs: String = row.get("refs");
    Ok(RepoHandle {
        id: row.get("id"),
        name: row.get("name"),
        tool: Tool::from_str(&tool).map_err(crate::error::IndexError::Config)?,
        status: RepoStatus::parse(&status),
        refs: serde_json::from_str::<RefSet>(&refs)?,
    })
}

/// Commit columns only; back-reference lists are filled in by the caller
pub(crate) fn commit_from_row(row: &SqliteRow) -> Result<Commit> {
    let parent_ids: String = row.get("parent_ids");
    Ok(Commit {
        id: row.get("id"),
        tree_id: row.get("tree_id"),
        authored: Signature::new(
            row.get::<String, _>("author_name"),
            row.get::<String, _>("author_email"),
            row.get("author_date"),
        ),
        committed: Signature::new(
            row.get::<String, _>("committer_name"),
            row.get::<String, _>("committer_email"),
            row.get("committer_date"),
        ),
        message: row.get("message"),
        parent_ids: serde_json::from_str(&parent_ids)?,
        child_ids: Vec::new(),
        repo_ids: Vec::new(),
    })
}

pub(crate) fn last_commit_from_row(row: &SqliteRow) -> Result<LastCommit> {
    let info: String = row.get("commit_info");
    Ok(LastCommit {
        repo_id: row.get("repo_id"),
        path: row.get("path"),
        name: row.get("name"),
        object_id: row.get("object_id"),
        info: serde_json::from_str::<CommitInfo>(&info)?,
    })
}

pub(crate) fn merge_request_from_row(row: &SqliteRow) -> MergeRequest {
    let status: String = row.get("status");
    MergeRequest {
        target_repo_id: row.get("target_repo_id"),
        request_number: row.get("request_number"),
        status: MergeStatus::parse(&status),
        downstream_repo_id: row.get("downstream_repo_id"),
        commit_id: row.get("commit_id"),
        target_branch: row.get("target_branch"),
        summary: row.get("summary"),
        description: row.get("description"),
        creator: row.get("creator"),
        created: row.get("created"),
    }
}

pub(crate) fn refs_to_json(refs: &RefSet) -> Result<String> {
    Ok(serde_json::to_string(refs)?)
}
