//! Last-commit-per-path propagation

use crate::error::Result;
use crate::model::{CommitInfo, LastCommit, ObjectKind, Oid};
use crate::repository::IndexStore;
use crate::util::dir_path;

use super::diff::TreeCache;

/// Records, for each path a commit touched, that the commit was the last to
/// change it. Records are buffered and written in batches; call
/// [`flush`](Self::flush) when done.
pub struct LastCommitPropagator<'a, S: IndexStore> {
    store: &'a S,
    repo_id: String,
    batch_size: usize,
    pending: Vec<LastCommit>,
    written: usize,
}

impl<'a, S: IndexStore> LastCommitPropagator<'a, S> {
    pub fn new(store: &'a S, repo_id: impl Into<String>) -> Self {
        Self {
            store,
            repo_id: repo_id.into(),
            batch_size: 100,
            pending: Vec::new(),
            written: 0,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Records written so far, flushed or not
    pub fn written(&self) -> usize {
        self.written + self.pending.len()
    }

    /// Compare `tree_id` against `prior_tree_id` and record `info` for every
    /// child that is new or has a different id. Unchanged subtrees are pruned.
    ///
    /// Records are never deleted; paths removed later keep their stale entry.
    pub async fn refresh_last_commit(
        &mut self,
        trees: &mut TreeCache<'_, S>,
        tree_id: &str,
        prior_tree_id: Option<&str>,
        info: &CommitInfo,
    ) -> Result<()> {
        let mut stack: Vec<(Vec<String>, Oid, Option<Oid>)> = vec![(
            Vec::new(),
            tree_id.to_string(),
            prior_tree_id.map(str::to_string),
        )];

        while let Some((parts, tree_id, prior_id)) = stack.pop() {
            if prior_id.as_deref() == Some(tree_id.as_str()) {
                continue;
            }
            let tree = trees.get(&tree_id).await?;
            let prior = trees.get_or_empty(prior_id.as_deref()).await?;
            let parts_ref: Vec<&str> = parts.iter().map(String::as_str).collect();
            let path = dir_path(&parts_ref);

            for entry in &tree.entries {
                let prior_entry = prior.get(&entry.name);
                if prior_entry.is_some_and(|p| p.id == entry.id) {
                    continue;
                }
                self.pending.push(LastCommit {
                    repo_id: self.repo_id.clone(),
                    path: path.clone(),
                    name: entry.name.clone(),
                    object_id: entry.id.clone(),
                    info: info.clone(),
                });
                if entry.kind == ObjectKind::Tree {
                    let mut child = parts.clone();
                    child.push(entry.name.clone());
                    let prior_sub = prior_entry
                        .filter(|p| p.kind == ObjectKind::Tree)
                        .map(|p| p.id.clone());
                    stack.push((child, entry.id.clone(), prior_sub));
                }
            }
        }

        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.pending);
        for chunk in records.chunks(self.batch_size) {
            self.store.save_last_commits(chunk).await?;
        }
        self.written += records.len();
        Ok(())
    }
}
