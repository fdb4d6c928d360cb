//! Commit run construction and reconciliation

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::model::{CommitRun, Oid};
use crate::repository::IndexStore;

/// Builds maximal single-parent chains over a set of commits.
///
/// [`run`](Self::run) compresses the given commits into runs and stores them;
/// [`cleanup`](Self::cleanup) then reconciles them with runs persisted by
/// earlier refreshes.
pub struct CommitRunBuilder<'a, S: IndexStore> {
    store: &'a S,
    commit_ids: Vec<Oid>,
    batch_size: usize,
    rebuild: bool,
    /// commit id -> id of the run holding it
    run_index: FxHashMap<Oid, Oid>,
    runs: FxHashMap<Oid, CommitRun>,
    /// Why each run stopped growing
    reasons: FxHashMap<Oid, String>,
}

impl<'a, S: IndexStore> CommitRunBuilder<'a, S> {
    pub fn new(store: &'a S, commit_ids: Vec<Oid>) -> Self {
        Self {
            store,
            commit_ids,
            batch_size: 100,
            rebuild: false,
            run_index: FxHashMap::default(),
            runs: FxHashMap::default(),
            reasons: FxHashMap::default(),
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Start a singleton for every commit, even ones already covered by a stored run
    pub fn rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    pub fn runs(&self) -> impl Iterator<Item = &CommitRun> {
        self.runs.values()
    }

    pub fn stop_reason(&self, run_id: &str) -> Option<&str> {
        self.reasons.get(run_id).map(String::as_str)
    }

    /// Build and store runs for the builder's commits. Returns the number of runs.
    pub async fn run(&mut self) -> Result<usize> {
        let ids = std::mem::take(&mut self.commit_ids);
        for chunk in ids.chunks(self.batch_size) {
            let covered: FxHashSet<Oid> = if self.rebuild {
                FxHashSet::default()
            } else {
                self.store
                    .runs_containing(chunk)
                    .await?
                    .into_iter()
                    .flat_map(|run| run.commit_ids)
                    .collect()
            };

            for commit in self.store.get_commits(chunk).await? {
                if covered.contains(&commit.id) || self.run_index.contains_key(&commit.id) {
                    continue;
                }
                self.run_index.insert(commit.id.clone(), commit.id.clone());
                self.runs.insert(
                    commit.id.clone(),
                    CommitRun::singleton(
                        commit.id.clone(),
                        commit.parent_ids.clone(),
                        commit.authored.date,
                    ),
                );
            }
        }
        self.commit_ids = ids;

        self.merge_runs();
        tracing::info!(
            "Built {} commit runs from {} commits",
            self.runs.len(),
            self.commit_ids.len()
        );
        for (run_id, reason) in &self.reasons {
            tracing::debug!("Run {} stopped: {}", run_id, reason);
        }

        let mut runs: Vec<CommitRun> = self.runs.values().cloned().collect();
        runs.sort_by(|a, b| a.id.cmp(&b.id));
        for chunk in runs.chunks(self.batch_size) {
            self.store.save_runs(chunk).await?;
        }
        Ok(runs.len())
    }

    /// Single pass to a fixpoint: each run keeps absorbing the run headed by
    /// its single parent.
    fn merge_runs(&mut self) {
        let mut ids: Vec<Oid> = self.runs.keys().cloned().collect();
        ids.sort_unstable();

        for run_id in ids {
            loop {
                let Some(run) = self.runs.get(&run_id) else {
                    // Absorbed by a child run earlier in the pass
                    break;
                };
                let parent = match run.single_parent() {
                    Some(p) => p.to_string(),
                    None => {
                        let reason = format!("{} parents", run.parent_commit_ids.len());
                        self.reasons.insert(run_id.clone(), reason);
                        break;
                    }
                };
                let Some(parent_run_id) = self.run_index.get(&parent).cloned() else {
                    self.reasons
                        .insert(run_id.clone(), "parent commit not found".into());
                    break;
                };
                let starts_with_parent = match self.runs.get(&parent_run_id) {
                    Some(p) => p.head() == parent,
                    None => {
                        self.reasons
                            .insert(run_id.clone(), "parent run not found".into());
                        break;
                    }
                };
                if !starts_with_parent || parent_run_id == run_id {
                    self.reasons.insert(
                        run_id.clone(),
                        "parent does not start with parent commit".into(),
                    );
                    break;
                }

                let Some(parent_run) = self.runs.remove(&parent_run_id) else {
                    break;
                };
                self.reasons.remove(&parent_run_id);
                for cid in &parent_run.commit_ids {
                    self.run_index.insert(cid.clone(), run_id.clone());
                }
                if let Some(run) = self.runs.get_mut(&run_id) {
                    run.absorb(parent_run);
                }
            }
        }
    }

    /// Reconcile stored runs touching the builder's commits: drop runs contained
    /// in other runs, fold overlapping runs together and join runs whose tail
    /// parent heads another run. Returns the number of runs deleted.
    pub async fn cleanup(&mut self) -> Result<usize> {
        let mut all = self.discover().await?;
        let before: FxHashSet<Oid> = all.keys().cloned().collect();
        let mut dirty: FxHashSet<Oid> = FxHashSet::default();

        loop {
            let subsets = remove_subsets(&mut all);
            let overlaps = merge_overlaps(&mut all, &mut dirty);
            let heads = merge_heads(&mut all, &mut dirty);
            if !(subsets || overlaps || heads) {
                break;
            }
        }

        let mut removed: Vec<Oid> = before
            .into_iter()
            .filter(|id| !all.contains_key(id))
            .collect();
        removed.sort_unstable();
        for chunk in removed.chunks(self.batch_size) {
            self.store.delete_runs(chunk).await?;
        }

        let mut changed: Vec<CommitRun> = all
            .into_iter()
            .filter(|(id, _)| dirty.contains(id))
            .map(|(_, run)| run)
            .collect();
        changed.sort_by(|a, b| a.id.cmp(&b.id));
        for chunk in changed.chunks(self.batch_size) {
            self.store.save_runs(chunk).await?;
        }

        tracing::debug!(
            "Run cleanup: {} deleted, {} rewritten",
            removed.len(),
            changed.len()
        );
        Ok(removed.len())
    }

    /// Stored runs holding the builder's commits or their parents, runs that
    /// name those commits as parents, and every run reached by following
    /// parent commit ids from there down to the roots
    async fn discover(&self) -> Result<FxHashMap<Oid, CommitRun>> {
        let mut ids: Vec<Oid> = self.commit_ids.clone();
        for run in self.runs.values() {
            ids.extend(run.parent_commit_ids.iter().cloned());
        }
        ids.sort_unstable();
        ids.dedup();

        let mut found: FxHashMap<Oid, CommitRun> = FxHashMap::default();
        for chunk in ids.chunks(self.batch_size) {
            for run in self.store.runs_containing(chunk).await? {
                found.insert(run.id.clone(), run);
            }
            for run in self.store.runs_with_parents(chunk).await? {
                found.insert(run.id.clone(), run);
            }
        }
        for run in self.runs.values() {
            found.insert(run.id.clone(), run.clone());
        }

        let mut queried: FxHashSet<Oid> = ids.into_iter().collect();
        let mut frontier = next_parents(found.values(), &mut queried);
        let mut rounds = 0usize;
        while !frontier.is_empty() {
            rounds += 1;
            let mut reached: Vec<CommitRun> = Vec::new();
            for chunk in frontier.chunks(self.batch_size) {
                for run in self.store.runs_containing(chunk).await? {
                    if !found.contains_key(&run.id) {
                        reached.push(run);
                    }
                }
            }
            frontier = next_parents(reached.iter(), &mut queried);
            for run in reached {
                found.insert(run.id.clone(), run);
            }
        }
        tracing::debug!(
            "Discovered {} runs ({} ancestor rounds)",
            found.len(),
            rounds
        );
        Ok(found)
    }
}

/// Parent commit ids of `runs` not looked up yet, marking them as looked up
fn next_parents<'r>(
    runs: impl Iterator<Item = &'r CommitRun>,
    queried: &mut FxHashSet<Oid>,
) -> Vec<Oid> {
    let mut ids: Vec<Oid> = runs
        .flat_map(|run| run.parent_commit_ids.iter())
        .filter(|id| queried.insert((*id).clone()))
        .cloned()
        .collect();
    ids.sort_unstable();
    ids
}

/// commit id -> ids of the runs containing it
fn member_index(runs: &FxHashMap<Oid, CommitRun>) -> FxHashMap<Oid, Vec<Oid>> {
    let mut index: FxHashMap<Oid, Vec<Oid>> = FxHashMap::default();
    for run in runs.values() {
        for cid in &run.commit_ids {
            index.entry(cid.clone()).or_default().push(run.id.clone());
        }
    }
    index
}

fn sorted_ids(runs: &FxHashMap<Oid, CommitRun>) -> Vec<Oid> {
    let mut ids: Vec<Oid> = runs.keys().cloned().collect();
    ids.sort_unstable();
    ids
}

fn remove_subsets(runs: &mut FxHashMap<Oid, CommitRun>) -> bool {
    let index = member_index(runs);
    let mut changed = false;
    for run_id in sorted_ids(runs) {
        let Some(run) = runs.get(&run_id) else {
            continue;
        };
        let candidates = index.get(run.head()).map(Vec::as_slice).unwrap_or_default();
        let covered = candidates
            .iter()
            .filter(|other_id| **other_id != run_id)
            .filter_map(|other_id| runs.get(other_id))
            .any(|other| run.is_subset_of(other));
        if covered {
            tracing::debug!("Deleting run {}: subset of another run", run_id);
            runs.remove(&run_id);
            changed = true;
        }
    }
    changed
}

/// A run that reaches into the middle of another run's chain takes over the
/// rest of that chain.
fn merge_overlaps(runs: &mut FxHashMap<Oid, CommitRun>, dirty: &mut FxHashSet<Oid>) -> bool {
    let index = member_index(runs);
    let mut changed = false;
    for run_id in sorted_ids(runs) {
        let Some(run) = runs.get(&run_id) else {
            continue;
        };
        let head = run.head().to_string();
        let candidates = index.get(&head).cloned().unwrap_or_default();
        for other_id in candidates {
            if other_id == run_id {
                continue;
            }
            let (Some(run), Some(other)) = (runs.get(&run_id), runs.get(&other_id)) else {
                continue;
            };
            let Some(k) = other.position(&head) else {
                continue;
            };
            let tail = &other.commit_ids[k..];
            if k == 0 || tail.len() > run.commit_ids.len() || run.commit_ids[..tail.len()] != *tail
            {
                continue;
            }

            let Some(run) = runs.remove(&run_id) else {
                continue;
            };
            if let Some(other) = runs.get_mut(&other_id) {
                other.commit_ids.truncate(k);
                other.commit_times.truncate(k);
                other.absorb(run);
                dirty.insert(other_id.clone());
                changed = true;
            }
            break;
        }
    }
    changed
}

fn merge_heads(runs: &mut FxHashMap<Oid, CommitRun>, dirty: &mut FxHashSet<Oid>) -> bool {
    let mut heads: FxHashMap<Oid, Oid> = FxHashMap::default();
    for run in runs.values() {
        // Keep the longest run per head so a duplicate never wins
        let keep = match heads.get(run.head()).and_then(|id| runs.get(id)) {
            Some(existing) => run.commit_ids.len() > existing.commit_ids.len(),
            None => true,
        };
        if keep {
            heads.insert(run.head().to_string(), run.id.clone());
        }
    }

    let mut changed = false;
    for run_id in sorted_ids(runs) {
        loop {
            let Some(parent) = runs
                .get(&run_id)
                .and_then(|r| r.single_parent())
                .map(str::to_string)
            else {
                break;
            };
            let Some(parent_run_id) = heads.get(&parent).cloned() else {
                break;
            };
            if parent_run_id == run_id {
                break;
            }
            let Some(parent_run) = runs.remove(&parent_run_id) else {
                break;
            };
            heads.remove(&parent);
            if let Some(run) = runs.get_mut(&run_id) {
                run.absorb(parent_run);
                dirty.insert(run_id.clone());
                changed = true;
            }
        }
    }
    changed
}
