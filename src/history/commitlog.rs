//! Commit graph traversal over commit runs

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::error::{IndexError, Result};
use crate::model::Oid;
use crate::repository::IndexStore;

/// Kahn's algorithm over a `commit -> parent ids` map. Parents come before children.
///
/// Parent ids that are not keys of `graph` are treated as already known and ignored.
pub fn topological_sort(graph: &FxHashMap<Oid, Vec<Oid>>) -> Result<Vec<Oid>> {
    let mut pending: FxHashMap<&str, usize> = FxHashMap::default();
    let mut children: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

    for (id, parents) in graph {
        let entry = pending.entry(id.as_str()).or_insert(0);
        for parent in parents {
            if graph.contains_key(parent) {
                *entry += 1;
                children.entry(parent.as_str()).or_default().push(id.as_str());
            }
        }
    }

    let mut roots: Vec<&str> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();
    roots.sort_unstable();
    let mut queue: VecDeque<&str> = roots.into();

    let mut result: Vec<Oid> = Vec::with_capacity(graph.len());
    while let Some(id) = queue.pop_front() {
        result.push(id.to_string());
        let Some(kids) = children.get_mut(id) else {
            continue;
        };
        kids.sort_unstable();
        for kid in kids.iter() {
            if let Some(n) = pending.get_mut(kid) {
                *n -= 1;
                if *n == 0 {
                    queue.push_back(*kid);
                }
            }
        }
    }

    if result.len() < graph.len() {
        return Err(IndexError::CycleDetected(graph.len() - result.len()));
    }
    Ok(result)
}

/// Lazy newest-first walk over the ancestry of a set of commits.
///
/// Yields each reachable commit once, and never before any of its reachable
/// descendants. Among ready commits the most recently authored goes first,
/// except that a parent freed by the previous step is preferred.
#[derive(Debug)]
pub struct CommitLog {
    times: FxHashMap<Oid, i64>,
    parents: FxHashMap<Oid, Vec<Oid>>,
    children: FxHashMap<Oid, FxHashSet<Oid>>,
    ready: FxHashSet<Oid>,
    new_parent: Option<Oid>,
}

impl CommitLog {
    /// Number of commits in the loaded graph
    pub fn graph_len(&self) -> usize {
        self.times.len()
    }

    fn pick(&self) -> Option<Oid> {
        if let Some(p) = &self.new_parent {
            if self.ready.contains(p) {
                return Some(p.clone());
            }
        }
        self.ready
            .iter()
            .max_by(|a, b| {
                let ta = self.times.get(*a).copied().unwrap_or(i64::MIN);
                let tb = self.times.get(*b).copied().unwrap_or(i64::MIN);
                ta.cmp(&tb).then_with(|| a.cmp(b))
            })
            .cloned()
    }
}

impl Iterator for CommitLog {
    type Item = Oid;

    fn next(&mut self) -> Option<Oid> {
        let ci = self.pick()?;
        self.ready.remove(&ci);
        self.new_parent = None;

        if let Some(parents) = self.parents.get(&ci) {
            for parent in parents {
                if let Some(kids) = self.children.get_mut(parent) {
                    kids.remove(&ci);
                    if kids.is_empty() {
                        self.ready.insert(parent.clone());
                        self.new_parent = Some(parent.clone());
                    }
                }
            }
        }
        Some(ci)
    }
}

/// Build the commit graph reachable from `start_ids` out of the stored runs.
///
/// Fails with [`IndexError::MissingRun`] when a reachable commit has no run;
/// the caller must rebuild runs for the repository and retry.
pub async fn commitlog(store: &impl IndexStore, start_ids: &[Oid]) -> Result<CommitLog> {
    let mut times: FxHashMap<Oid, i64> = FxHashMap::default();
    let mut parents: FxHashMap<Oid, Vec<Oid>> = FxHashMap::default();
    let mut to_visit: Vec<Oid> = start_ids.iter().rev().cloned().collect();

    while let Some(commit_id) = to_visit.pop() {
        if times.contains_key(&commit_id) {
            continue;
        }
        let run = store
            .run_for_commit(&commit_id)
            .await?
            .ok_or_else(|| IndexError::MissingRun(commit_id.clone()))?;
        let Some(start) = run.position(&commit_id) else {
            return Err(IndexError::MissingRun(commit_id));
        };

        let last = run.commit_ids.len() - 1;
        let mut reached_end = true;
        for pos in start..=last {
            let oid = &run.commit_ids[pos];
            if times.contains_key(oid) {
                // The rest of this run was walked from another start
                reached_end = false;
                break;
            }
            times.insert(oid.clone(), run.commit_times[pos]);
            let ps = if pos < last {
                vec![run.commit_ids[pos + 1].clone()]
            } else {
                run.parent_commit_ids.clone()
            };
            parents.insert(oid.clone(), ps);
        }
        if reached_end {
            to_visit.extend(run.parent_commit_ids.iter().rev().cloned());
        }
    }

    let mut children: FxHashMap<Oid, FxHashSet<Oid>> = FxHashMap::default();
    for (oid, ps) in &parents {
        for parent in ps {
            if times.contains_key(parent) {
                children.entry(parent.clone()).or_default().insert(oid.clone());
            }
        }
    }

    let ready: FxHashSet<Oid> = start_ids
        .iter()
        .filter(|id| children.get(*id).is_none_or(|kids| kids.is_empty()))
        .cloned()
        .collect();

    tracing::debug!(
        "Built commit graph: {} commits from {} starts",
        times.len(),
        start_ids.len()
    );

    Ok(CommitLog {
        times,
        parents,
        children,
        ready,
        new_parent: None,
    })
}
