use super::commit::Oid;

/// A chain of single-parent commits, newest first.
///
/// Every member except the last has exactly one parent, and that parent is the
/// next member. `parent_commit_ids` are the parents of the last member.
/// The run id is the id of its head commit at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRun {
    pub id: Oid,
    pub parent_commit_ids: Vec<Oid>,
    pub commit_ids: Vec<Oid>,
    /// Authored timestamps, parallel to `commit_ids`
    pub commit_times: Vec<i64>,
}

impl CommitRun {
    pub fn singleton(id: Oid, parent_ids: Vec<Oid>, time: i64) -> Self {
        Self {
            id: id.clone(),
            parent_commit_ids: parent_ids,
            commit_ids: vec![id],
            commit_times: vec![time],
        }
    }

    pub fn head(&self) -> &str {
        &self.commit_ids[0]
    }

    pub fn position(&self, commit_id: &str) -> Option<usize> {
        self.commit_ids.iter().position(|c| c == commit_id)
    }

    pub fn contains(&self, commit_id: &str) -> bool {
        self.position(commit_id).is_some()
    }

    /// The single parent this run could be extended with, if any
    pub fn single_parent(&self) -> Option<&str> {
        match self.parent_commit_ids.as_slice() {
            [p] => Some(p),
            _ => None,
        }
    }

    /// Appends `parent` (whose head is this run's single parent) to the tail
    pub fn absorb(&mut self, parent: CommitRun) {
        self.commit_ids.extend(parent.commit_ids);
        self.commit_times.extend(parent.commit_times);
        self.parent_commit_ids = parent.parent_commit_ids;
    }

    /// True when every member of `self` is also a member of `other`
    pub fn is_subset_of(&self, other: &CommitRun) -> bool {
        self.commit_ids.iter().all(|c| other.contains(c))
    }
}
