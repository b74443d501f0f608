//! Completion tracking for correlation groups
//!
//! Every root channel fetch opens a group keyed by its [`CorrelationId`]. Each
//! task is registered in its group before its work is submitted and marked
//! complete exactly once. A group is quiescent when everything it spawned has
//! completed; at that moment it is pruned, so nothing can join it afterwards.
//!
//! Completion handlers register all of their children *before* marking their
//! own task complete, which is what makes "spawned == completed" a reliable
//! signal that growth has stopped.

use crate::error::RegistryError;
use crate::types::{CorrelationId, TaskId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Spawned and completed task ids of one group
#[derive(Debug, Default)]
struct GroupEntry {
    spawned: HashSet<TaskId>,
    completed: HashSet<TaskId>,
}

impl GroupEntry {
    fn outstanding(&self) -> usize {
        self.spawned.len() - self.completed.len()
    }

    fn is_quiescent(&self) -> bool {
        !self.spawned.is_empty() && self.outstanding() == 0
    }
}

/// Point-in-time view of a group, for diagnostics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupProgress {
    /// Completed task ids, ascending
    pub completed: Vec<TaskId>,
    /// Registered but not yet completed task ids, ascending
    pub remaining: Vec<TaskId>,
}

/// Per-correlation-id bookkeeping of spawned and completed tasks
///
/// All operations take one lock for their whole read-modify-write, so two
/// concurrent completions can never both (or neither) observe quiescence.
#[derive(Debug)]
pub struct TaskRegistry {
    groups: Mutex<HashMap<CorrelationId, GroupEntry>>,
    max_outstanding: usize,
}

impl TaskRegistry {
    /// Create a registry that caps each group at `max_outstanding` unfinished tasks
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            max_outstanding: max_outstanding.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CorrelationId, GroupEntry>> {
        // A panic while holding the lock cannot leave the sets half-updated
        self.groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open an empty group for a new root request
    ///
    /// Returns false if the group was already open.
    pub fn open(&self, correlation_id: CorrelationId) -> bool {
        let mut groups = self.lock();
        if groups.contains_key(&correlation_id) {
            return false;
        }
        groups.insert(correlation_id, GroupEntry::default());
        true
    }

    /// Record a spawned task
    ///
    /// Must happen before the task's work is submitted.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        task_id: TaskId,
    ) -> Result<(), RegistryError> {
        let mut groups = self.lock();
        let entry = groups
            .get_mut(&correlation_id)
            .ok_or(RegistryError::UnknownGroup { correlation_id })?;

        if entry.outstanding() >= self.max_outstanding {
            return Err(RegistryError::TooManyOutstanding {
                correlation_id,
                limit: self.max_outstanding,
            });
        }

        entry.spawned.insert(task_id);
        Ok(())
    }

    /// Record a completion
    ///
    /// Each task completes once; a second report is an error. Returns `Ok(true)` iff this call made the group quiescent. The group is
    /// then removed, so later registrations into it fail.
    pub fn mark_complete(
        &self,
        correlation_id: CorrelationId,
        task_id: TaskId,
    ) -> Result<bool, RegistryError> {
        let mut groups = self.lock();
        let entry = groups
            .get_mut(&correlation_id)
            .ok_or(RegistryError::UnknownGroup { correlation_id })?;

        if !entry.spawned.contains(&task_id) {
            return Err(RegistryError::UnknownTask {
                correlation_id,
                task_id,
            });
        }

        if !entry.completed.insert(task_id) {
            return Err(RegistryError::AlreadyCompleted {
                correlation_id,
                task_id,
            });
        }

        if entry.is_quiescent() {
            groups.remove(&correlation_id);
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop a group, typically after one of its tasks failed
    ///
    /// Returns the number of tasks that were still outstanding.
    pub fn abandon(&self, correlation_id: CorrelationId) -> Option<usize> {
        self.lock()
            .remove(&correlation_id)
            .map(|entry| entry.outstanding())
    }

    /// Whether a group is still open
    pub fn is_open(&self, correlation_id: CorrelationId) -> bool {
        self.lock().contains_key(&correlation_id)
    }

    /// Number of unfinished tasks in a group (None if not open)
    pub fn outstanding(&self, correlation_id: CorrelationId) -> Option<usize> {
        self.lock()
            .get(&correlation_id)
            .map(GroupEntry::outstanding)
    }

    /// Completed and remaining task ids of an open group
    pub fn progress(&self, correlation_id: CorrelationId) -> Option<GroupProgress> {
        let groups = self.lock();
        let entry = groups.get(&correlation_id)?;

        let mut completed: Vec<TaskId> = entry.completed.iter().copied().collect();
        let mut remaining: Vec<TaskId> = entry
            .spawned
            .difference(&entry.completed)
            .copied()
            .collect();
        completed.sort();
        remaining.sort();

        Some(GroupProgress {
            completed,
            remaining,
        })
    }

    /// Number of open groups
    pub fn open_groups(&self) -> usize {
        self.lock().len()
    }
}
