//! Task Registry: the authoritative in-memory map of task id to task.
//!
//! All mutation flows through here; DashMap entry locking serializes
//! concurrent operations on the same task id. Registries are explicit
//! objects, not process-wide singletons, so tests and embedders can run
//! several independent engines side by side.

use dashmap::DashMap;

use crate::error::{EngineError, Result};
use crate::models::{Task, TaskId};
use crate::state_machine::{StateMachineError, TaskEvent, TaskState, TaskStateMachine};

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, Task>,
}

/// A committed transition: where the task came from, where it landed, and
/// the snapshot taken under the entry lock.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: TaskState,
    pub to: TaskState,
    pub snapshot: Task,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a task; replaces any previous task under the same id
    pub fn insert(&self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Snapshot of one task
    pub fn get(&self, task_id: TaskId) -> Result<Task> {
        self.tasks
            .get(&task_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    /// Current state of one task
    pub fn state(&self, task_id: TaskId) -> Result<TaskState> {
        Ok(self.get(task_id)?.state)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.contains_key(&task_id)
    }

    /// Apply a state-machine event under the entry lock.
    ///
    /// `Ok(Some)` is a committed transition; `Ok(None)` means the event was
    /// not a legal edge and the task is untouched, the diagnostic being the
    /// caller's to log. Missing tasks are an error.
    pub fn apply_event(&self, task_id: TaskId, event: &TaskEvent) -> Result<Option<Transition>> {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;

        let from = entry.state;
        match TaskStateMachine::apply(&mut entry, event) {
            Ok(to) => Ok(Some(Transition {
                from,
                to,
                snapshot: entry.clone(),
            })),
            Err(
                StateMachineError::InvalidTransition { .. } | StateMachineError::TerminalState { .. },
            ) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Mutate a non-terminal task under the entry lock, returning the
    /// snapshot after mutation. Terminal tasks are immutable: the closure is
    /// not run and `Ok(None)` is returned.
    pub fn update<F>(&self, task_id: TaskId, mutate: F) -> Result<Option<Task>>
    where
        F: FnOnce(&mut Task),
    {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;

        if entry.is_terminal() {
            return Ok(None);
        }
        mutate(&mut entry);
        Ok(Some(entry.clone()))
    }

    /// Remove a task; returns the removed task if it existed
    pub fn remove(&self, task_id: TaskId) -> Option<Task> {
        self.tasks.remove(&task_id).map(|(_, task)| task)
    }

    /// Snapshots of all registered tasks
    pub fn all(&self) -> Vec<Task> {
        self.tasks.iter().map(|entry| entry.clone()).collect()
    }

    /// Snapshots of tasks currently in `state`
    pub fn tasks_by_state(&self, state: TaskState) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|entry| entry.state == state)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Number of tasks in an active (runner-driven) state
    pub fn active_task_count(&self) -> usize {
        self.tasks.iter().filter(|entry| entry.state.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
