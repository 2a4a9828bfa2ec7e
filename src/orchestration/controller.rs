//! Task Controller: the operation surface exposed to callers.
//!
//! Every mutating call validates the transition against the state machine,
//! applies it to the in-memory registry, mirrors the resulting snapshot to
//! the persistence store, and notifies subscribers. Store failures degrade
//! to task warnings; they never escape to the caller, and the registry stays
//! authoritative throughout (cross-restart resumability is simply not
//! guaranteed until the store recovers).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::registry::TaskRegistry;
use super::types::CommitResult;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{EventPublisher, NotificationKind, TaskNotification};
use crate::models::{
    Checkpoint, CheckpointData, Task, TaskConfig, TaskErrorEntry, TaskId, TaskType,
    TaskWarningEntry,
};
use crate::state_machine::{TaskEvent, TaskState};
use crate::store::PersistenceStore;

pub struct TaskController {
    registry: TaskRegistry,
    store: Arc<dyn PersistenceStore>,
    publisher: EventPublisher,
    config: EngineConfig,
}

impl TaskController {
    pub fn new(store: Arc<dyn PersistenceStore>, config: EngineConfig) -> Self {
        let publisher = EventPublisher::new(config.event_channel_capacity);
        Self {
            registry: TaskRegistry::new(),
            store,
            publisher,
            config,
        }
    }

    /// Engine-wide configuration this controller was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Per-task defaults derived from the engine configuration
    pub fn task_defaults(&self) -> TaskConfig {
        self.config.task_defaults()
    }

    // ------------------------------------------------------------------
    // Creation and lifecycle operations
    // ------------------------------------------------------------------

    /// Create a new idle task over the given input rows
    pub async fn create_task(
        &self,
        task_type: TaskType,
        input: Vec<serde_json::Value>,
        config: TaskConfig,
    ) -> Result<Task> {
        let task = Task::new(task_type, input, config);
        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            total = task.progress.total,
            "task created"
        );

        self.registry.insert(task.clone());
        self.mirror(&task).await;
        self.publisher.publish(task.clone(), NotificationKind::Created);
        Ok(task)
    }

    /// Drive a startable task through `preparing -> validating -> processing`.
    ///
    /// Returns the state the task ends up in: `Processing` on success,
    /// `Failed` when validation rejects the configuration, or the unchanged
    /// current state when the task was not startable (no-op per the state
    /// machine rules).
    pub async fn start_task(&self, task_id: TaskId) -> Result<TaskState> {
        let state = self.transition(task_id, TaskEvent::Start).await?;
        if state != TaskState::Preparing {
            return Ok(state);
        }

        // Preparation: input is already sliced lazily; nothing to stage
        let state = self.transition(task_id, TaskEvent::BeginValidation).await?;
        if state != TaskState::Validating {
            return Ok(state);
        }

        let task = self.registry.get(task_id)?;
        if let Err(reason) = task.config.validate() {
            self.add_error_entry(task_id, TaskErrorEntry {
                message: reason.clone(),
                code: Some("E_CONFIG".to_string()),
                batch_index: None,
                row_index: None,
                occurred_at: Utc::now(),
            })
            .await?;
            return self.fail_task(task_id, reason).await;
        }

        self.registry
            .update(task_id, |task| task.progress.mark_started(Utc::now()))?;
        self.transition(task_id, TaskEvent::BeginProcessing).await
    }

    /// Suspend a processing task at the next batch boundary.
    ///
    /// The batch runner finishes its in-flight batch before the pause takes
    /// effect; no partial-batch tears.
    pub async fn pause_task(&self, task_id: TaskId) -> Result<TaskState> {
        let task = self.registry.get(task_id)?;
        if !task.config.resumable {
            warn!(task_id = %task_id, "ignoring pause request for non-resumable task");
            return Ok(task.state);
        }
        self.transition(task_id, TaskEvent::Pause).await
    }

    /// Leave the paused state; the batch runner completes the resume by
    /// re-entering processing at the latest checkpoint
    pub async fn resume_task(&self, task_id: TaskId) -> Result<TaskState> {
        self.transition(task_id, TaskEvent::Resume).await
    }

    /// Resuming -> Processing, once the checkpoint has been re-read
    pub(crate) async fn complete_resume(&self, task_id: TaskId) -> Result<TaskState> {
        self.transition(task_id, TaskEvent::ResumeComplete).await
    }

    /// Cancel from any non-terminal state; the batch runner observes the new
    /// state at its next yield point and stops without committing further
    /// batches
    pub async fn cancel_task(&self, task_id: TaskId) -> Result<TaskState> {
        self.transition(task_id, TaskEvent::Cancel).await
    }

    pub(crate) async fn complete_task(&self, task_id: TaskId) -> Result<TaskState> {
        self.transition(task_id, TaskEvent::Complete).await
    }

    pub(crate) async fn fail_task(
        &self,
        task_id: TaskId,
        reason: impl Into<String>,
    ) -> Result<TaskState> {
        self.transition(task_id, TaskEvent::fail_with_error(reason)).await
    }

    /// Remove a task from the registry and the store, checkpoints included
    pub async fn delete_task(&self, task_id: TaskId) -> Result<bool> {
        let removed = self.registry.remove(task_id);

        if let Err(err) = self.store.delete_task(task_id).await {
            warn!(task_id = %task_id, error = %err, "store delete failed");
        }

        match removed {
            Some(task) => {
                self.publisher.publish(task, NotificationKind::Deleted);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // Progress, errors, checkpoints
    // ------------------------------------------------------------------

    /// Fold one batch outcome into the task's progress and error list.
    ///
    /// Returns whether the fold was applied; a task that reached a terminal
    /// state while the batch was in flight (cancel, task-level failure)
    /// refuses the fold, and the caller must not checkpoint past it.
    pub async fn update_task_progress(
        &self,
        task_id: TaskId,
        result: &CommitResult,
    ) -> Result<bool> {
        let snapshot = self.registry.update(task_id, |task| {
            task.progress
                .record_batch(result.successful, result.failed, result.skipped);
            for row_error in &result.errors {
                task.add_error(TaskErrorEntry::row(
                    row_error.row_index,
                    row_error.message.clone(),
                    row_error.code.clone(),
                ));
            }
        })?;

        match snapshot {
            Some(task) => {
                self.mirror(&task).await;
                self.publisher.publish(task, NotificationKind::ProgressUpdated);
                Ok(true)
            }
            None => {
                debug!(task_id = %task_id, "progress update ignored, task is terminal");
                Ok(false)
            }
        }
    }

    /// Write a checkpoint recording `batch_index` as the next unprocessed
    /// batch. A store failure is recorded as a task warning and does not
    /// escape; the returned option says whether the checkpoint is durable.
    pub async fn save_checkpoint(
        &self,
        task_id: TaskId,
        batch_index: usize,
    ) -> Result<Option<Checkpoint>> {
        let task = self.registry.get(task_id)?;
        let checkpoint = Checkpoint::new(
            task_id,
            batch_index,
            CheckpointData::from_progress(&task.progress),
        );

        match self.store.save_checkpoint(&checkpoint).await {
            Ok(()) => {
                debug!(task_id = %task_id, batch_index, "checkpoint saved");
                self.publisher
                    .publish(task, NotificationKind::CheckpointSaved { batch_index });
                Ok(Some(checkpoint))
            }
            Err(err) => {
                warn!(task_id = %task_id, batch_index, error = %err, "checkpoint persistence failed");
                self.record_store_warning(task_id, format!("checkpoint persistence failed: {err}"));
                Ok(None)
            }
        }
    }

    /// Most recent checkpoint for a task, if the store has one
    pub async fn latest_checkpoint(&self, task_id: TaskId) -> Result<Option<Checkpoint>> {
        Ok(self.store.latest_checkpoint(task_id).await?)
    }

    /// Append a structured error and rebroadcast the snapshot
    pub async fn add_error(&self, task_id: TaskId, entry: TaskErrorEntry) -> Result<()> {
        self.add_error_entry(task_id, entry).await
    }

    async fn add_error_entry(&self, task_id: TaskId, entry: TaskErrorEntry) -> Result<()> {
        let snapshot = self.registry.update(task_id, |task| task.add_error(entry))?;
        if let Some(task) = snapshot {
            self.mirror(&task).await;
            self.publisher.publish(task, NotificationKind::ErrorRecorded);
        }
        Ok(())
    }

    /// Append a structured warning and rebroadcast the snapshot
    pub async fn add_warning(&self, task_id: TaskId, entry: TaskWarningEntry) -> Result<()> {
        let snapshot = self.registry.update(task_id, |task| task.add_warning(entry))?;
        if let Some(task) = snapshot {
            self.mirror(&task).await;
            self.publisher.publish(task, NotificationKind::WarningRecorded);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read accessors and observability
    // ------------------------------------------------------------------

    pub fn get_task(&self, task_id: TaskId) -> Result<Task> {
        self.registry.get(task_id)
    }

    pub fn get_task_state(&self, task_id: TaskId) -> Result<TaskState> {
        self.registry.state(task_id)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.registry.all()
    }

    pub fn tasks_by_state(&self, state: TaskState) -> Vec<Task> {
        self.registry.tasks_by_state(state)
    }

    pub fn active_task_count(&self) -> usize {
        self.registry.active_task_count()
    }

    /// Subscribe to task notifications; unsubscribe by dropping the receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TaskNotification> {
        self.publisher.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    // ------------------------------------------------------------------
    // Resume contract and housekeeping
    // ------------------------------------------------------------------

    /// Non-terminal tasks found in the store, for post-restart inspection
    pub async fn load_resumable_tasks(&self) -> Result<Vec<Task>> {
        let tasks = self.store.load_all_tasks().await?;
        Ok(tasks.into_iter().filter(|task| !task.is_terminal()).collect())
    }

    /// Re-admit a persisted task into the registry.
    ///
    /// A snapshot caught mid-run (its state was active when the process
    /// died) is normalized to `Paused` so the ordinary resume path applies.
    /// The caller re-supplies the commit function to the batch runner.
    pub async fn restore_task(&self, mut task: Task) -> Result<Task> {
        if task.state.is_active() {
            debug!(task_id = %task.id, from = %task.state, "normalizing restored task to paused");
            task.state = TaskState::Paused;
        }

        self.registry.insert(task.clone());
        self.publisher.publish(task.clone(), NotificationKind::Restored);
        Ok(task)
    }

    /// Reconcile in-memory counters with a checkpoint that is ahead of the
    /// persisted task snapshot (the store lags by at most one batch)
    pub(crate) fn reconcile_from_checkpoint(
        &self,
        task_id: TaskId,
        checkpoint: &Checkpoint,
    ) -> Result<()> {
        self.registry.update(task_id, |task| {
            if checkpoint.data.processed > task.progress.processed {
                task.progress.processed = checkpoint.data.processed;
                task.progress.successful = checkpoint.data.successful;
                task.progress.failed = checkpoint.data.failed;
                task.progress.skipped = checkpoint.data.skipped;
            }
        })?;
        Ok(())
    }

    /// Delete terminal tasks (and checkpoints) completed before the cutoff
    /// from both the store and the registry; returns the store's removal
    /// count
    pub async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let removed = self.store.cleanup(older_than).await?;

        for task in self.registry.all() {
            let expired = task.is_terminal()
                && task.completed_at.map(|at| at < older_than).unwrap_or(false);
            if expired {
                self.registry.remove(task.id);
            }
        }

        if removed > 0 {
            info!(removed, "cleanup removed expired tasks");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Apply one state-machine event: validate, commit to the registry,
    /// mirror, notify. Illegal events are no-ops with a diagnostic and
    /// return the unchanged current state.
    async fn transition(&self, task_id: TaskId, event: TaskEvent) -> Result<TaskState> {
        match self.registry.apply_event(task_id, &event)? {
            Some(transition) => {
                info!(
                    task_id = %task_id,
                    from = %transition.from,
                    to = %transition.to,
                    event = event.event_type(),
                    "task transition"
                );
                self.mirror(&transition.snapshot).await;
                self.publisher.publish(
                    transition.snapshot,
                    NotificationKind::StateChanged {
                        from: transition.from,
                        to: transition.to,
                    },
                );
                Ok(transition.to)
            }
            None => {
                let state = self.registry.state(task_id)?;
                warn!(
                    task_id = %task_id,
                    state = %state,
                    event = event.event_type(),
                    "ignoring event, not a legal transition"
                );
                Ok(state)
            }
        }
    }

    /// Mirror a snapshot to the store; failures degrade to a task warning
    async fn mirror(&self, task: &Task) {
        if let Err(err) = self.store.save_task(task).await {
            warn!(task_id = %task.id, error = %err, "task persistence failed");
            self.record_store_warning(task.id, format!("task persistence failed: {err}"));
        }
    }

    /// Append a store-layer warning without re-mirroring (the store is the
    /// thing that just failed)
    fn record_store_warning(&self, task_id: TaskId, message: String) {
        let snapshot = self
            .registry
            .update(task_id, |task| task.add_warning(TaskWarningEntry::new(message)));
        if let Ok(Some(task)) = snapshot {
            self.publisher.publish(task, NotificationKind::WarningRecorded);
        }
    }
}
