//! Batch Runner: drives one task's input through the caller-supplied commit
//! function in fixed-size slices.
//!
//! Per batch: slice the next unprocessed rows, commit, fold the outcome into
//! progress, checkpoint, then yield to the scheduler so pause and cancel
//! requests are observed at batch boundaries. A batch is either fully
//! reflected in progress and checkpointed or not reflected at all; batches,
//! not rows, are the unit of resumability atomicity.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::controller::TaskController;
use super::types::{BatchCommitter, BatchRunSummary, CommitResult};
use crate::error::Result;
use crate::models::{TaskErrorEntry, TaskId, TaskWarningEntry};
use crate::state_machine::TaskState;

/// Control-flow outcome of folding one batch
enum BatchFold {
    Continue,
    Abort(TaskState),
}

pub struct BatchRunner {
    controller: Arc<TaskController>,
}

impl BatchRunner {
    pub fn new(controller: Arc<TaskController>) -> Self {
        Self { controller }
    }

    /// Start a task from the beginning and drive it until it reaches a
    /// terminal state, pauses, or is cancelled.
    ///
    /// Returns early (with the unchanged state) when the task was not
    /// startable or validation failed.
    pub async fn run(
        &self,
        task_id: TaskId,
        committer: Arc<dyn BatchCommitter>,
    ) -> Result<BatchRunSummary> {
        let state = self.controller.start_task(task_id).await?;
        if state != TaskState::Processing {
            return Ok(BatchRunSummary {
                batches_run: 0,
                final_state: state,
                consecutive_failures: 0,
            });
        }
        self.drive(task_id, 0, committer).await
    }

    /// Resume a paused task from its latest checkpoint.
    ///
    /// The checkpointed batch index is the re-entry point; checkpointed
    /// counters reconcile any gap left by a store snapshot lagging one
    /// batch behind.
    pub async fn resume(
        &self,
        task_id: TaskId,
        committer: Arc<dyn BatchCommitter>,
    ) -> Result<BatchRunSummary> {
        let state = self.controller.resume_task(task_id).await?;
        if state != TaskState::Resuming {
            return Ok(BatchRunSummary {
                batches_run: 0,
                final_state: state,
                consecutive_failures: 0,
            });
        }

        let start_index = match self.controller.latest_checkpoint(task_id).await? {
            Some(checkpoint) => {
                self.controller.reconcile_from_checkpoint(task_id, &checkpoint)?;
                checkpoint.batch_index
            }
            None => 0,
        };
        debug!(task_id = %task_id, start_index, "resuming from checkpoint");

        let state = self.controller.complete_resume(task_id).await?;
        if state != TaskState::Processing {
            return Ok(BatchRunSummary {
                batches_run: 0,
                final_state: state,
                consecutive_failures: 0,
            });
        }
        self.drive(task_id, start_index, committer).await
    }

    /// Main loop shared by run and resume
    async fn drive(
        &self,
        task_id: TaskId,
        start_index: usize,
        committer: Arc<dyn BatchCommitter>,
    ) -> Result<BatchRunSummary> {
        let task = self.controller.get_task(task_id)?;
        let parallelism = task.config.max_concurrent_batches.max(1);
        if parallelism > 1 {
            return self
                .drive_parallel(task_id, start_index, committer, parallelism)
                .await;
        }

        let mut batch_index = start_index;
        let mut batches_run = 0usize;
        let mut consecutive_failures = 0u32;

        loop {
            // Pause and cancel are observed here, at the batch boundary
            let state = self.controller.get_task_state(task_id)?;
            if state != TaskState::Processing {
                info!(task_id = %task_id, state = %state, batches_run, "run loop stopping");
                return Ok(BatchRunSummary {
                    batches_run,
                    final_state: state,
                    consecutive_failures,
                });
            }

            let task = self.controller.get_task(task_id)?;
            if task.progress.is_complete() || task.batch_slice(batch_index).is_empty() {
                let final_state = self.finish(task_id).await?;
                return Ok(BatchRunSummary {
                    batches_run,
                    final_state,
                    consecutive_failures,
                });
            }

            let batch = task.batch_slice(batch_index);
            let outcome = committer.commit(batch, batch_index).await;
            let batch_len = batch.len();

            match self
                .fold_batch(task_id, batch_index, batch_len, outcome, &mut consecutive_failures)
                .await?
            {
                BatchFold::Continue => {}
                BatchFold::Abort(final_state) => {
                    return Ok(BatchRunSummary {
                        batches_run: batches_run + 1,
                        final_state,
                        consecutive_failures,
                    });
                }
            }

            batches_run += 1;
            batch_index += 1;
            tokio::task::yield_now().await;
        }
    }

    /// Parallel mode: dispatch up to `parallelism` commits concurrently.
    ///
    /// `buffered` yields results in dispatch order, so progress folds and
    /// checkpoint writes stay strictly serialized in batch order even while
    /// commits overlap. A pause or cancel drops the not-yet-folded in-flight
    /// commits; their batches rerun on resume (at-least-once).
    async fn drive_parallel(
        &self,
        task_id: TaskId,
        start_index: usize,
        committer: Arc<dyn BatchCommitter>,
        parallelism: usize,
    ) -> Result<BatchRunSummary> {
        let task = self.controller.get_task(task_id)?;
        let input = task.input.clone();
        let batch_size = task.config.batch_size.max(1);
        let batch_count = task.batch_count();

        let commits = futures::stream::iter((start_index..batch_count).map(|batch_index| {
            let committer = Arc::clone(&committer);
            let input = Arc::clone(&input);
            async move {
                let start = (batch_index * batch_size).min(input.len());
                let end = (start + batch_size).min(input.len());
                let batch = &input[start..end];
                let outcome = committer.commit(batch, batch_index).await;
                (batch_index, batch.len(), outcome)
            }
        }))
        .buffered(parallelism);
        futures::pin_mut!(commits);

        let mut batches_run = 0usize;
        let mut consecutive_failures = 0u32;

        while let Some((batch_index, batch_len, outcome)) = commits.next().await {
            let state = self.controller.get_task_state(task_id)?;
            if state != TaskState::Processing {
                info!(task_id = %task_id, state = %state, batches_run, "parallel run stopping");
                return Ok(BatchRunSummary {
                    batches_run,
                    final_state: state,
                    consecutive_failures,
                });
            }

            match self
                .fold_batch(task_id, batch_index, batch_len, outcome, &mut consecutive_failures)
                .await?
            {
                BatchFold::Continue => {}
                BatchFold::Abort(final_state) => {
                    return Ok(BatchRunSummary {
                        batches_run: batches_run + 1,
                        final_state,
                        consecutive_failures,
                    });
                }
            }

            batches_run += 1;
            tokio::task::yield_now().await;
        }

        let final_state = match self.controller.get_task_state(task_id)? {
            TaskState::Processing => self.finish(task_id).await?,
            other => other,
        };
        Ok(BatchRunSummary {
            batches_run,
            final_state,
            consecutive_failures,
        })
    }

    /// Fold one commit outcome: progress, errors, checkpoint, failure policy
    async fn fold_batch(
        &self,
        task_id: TaskId,
        batch_index: usize,
        batch_len: usize,
        outcome: std::result::Result<CommitResult, super::types::CommitError>,
        consecutive_failures: &mut u32,
    ) -> Result<BatchFold> {
        let (result, commit_failed) = match outcome {
            Ok(result) => {
                if result.rows_accounted() != batch_len {
                    warn!(
                        task_id = %task_id,
                        batch_index,
                        accounted = result.rows_accounted(),
                        batch_len,
                        "committer did not account for every row in the batch"
                    );
                }
                *consecutive_failures = 0;
                (result, false)
            }
            Err(err) => {
                *consecutive_failures += 1;
                warn!(
                    task_id = %task_id,
                    batch_index,
                    consecutive = *consecutive_failures,
                    error = %err,
                    "batch commit failed"
                );
                self.controller
                    .add_error(task_id, TaskErrorEntry::batch(batch_index, err.to_string()))
                    .await?;
                // The whole batch counts as failed unless the committer
                // reported partial results (it did not: it threw)
                let result = CommitResult {
                    failed: batch_len,
                    ..CommitResult::default()
                };
                (result, true)
            }
        };

        let folded = self.controller.update_task_progress(task_id, &result).await?;
        if !folded {
            // The task went terminal while the batch was in flight; do not
            // checkpoint past a fold that never happened
            return Ok(BatchFold::Continue);
        }
        self.controller.save_checkpoint(task_id, batch_index + 1).await?;

        if commit_failed {
            let config = self.controller.get_task(task_id)?.config;
            if config.strict_mode {
                let state = self
                    .controller
                    .fail_task(task_id, format!("batch {batch_index} failed in strict mode"))
                    .await?;
                return Ok(BatchFold::Abort(state));
            }
            if config.max_consecutive_failures > 0
                && *consecutive_failures >= config.max_consecutive_failures
            {
                let state = self
                    .controller
                    .fail_task(
                        task_id,
                        format!(
                            "{consecutive_failures} consecutive batch failures (threshold {})",
                            config.max_consecutive_failures
                        ),
                    )
                    .await?;
                return Ok(BatchFold::Abort(state));
            }
        }

        Ok(BatchFold::Continue)
    }

    /// Transition to completed once every batch has been folded
    async fn finish(&self, task_id: TaskId) -> Result<TaskState> {
        let task = self.controller.get_task(task_id)?;
        if !task.progress.is_complete() {
            // Input exhausted but counters short: the committer
            // under-reported somewhere. Complete anyway, but say so.
            self.controller
                .add_warning(
                    task_id,
                    TaskWarningEntry::new(format!(
                        "{} rows unaccounted for at completion",
                        task.progress.remaining()
                    )),
                )
                .await?;
        }
        self.controller.complete_task(task_id).await
    }
}
