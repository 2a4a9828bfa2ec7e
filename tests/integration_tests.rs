//! End-to-end runs through the controller and batch runner, covering the
//! happy path, pause/resume, failing batches, store outages, restart
//! recovery, ordering, cancellation, and parallel dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use gradeflow_core::config::EngineConfig;
use gradeflow_core::models::{TaskConfig, TaskId, TaskType};
use gradeflow_core::orchestration::{
    BatchCommitter, BatchRunner, CommitError, CommitResult, TaskController,
};
use gradeflow_core::state_machine::TaskState;
use gradeflow_core::store::{FileStore, InMemoryStore, PersistenceStore};
use parking_lot::Mutex;
use serde_json::{json, Value};

fn rows(n: usize) -> Vec<Value> {
    (0..n).map(|i| json!({ "student_id": i, "score": 90 })).collect()
}

fn batch_config(batch_size: usize) -> TaskConfig {
    TaskConfig {
        batch_size,
        ..TaskConfig::default()
    }
}

fn engine(store: Arc<dyn PersistenceStore>) -> Arc<TaskController> {
    Arc::new(TaskController::new(store, EngineConfig::default()))
}

/// Records committed batch indices; optionally rejects configured batches
/// or pauses/cancels the task mid-run to make boundary behavior
/// deterministic.
struct ScriptedCommitter {
    committed: Mutex<Vec<usize>>,
    reject: HashSet<usize>,
    reject_all: bool,
    pause_at: Option<(usize, Arc<TaskController>)>,
    cancel_at: Option<(usize, Arc<TaskController>)>,
    task_id: Mutex<Option<TaskId>>,
}

impl ScriptedCommitter {
    fn recording() -> Self {
        Self {
            committed: Mutex::new(Vec::new()),
            reject: HashSet::new(),
            reject_all: false,
            pause_at: None,
            cancel_at: None,
            task_id: Mutex::new(None),
        }
    }

    fn rejecting(batches: impl IntoIterator<Item = usize>) -> Self {
        Self {
            reject: batches.into_iter().collect(),
            ..Self::recording()
        }
    }

    fn set_task(&self, task_id: TaskId) {
        *self.task_id.lock() = Some(task_id);
    }

    fn committed(&self) -> Vec<usize> {
        self.committed.lock().clone()
    }
}

#[async_trait]
impl BatchCommitter for ScriptedCommitter {
    async fn commit(
        &self,
        batch: &[Value],
        batch_index: usize,
    ) -> Result<CommitResult, CommitError> {
        if self.reject_all || self.reject.contains(&batch_index) {
            return Err(CommitError::Rejected(format!("batch {batch_index} refused")));
        }

        if let Some((at, controller)) = &self.pause_at {
            if batch_index == *at {
                let task_id = self.task_id.lock().expect("task id not set");
                controller.pause_task(task_id).await.unwrap();
            }
        }
        if let Some((at, controller)) = &self.cancel_at {
            if batch_index == *at {
                let task_id = self.task_id.lock().expect("task id not set");
                controller.cancel_task(task_id).await.unwrap();
            }
        }

        self.committed.lock().push(batch_index);
        Ok(CommitResult::all_successful(batch.len()))
    }
}

// ---------------------------------------------------------------------
// Scenario 1: 250 rows, batch size 50, commit always succeeds
// ---------------------------------------------------------------------
#[tokio::test]
async fn full_run_commits_every_row() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let task = controller
        .create_task(TaskType::GradeImport, rows(250), batch_config(50))
        .await
        .unwrap();

    let runner = BatchRunner::new(Arc::clone(&controller));
    let committer = Arc::new(ScriptedCommitter::recording());
    let summary = runner.run(task.id, committer.clone()).await.unwrap();

    assert_eq!(summary.final_state, TaskState::Completed);
    assert_eq!(summary.batches_run, 5);

    let task = controller.get_task(task.id).unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.progress.total, 250);
    assert_eq!(task.progress.processed, 250);
    assert_eq!(task.progress.successful, 250);
    assert_eq!(task.progress.failed, 0);
    assert!(task.completed_at.is_some());
    assert_eq!(committer.committed(), vec![0, 1, 2, 3, 4]);
}

// ---------------------------------------------------------------------
// Scenario 2: pause after 2 batches, resume continues from row 101
// ---------------------------------------------------------------------
#[tokio::test]
async fn pause_and_resume_continue_from_checkpoint() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let task = controller
        .create_task(TaskType::GradeImport, rows(250), batch_config(50))
        .await
        .unwrap();

    let pausing = Arc::new(ScriptedCommitter {
        pause_at: Some((1, Arc::clone(&controller))),
        ..ScriptedCommitter::recording()
    });
    pausing.set_task(task.id);

    let runner = BatchRunner::new(Arc::clone(&controller));
    let summary = runner.run(task.id, pausing.clone()).await.unwrap();

    // The in-flight batch finished before the pause took effect
    assert_eq!(summary.final_state, TaskState::Paused);
    assert_eq!(summary.batches_run, 2);

    let paused = controller.get_task(task.id).unwrap();
    assert_eq!(paused.progress.processed, 100);
    let checkpoint = controller.latest_checkpoint(task.id).await.unwrap().unwrap();
    assert_eq!(checkpoint.batch_index, 2);

    // Resume with a fresh committer and watch where it re-enters
    let resumed = Arc::new(ScriptedCommitter::recording());
    let summary = runner
        .resume(task.id, resumed.clone())
        .await
        .unwrap();

    assert_eq!(summary.final_state, TaskState::Completed);
    assert_eq!(resumed.committed(), vec![2, 3, 4]);

    let task = controller.get_task(task.id).unwrap();
    assert_eq!(task.progress.processed, 250);
    assert_eq!(task.progress.successful, 250);
}

// ---------------------------------------------------------------------
// Scenario 3: commit throws only for batch index 3
// ---------------------------------------------------------------------
#[tokio::test]
async fn single_failing_batch_does_not_abort_the_task() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let task = controller
        .create_task(TaskType::GradeImport, rows(250), batch_config(50))
        .await
        .unwrap();

    let runner = BatchRunner::new(Arc::clone(&controller));
    let committer = Arc::new(ScriptedCommitter::rejecting([3]));
    let summary = runner.run(task.id, committer.clone()).await.unwrap();

    assert_eq!(summary.final_state, TaskState::Completed);

    let task = controller.get_task(task.id).unwrap();
    assert_eq!(task.progress.failed, 50);
    assert_eq!(task.progress.successful, 200);
    assert_eq!(
        task.progress.successful + task.progress.failed,
        task.progress.total
    );

    let batch_errors: Vec<_> = task
        .errors
        .iter()
        .filter(|e| e.batch_index == Some(3))
        .collect();
    assert_eq!(batch_errors.len(), 1);
}

// ---------------------------------------------------------------------
// Scenario 4: persistence store unavailable for writes
// ---------------------------------------------------------------------
#[tokio::test]
async fn store_outage_degrades_to_warnings() {
    let store = Arc::new(InMemoryStore::new());
    let controller = engine(Arc::clone(&store) as Arc<dyn PersistenceStore>);
    let task = controller
        .create_task(TaskType::GradeImport, rows(250), batch_config(50))
        .await
        .unwrap();

    store.set_fail_writes(true);

    let runner = BatchRunner::new(Arc::clone(&controller));
    let committer = Arc::new(ScriptedCommitter::recording());
    let summary = runner.run(task.id, committer.clone()).await.unwrap();

    // The task still completed in memory; nothing escaped to the caller
    assert_eq!(summary.final_state, TaskState::Completed);
    let task = controller.get_task(task.id).unwrap();
    assert_eq!(task.progress.processed, 250);
    assert!(task
        .warnings
        .iter()
        .any(|w| w.message.contains("checkpoint persistence failed")));
}

// ---------------------------------------------------------------------
// Order preservation: batches commit in strictly increasing order
// ---------------------------------------------------------------------
#[tokio::test]
async fn batches_commit_in_input_order() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let task = controller
        .create_task(TaskType::AttendanceImport, rows(100), batch_config(10))
        .await
        .unwrap();

    let runner = BatchRunner::new(Arc::clone(&controller));
    let committer = Arc::new(ScriptedCommitter::recording());
    runner.run(task.id, committer.clone()).await.unwrap();

    let committed = committer.committed();
    assert_eq!(committed, (0..10).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------
// Clean cancellation: no further checkpoints after cancel is observed
// ---------------------------------------------------------------------
#[tokio::test]
async fn cancel_stops_the_run_cleanly() {
    let store = Arc::new(InMemoryStore::new());
    let controller = engine(Arc::clone(&store) as Arc<dyn PersistenceStore>);
    let task = controller
        .create_task(TaskType::GradeImport, rows(250), batch_config(50))
        .await
        .unwrap();

    let cancelling = Arc::new(ScriptedCommitter {
        cancel_at: Some((1, Arc::clone(&controller))),
        ..ScriptedCommitter::recording()
    });
    cancelling.set_task(task.id);

    let runner = BatchRunner::new(Arc::clone(&controller));
    let summary = runner
        .run(task.id, cancelling.clone())
        .await
        .unwrap();

    assert_eq!(summary.final_state, TaskState::Cancelled);

    let task = controller.get_task(task.id).unwrap();
    assert_eq!(task.state, TaskState::Cancelled);
    assert!(task.progress.processed <= task.progress.total);
    assert_eq!(task.progress.processed, 50);

    // Cancellation is immediate: the in-flight batch neither folds nor
    // checkpoints once the task is terminal
    let checkpoints = store.checkpoints(task.id).await.unwrap();
    assert_eq!(checkpoints.last().unwrap().batch_index, 1);
    assert!(checkpoints.iter().all(|c| c.batch_index <= 1));
    assert_eq!(cancelling.committed(), vec![0, 1]);
}

// ---------------------------------------------------------------------
// Task-level failure: consecutive batch failures cross the threshold
// ---------------------------------------------------------------------
#[tokio::test]
async fn consecutive_failures_fail_the_task() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let config = TaskConfig {
        batch_size: 10,
        max_consecutive_failures: 2,
        ..TaskConfig::default()
    };
    let task = controller
        .create_task(TaskType::GradeImport, rows(100), config)
        .await
        .unwrap();

    let committer = Arc::new(ScriptedCommitter {
        reject_all: true,
        ..ScriptedCommitter::recording()
    });

    let runner = BatchRunner::new(Arc::clone(&controller));
    let summary = runner.run(task.id, committer.clone()).await.unwrap();

    assert_eq!(summary.final_state, TaskState::Failed);
    assert_eq!(summary.consecutive_failures, 2);

    let task = controller.get_task(task.id).unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.progress.failed, 20);
    assert_eq!(task.errors.len(), 2);
    // Enough survives to retry: the last checkpoint is in place
    let checkpoint = controller.latest_checkpoint(task.id).await.unwrap().unwrap();
    assert_eq!(checkpoint.batch_index, 2);
}

#[tokio::test]
async fn strict_mode_aborts_on_first_batch_error() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let config = TaskConfig {
        batch_size: 10,
        strict_mode: true,
        ..TaskConfig::default()
    };
    let task = controller
        .create_task(TaskType::GradeImport, rows(100), config)
        .await
        .unwrap();

    let committer = Arc::new(ScriptedCommitter::rejecting([0]));
    let runner = BatchRunner::new(Arc::clone(&controller));
    let summary = runner.run(task.id, committer.clone()).await.unwrap();

    assert_eq!(summary.final_state, TaskState::Failed);
    assert_eq!(summary.batches_run, 1);
}

// ---------------------------------------------------------------------
// Restart recovery through a durable store
// ---------------------------------------------------------------------
#[tokio::test]
async fn restart_resumes_from_persisted_checkpoint() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let task_id;

    // First process: pause after two batches, then "crash"
    {
        let store = Arc::new(FileStore::new(dir.path()).await?);
        let controller = engine(store as Arc<dyn PersistenceStore>);
        let task = controller
            .create_task(TaskType::GradeImport, rows(250), batch_config(50))
            .await?;
        task_id = task.id;

        let pausing = Arc::new(ScriptedCommitter {
            pause_at: Some((1, Arc::clone(&controller))),
            ..ScriptedCommitter::recording()
        });
        pausing.set_task(task.id);

        let runner = BatchRunner::new(Arc::clone(&controller));
        let summary = runner.run(task.id, pausing.clone()).await?;
        assert_eq!(summary.final_state, TaskState::Paused);
    }

    // Second process: enumerate, restore, resume
    let store = Arc::new(FileStore::new(dir.path()).await?);
    let controller = engine(store as Arc<dyn PersistenceStore>);

    let resumable = controller.load_resumable_tasks().await?;
    assert_eq!(resumable.len(), 1);
    assert_eq!(resumable[0].id, task_id);

    let restored = controller.restore_task(resumable[0].clone()).await?;
    assert_eq!(restored.state, TaskState::Paused);

    let committer = Arc::new(ScriptedCommitter::recording());
    let runner = BatchRunner::new(Arc::clone(&controller));
    let summary = runner.resume(task_id, committer.clone()).await?;

    assert_eq!(summary.final_state, TaskState::Completed);
    // Rows 101..=250 only; already-committed batches are not re-processed
    assert_eq!(committer.committed(), vec![2, 3, 4]);

    let task = controller.get_task(task_id)?;
    assert_eq!(task.progress.processed, 250);
    assert_eq!(task.progress.successful, 250);
    Ok(())
}

#[tokio::test]
async fn restore_normalizes_crashed_active_tasks_to_paused() {
    let store = Arc::new(InMemoryStore::new());
    let controller = engine(Arc::clone(&store) as Arc<dyn PersistenceStore>);
    let task = controller
        .create_task(TaskType::GradeImport, rows(50), batch_config(10))
        .await
        .unwrap();

    // Simulate a snapshot caught mid-run by a crash
    let mut crashed = task.clone();
    crashed.state = TaskState::Processing;
    store.save_task(&crashed).await.unwrap();

    let resumable = controller.load_resumable_tasks().await.unwrap();
    let restored = controller.restore_task(resumable[0].clone()).await.unwrap();
    assert_eq!(restored.state, TaskState::Paused);
}

// ---------------------------------------------------------------------
// Parallel mode: concurrent commits, serialized checkpoints
// ---------------------------------------------------------------------
#[tokio::test]
async fn parallel_mode_keeps_checkpoints_ordered() {
    struct SlowEarlyBatches;

    #[async_trait]
    impl BatchCommitter for SlowEarlyBatches {
        async fn commit(
            &self,
            batch: &[Value],
            batch_index: usize,
        ) -> Result<CommitResult, CommitError> {
            // Early batches finish last so completion order inverts
            let delay = 40u64.saturating_sub(batch_index as u64 * 10);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(CommitResult::all_successful(batch.len()))
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let controller = engine(Arc::clone(&store) as Arc<dyn PersistenceStore>);
    let config = TaskConfig {
        batch_size: 25,
        max_concurrent_batches: 4,
        ..TaskConfig::default()
    };
    let task = controller
        .create_task(TaskType::GradeImport, rows(100), config)
        .await
        .unwrap();

    let runner = BatchRunner::new(Arc::clone(&controller));
    let summary = runner.run(task.id, Arc::new(SlowEarlyBatches)).await.unwrap();

    assert_eq!(summary.final_state, TaskState::Completed);

    let checkpoints = store.checkpoints(task.id).await.unwrap();
    let indices: Vec<_> = checkpoints.iter().map(|c| c.batch_index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);

    let task = controller.get_task(task.id).unwrap();
    assert_eq!(task.progress.processed, 100);
}

// ---------------------------------------------------------------------
// Edge case: empty input completes immediately
// ---------------------------------------------------------------------
#[tokio::test]
async fn empty_input_completes_immediately() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let task = controller
        .create_task(TaskType::GradeImport, rows(0), batch_config(50))
        .await
        .unwrap();

    let runner = BatchRunner::new(Arc::clone(&controller));
    let committer = Arc::new(ScriptedCommitter::recording());
    let summary = runner.run(task.id, committer.clone()).await.unwrap();

    assert_eq!(summary.final_state, TaskState::Completed);
    assert_eq!(summary.batches_run, 0);
    assert!(committer.committed().is_empty());
}

// ---------------------------------------------------------------------
// Observability: subscribers see monotonically advancing snapshots
// ---------------------------------------------------------------------
#[tokio::test]
async fn subscribers_observe_monotonic_progress() {
    let controller = engine(Arc::new(InMemoryStore::new()));
    let mut notifications = controller.subscribe();

    let task = controller
        .create_task(TaskType::GradeImport, rows(100), batch_config(20))
        .await
        .unwrap();

    let runner = BatchRunner::new(Arc::clone(&controller));
    let committer = Arc::new(ScriptedCommitter::recording());
    runner.run(task.id, committer.clone()).await.unwrap();

    let mut last_processed = 0;
    let mut saw_completed = false;
    while let Ok(notification) = notifications.try_recv() {
        assert!(notification.task.progress.processed >= last_processed);
        last_processed = notification.task.progress.processed;
        if notification.task.state == TaskState::Completed {
            saw_completed = true;
        }
    }
    assert!(saw_completed);
    assert_eq!(last_processed, 100);
}
