use crate::models::Task;
use crate::state_machine::TaskState;
use tokio::sync::broadcast;

/// What a notification is about
#[derive(Debug, Clone)]
pub enum NotificationKind {
    Created,
    Restored,
    StateChanged { from: TaskState, to: TaskState },
    ProgressUpdated,
    CheckpointSaved { batch_index: usize },
    ErrorRecorded,
    WarningRecorded,
    Deleted,
}

/// Notification carrying the full current task snapshot, delivered on every
/// committed transition so observers render progress without polling
#[derive(Debug, Clone)]
pub struct TaskNotification {
    pub task: Task,
    pub kind: NotificationKind,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Push-based publisher for task lifecycle notifications
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<TaskNotification>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notification for the given task snapshot.
    ///
    /// Publishing with no subscribers is acceptable and not an error; the
    /// engine emits notifications whether or not anyone is listening.
    pub fn publish(&self, task: Task, kind: NotificationKind) {
        let notification = TaskNotification {
            task,
            kind,
            published_at: chrono::Utc::now(),
        };

        if let Err(broadcast::error::SendError(dropped)) = self.sender.send(notification) {
            tracing::trace!(
                task_id = %dropped.task.id,
                "no subscribers for task notification"
            );
        }
    }

    /// Subscribe to notifications; unsubscribe by dropping the receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TaskNotification> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskConfig, TaskType};

    fn sample_task() -> Task {
        Task::new(TaskType::GradeImport, vec![], TaskConfig::default())
    }

    #[tokio::test]
    async fn test_subscribers_receive_snapshots() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher.publish(sample_task(), NotificationKind::Created);

        let notification = receiver.recv().await.unwrap();
        assert!(matches!(notification.kind, NotificationKind::Created));
        assert_eq!(notification.task.state, TaskState::Idle);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(16);
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(sample_task(), NotificationKind::ProgressUpdated);
    }
}
