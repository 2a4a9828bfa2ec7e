use serde::{Deserialize, Serialize};

/// Events that can trigger task state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Accept the task into the queue
    Enqueue,
    /// Begin driving the task (idle/queued only)
    Start,
    /// Preparation finished, input is being validated
    BeginValidation,
    /// Validation finished, batches start committing
    BeginProcessing,
    /// Suspend at the next batch boundary
    Pause,
    /// Leave the paused state and re-enter processing
    Resume,
    /// Checkpoint re-read finished, processing continues
    ResumeComplete,
    /// All rows processed
    Complete,
    /// Mark task as failed with error message
    Fail(String),
    /// Cancel the task
    Cancel,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Start => "start",
            Self::BeginValidation => "begin_validation",
            Self::BeginProcessing => "begin_processing",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::ResumeComplete => "resume_complete",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Fail(_) | Self::Cancel)
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
