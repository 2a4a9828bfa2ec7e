use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states for a bulk-import task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Initial state when task is created
    Idle,
    /// Task accepted and waiting for a runner
    Queued,
    /// Runner is preparing the input slices
    Preparing,
    /// Task configuration and input are being validated
    Validating,
    /// Batches are being committed
    Processing,
    /// Suspended at a batch boundary, resumable
    Paused,
    /// Re-entering processing from the latest checkpoint
    Resuming,
    /// All rows processed
    Completed,
    /// Task failed (consecutive-failure threshold or strict mode)
    Failed,
    /// Task was cancelled
    Cancelled,
}

impl TaskState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active state (task is being driven by a runner)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::Validating | Self::Processing | Self::Resuming
        )
    }

    /// Check if the task can be resumed from this state
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Check if a runner may be started from this state
    pub fn is_startable(&self) -> bool {
        matches!(self, Self::Idle | Self::Queued)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Queued => write!(f, "queued"),
            Self::Preparing => write!(f, "preparing"),
            Self::Validating => write!(f, "validating"),
            Self::Processing => write!(f, "processing"),
            Self::Paused => write!(f, "paused"),
            Self::Resuming => write!(f, "resuming"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "queued" => Ok(Self::Queued),
            "preparing" => Ok(Self::Preparing),
            "validating" => Ok(Self::Validating),
            "processing" => Ok(Self::Processing),
            "paused" => Ok(Self::Paused),
            "resuming" => Ok(Self::Resuming),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Default state for new tasks
impl Default for TaskState {
    fn default() -> Self {
        Self::Idle
    }
}
