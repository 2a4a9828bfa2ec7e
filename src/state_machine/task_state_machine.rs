use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskState,
};
use crate::models::Task;
use chrono::Utc;

/// Task state machine for lifecycle management.
///
/// Transition legality lives in [`TaskStateMachine::determine_target_state`];
/// [`TaskStateMachine::apply`] additionally stamps `completed_at` exactly once
/// when a terminal state is entered.
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        if current_state.is_terminal() {
            return Err(StateMachineError::TerminalState {
                state: current_state.to_string(),
            });
        }

        let target = match (current_state, event) {
            // Queueing and startup
            (TaskState::Idle, TaskEvent::Enqueue) => TaskState::Queued,
            (TaskState::Idle, TaskEvent::Start) => TaskState::Preparing,
            (TaskState::Queued, TaskEvent::Start) => TaskState::Preparing,
            (TaskState::Preparing, TaskEvent::BeginValidation) => TaskState::Validating,
            (TaskState::Validating, TaskEvent::BeginProcessing) => TaskState::Processing,

            // Pause / resume cycle
            (TaskState::Processing, TaskEvent::Pause) => TaskState::Paused,
            (TaskState::Paused, TaskEvent::Resume) => TaskState::Resuming,
            (TaskState::Resuming, TaskEvent::ResumeComplete) => TaskState::Processing,

            // Completion
            (TaskState::Processing, TaskEvent::Complete) => TaskState::Completed,

            // Failure from any active state
            (state, TaskEvent::Fail(_)) if state.is_active() => TaskState::Failed,

            // Cancel from any non-terminal state
            (_, TaskEvent::Cancel) => TaskState::Cancelled,

            // Invalid transitions
            (from_state, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply an event to a task, mutating its state on success.
    ///
    /// Returns the new state. The caller is responsible for persisting and
    /// publishing the transition.
    pub fn apply(task: &mut Task, event: &TaskEvent) -> StateMachineResult<TaskState> {
        let target = Self::determine_target_state(task.state, event)?;

        task.state = target;
        if target.is_terminal() && task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        }

        Ok(target)
    }
}
