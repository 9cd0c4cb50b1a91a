//! Task entity, status state machine, and append-only step log

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::Priority;

/// Errors from domain-level state transitions
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}

/// Task lifecycle states. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Done,
    Error,
}

impl TaskStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Allowed transitions:
    /// PENDING->RUNNING; RUNNING<->PAUSED; RUNNING->DONE|ERROR;
    /// PAUSED->RUNNING|ERROR
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Running, Self::Done)
                | (Self::Running, Self::Error)
                | (Self::Paused, Self::Running)
                | (Self::Paused, Self::Error)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One step in a task's execution history.
///
/// `step_id` is dense and 1-based: it always equals its index + 1. In the
/// normal case exactly one of `result`/`error` is meaningful; both may be
/// present for a partially-failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: u32,
    pub timestamp: String,
    pub action: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A persistent unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub goal: String,
    pub status: TaskStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub memory: Map<String, Value>,
    #[serde(default)]
    pub priority: Priority,
}

impl Task {
    /// Create a new pending task
    pub fn new(id: u64, goal: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            goal: goal.into(),
            status: TaskStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
            steps: Vec::new(),
            memory: Map::new(),
            priority: Priority::Normal,
        }
    }

    /// Append a step. Step ids stay dense: the new id is `steps.len() + 1`.
    pub fn add_step(&mut self, action: impl Into<String>, result: Option<String>, error: Option<String>) {
        let step = Step {
            step_id: self.steps.len() as u32 + 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            action: action.into(),
            result,
            error,
        };
        self.steps.push(step);
        self.touch();
    }

    /// Transition to a new status, enforcing the state machine
    pub fn set_status(&mut self, next: TaskStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// The last `n` steps, oldest first
    pub fn last_steps(&self, n: usize) -> &[Step] {
        let start = self.steps.len().saturating_sub(n);
        &self.steps[start..]
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
