//! Bridge between the engine and the IRIS enforcement loop
//!
//! Tasks created via `iris-new` carry an `iris: true` marker in task memory
//! and route through [`iris::AgentLoop`] instead of the worker loop. The
//! planner seam is implemented over the model router.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::Task;
use crate::llm::{ModelRouter, PromptContext};

/// Memory key marking a task as IRIS-managed
pub const IRIS_MARKER: &str = "iris";

/// Whether a task routes through the IRIS loop
pub fn is_iris_task(task: &Task) -> bool {
    task.memory.get(IRIS_MARKER).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Mark a task as IRIS-managed
pub fn mark_iris_task(task: &mut Task) {
    task.memory.insert(IRIS_MARKER.to_string(), serde_json::Value::Bool(true));
}

/// Planner backed by the model router
pub struct RouterPlanner {
    router: Arc<ModelRouter>,
}

impl RouterPlanner {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl iris::Planner for RouterPlanner {
    async fn plan(&self, prompt: &str) -> Result<String, iris::IrisError> {
        self.router
            .generate(prompt, &PromptContext::default(), None)
            .await
            .map_err(|e| iris::IrisError::Planner(e.to_string()))
    }
}
