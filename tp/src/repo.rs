//! TaskRepository - id-assigning task collection over the JsonStore
//!
//! The repository is the sole owner of tasks on disk. Ids come from a
//! persisted `next_id` counter and are never reused; every mutating call
//! persists the full task map.

use std::collections::BTreeMap;

use eyre::Result;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Task, TaskStatus};
use crate::store::JsonStore;

struct RepoInner {
    store: JsonStore,
    tasks: BTreeMap<u64, Task>,
    next_id: u64,
}

impl RepoInner {
    fn persist(&mut self) -> Result<()> {
        let tasks: serde_json::Map<String, Value> = self
            .tasks
            .iter()
            .map(|(id, task)| (id.to_string(), serde_json::to_value(task).unwrap_or_default()))
            .collect();

        self.store.set_many(vec![
            ("tasks".to_string(), Value::Object(tasks)),
            ("next_id".to_string(), Value::from(self.next_id)),
        ])
    }
}

/// Repository for task persistence and retrieval
pub struct TaskRepository {
    inner: Mutex<RepoInner>,
}

impl TaskRepository {
    /// Open the repository over `data/tasks.json`, loading existing tasks.
    /// Records that fail to deserialize are skipped.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = JsonStore::open(path)?;

        let mut tasks = BTreeMap::new();
        if let Some(Value::Object(map)) = store.get("tasks") {
            for (_, value) in map {
                match serde_json::from_value::<Task>(value.clone()) {
                    Ok(task) => {
                        tasks.insert(task.id, task);
                    }
                    Err(e) => debug!(error = %e, "Skipping undeserializable task record"),
                }
            }
        }

        let next_id = store.get_as::<u64>("next_id").unwrap_or(1).max(1);

        debug!(count = tasks.len(), next_id, "Opened task repository");
        Ok(Self {
            inner: Mutex::new(RepoInner { store, tasks, next_id }),
        })
    }

    /// Create a new pending task with the next id
    pub async fn create(&self, goal: impl Into<String>) -> Result<Task> {
        let mut inner = self.inner.lock().await;

        let id = inner.next_id;
        inner.next_id += 1;

        let task = Task::new(id, goal);
        inner.tasks.insert(id, task.clone());
        inner.persist()?;

        debug!(id, "Created task");
        Ok(task)
    }

    /// Retrieve a task by id
    pub async fn get(&self, id: u64) -> Option<Task> {
        self.inner.lock().await.tasks.get(&id).cloned()
    }

    /// All tasks, sorted by id
    pub async fn list_all(&self) -> Vec<Task> {
        self.inner.lock().await.tasks.values().cloned().collect()
    }

    /// Tasks currently in the given status, sorted by id
    pub async fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.inner
            .lock()
            .await
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    /// Write back a (known) task
    pub async fn update(&self, task: &Task) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.tasks.contains_key(&task.id) {
            inner.tasks.insert(task.id, task.clone());
            inner.persist()?;
        }
        Ok(())
    }

    /// Delete a task by id; returns whether it existed
    pub async fn delete(&self, id: u64) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let existed = inner.tasks.remove(&id).is_some();
        if existed {
            inner.persist()?;
        }
        Ok(existed)
    }
}
