//! Supervisor implementation
//!
//! Owns the worker pool and the priority queue. Lifecycle is explicit:
//! `new` -> `start` (spawns the pool) -> `shutdown` (flag + notify + join
//! with timeout). Strategy per task follows the active profile: independent,
//! cooperative (decompose across workers), or competitive (race, first
//! success wins), with best-effort remote delegation checked first.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::select_all;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{CollaborationMode, Task, TaskStatus};
use crate::plugins::PluginRegistry;
use crate::remote::{NodeRegistry, RemoteNode, delegate_task};
use crate::repo::TaskRepository;
use crate::worker::{TaskOutcome, Worker, WorkerDeps, WorkerStatus};

use super::config::SupervisorConfig;
use super::queue::QueuedTask;

/// Poll interval for idle workers and drain waits
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Aggregate result of `run_all_pending`
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub queued: usize,
    pub active_workers: usize,
}

/// Internal state behind the supervisor mutex
struct SupervisorInner {
    queue: BinaryHeap<QueuedTask>,
    next_seq: u64,
    /// task id -> worker id
    active: HashMap<u64, usize>,
    /// worker id -> task id
    assignments: HashMap<usize, u64>,
    /// parent task id -> subtask ids
    subtasks: HashMap<u64, Vec<u64>>,
    /// cross-task scratch space
    shared_memory: Map<String, Value>,
}

/// Owner of the worker pool, queue, and task strategy
pub struct Supervisor {
    config: SupervisorConfig,
    deps: WorkerDeps,
    repo: Arc<TaskRepository>,
    nodes: Arc<NodeRegistry>,
    plugins: Arc<PluginRegistry>,
    workers: Vec<Arc<Worker>>,
    inner: Mutex<SupervisorInner>,
    notify: Notify,
    shutdown: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    /// Construct the supervisor and its (not yet started) worker pool
    pub fn new(
        config: SupervisorConfig,
        deps: WorkerDeps,
        repo: Arc<TaskRepository>,
        nodes: Arc<NodeRegistry>,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        let workers = (0..config.max_workers.max(1))
            .map(|id| Arc::new(Worker::new(id, deps.clone())))
            .collect();

        Self {
            config,
            deps,
            repo,
            nodes,
            plugins,
            workers,
            inner: Mutex::new(SupervisorInner {
                queue: BinaryHeap::new(),
                next_seq: 0,
                active: HashMap::new(),
                assignments: HashMap::new(),
                subtasks: HashMap::new(),
                shared_memory: Map::new(),
            }),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pool
    pub async fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return;
        }

        for worker_id in 0..self.workers.len() {
            let supervisor = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                supervisor.worker_loop(worker_id).await;
            }));
        }

        info!(workers = self.workers.len(), "Supervisor started");
    }

    /// Enqueue a task for execution. Tasks already queued or actively
    /// running are not enqueued twice.
    pub async fn submit(&self, task: &Task) {
        let mut inner = self.inner.lock().await;
        if inner.active.contains_key(&task.id) || inner.queue.iter().any(|q| q.task_id == task.id) {
            debug!(task_id = task.id, "Task already queued or active");
            return;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner.queue.push(QueuedTask {
            task_id: task.id,
            priority: task.priority,
            seq,
        });
        drop(inner);

        debug!(task_id = task.id, priority = %task.priority, "Task enqueued");
        self.notify.notify_waiters();
    }

    /// Signal shutdown and join the pool, waiting up to the configured
    /// timeout per worker
    pub async fn shutdown(&self) {
        info!("Supervisor shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        let mut handles = self.handles.lock().await;
        for mut handle in handles.drain(..) {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!("Worker did not stop within {:?}, aborting", timeout);
                handle.abort();
            }
        }
    }

    /// Enqueue every pending task, then wait until the queue and active set
    /// drain or the wall-clock budget expires. Returns aggregate counts.
    pub async fn run_all_pending(&self) -> RunSummary {
        let pending = self.repo.list_by_status(TaskStatus::Pending).await;
        let ids: Vec<u64> = pending.iter().map(|t| t.id).collect();
        let total = pending.len();

        for task in &pending {
            self.submit(task).await;
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.run_all_timeout_secs);
        loop {
            {
                let inner = self.inner.lock().await;
                if inner.queue.is_empty() && inner.active.is_empty() {
                    break;
                }
            }
            if Instant::now() >= deadline {
                warn!("run_all_pending hit wall-clock budget");
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let mut summary = RunSummary {
            total,
            ..Default::default()
        };
        for id in &ids {
            match self.repo.get(*id).await.map(|t| t.status) {
                Some(TaskStatus::Done) => summary.completed += 1,
                Some(TaskStatus::Error) => summary.failed += 1,
                _ => {}
            }
        }

        let inner = self.inner.lock().await;
        summary.queued = inner.queue.len();
        drop(inner);
        summary.active_workers = self.active_worker_count().await;

        summary
    }

    /// Per-worker status for the CLI
    pub async fn worker_status(&self) -> Vec<(usize, WorkerStatus)> {
        let mut out = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            out.push((worker.id, worker.status().await));
        }
        out
    }

    /// Subtask relationships recorded by cooperative decomposition
    pub async fn subtasks_of(&self, parent: u64) -> Vec<u64> {
        self.inner.lock().await.subtasks.get(&parent).cloned().unwrap_or_default()
    }

    /// Write to the cross-task shared memory
    pub async fn share(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().await.shared_memory.insert(key.into(), value);
    }

    /// Read from the cross-task shared memory
    pub async fn shared(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.shared_memory.get(key).cloned()
    }

    async fn active_worker_count(&self) -> usize {
        let mut count = 0;
        for worker in &self.workers {
            if worker.status().await == WorkerStatus::Running {
                count += 1;
            }
        }
        count
    }

    /// One pool worker: pop, execute, repeat until shutdown
    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!(worker_id, "Worker loop started");

        while !self.shutdown.load(Ordering::SeqCst) {
            let next = self.pop_next(worker_id).await;

            match next {
                Some(entry) => {
                    self.process(worker_id, entry.task_id).await;
                }
                None => {
                    // Wait for work or shutdown
                    let _ = tokio::time::timeout(POLL_INTERVAL, self.notify.notified()).await;
                }
            }
        }

        debug!(worker_id, "Worker loop stopped");
    }

    async fn pop_next(&self, worker_id: usize) -> Option<QueuedTask> {
        let mut inner = self.inner.lock().await;
        let entry = inner.queue.pop()?;
        inner.active.insert(entry.task_id, worker_id);
        inner.assignments.insert(worker_id, entry.task_id);
        Some(entry)
    }

    async fn finish(&self, worker_id: usize, task_id: u64) {
        let mut inner = self.inner.lock().await;
        inner.active.remove(&task_id);
        if inner.assignments.get(&worker_id) == Some(&task_id) {
            inner.assignments.remove(&worker_id);
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Execute one claimed task: transition to RUNNING, run hooks and the
    /// strategy, persist the terminal state
    async fn process(&self, worker_id: usize, task_id: u64) {
        let Some(mut task) = self.repo.get(task_id).await else {
            warn!(task_id, "Queued task vanished");
            self.finish(worker_id, task_id).await;
            return;
        };

        // Only pending (fresh) and running (resumed) tasks execute
        if task.status == TaskStatus::Pending {
            if task.set_status(TaskStatus::Running).is_err() || self.repo.update(&task).await.is_err() {
                self.finish(worker_id, task_id).await;
                return;
            }
        } else if task.status != TaskStatus::Running {
            debug!(task_id, status = %task.status, "Skipping non-runnable task");
            self.finish(worker_id, task_id).await;
            return;
        }

        self.plugins.run_before(&task).await;

        let outcome = self.execute_with_strategy(worker_id, &mut task).await;

        // A command may have paused the task mid-loop; leave it paused
        if task.status == TaskStatus::Running {
            let target = if outcome.success { TaskStatus::Done } else { TaskStatus::Error };
            if let Err(e) = task.set_status(target) {
                warn!(task_id, error = %e, "Terminal transition rejected");
            }
        } else if !outcome.success && task.status == TaskStatus::Paused {
            let _ = task.set_status(TaskStatus::Error);
        }

        if let Err(e) = self.repo.update(&task).await {
            warn!(task_id, error = %e, "Failed to persist task");
        }

        self.plugins.run_after(&task, outcome.success).await;

        if outcome.success {
            info!(task_id, steps = outcome.steps_completed, "Task completed");
        } else {
            warn!(task_id, error = ?outcome.error, "Task failed");
        }

        self.finish(worker_id, task_id).await;
    }

    /// Strategy dispatch: remote delegation first, then the profile's
    /// collaboration mode
    async fn execute_with_strategy(&self, worker_id: usize, task: &mut Task) -> TaskOutcome {
        if let Some(node) = self.should_delegate_to_remote().await {
            match self.delegate(&node, task).await {
                Ok(outcome) => return outcome,
                Err(e) => {
                    warn!(task_id = task.id, node = %node.node_id, error = %e, "Delegation failed, running locally");
                }
            }
        }

        match self.deps.profile.collaboration_mode {
            CollaborationMode::Independent => self.workers[worker_id].execute(task).await,
            CollaborationMode::Cooperative => {
                if self.deps.profile.task_decomposition {
                    self.run_cooperative(worker_id, task).await
                } else {
                    self.workers[worker_id].execute(task).await
                }
            }
            CollaborationMode::Competitive => self.run_competitive(task).await,
        }
    }

    /// Delegate iff a capable node is available and the profile permits:
    /// risk_tolerance >= 0.3 and speed_vs_accuracy <= 0.7
    async fn should_delegate_to_remote(&self) -> Option<RemoteNode> {
        let profile = &self.deps.profile;
        if profile.risk_tolerance < 0.3 || profile.speed_vs_accuracy > 0.7 {
            return None;
        }
        self.nodes
            .find_available(std::slice::from_ref(&self.config.delegation_capability))
            .await
    }

    async fn delegate(&self, node: &RemoteNode, task: &mut Task) -> eyre::Result<TaskOutcome> {
        self.nodes.set_task_active(&node.node_id, task.id, true).await?;
        let result = delegate_task(node, task).await;
        self.nodes.set_task_active(&node.node_id, task.id, false).await?;

        let message = result?;
        let summary = message
            .payload
            .get("result")
            .and_then(|v| v.as_str())
            .unwrap_or("completed remotely");
        task.add_step("delegated", Some(format!("Node {}: {}", node.node_id, summary)), None);

        Ok(TaskOutcome {
            success: true,
            steps_completed: 1,
            ..Default::default()
        })
    }

    /// Cooperative: split the goal into subtasks spread across the pool.
    /// The parent worker steals its own subtasks from the queue when no one
    /// else picks them up, so progress is guaranteed even with one worker.
    async fn run_cooperative(&self, worker_id: usize, task: &mut Task) -> TaskOutcome {
        let parts = decompose_goal(&task.goal);
        if parts.len() < 2 {
            return self.workers[worker_id].execute(task).await;
        }

        let mut child_ids = Vec::with_capacity(parts.len());
        for part in &parts {
            match self.repo.create(part.clone()).await {
                Ok(child) => {
                    child_ids.push(child.id);
                    self.submit(&child).await;
                }
                Err(e) => return TaskOutcome {
                    success: false,
                    steps_completed: 0,
                    error: Some(format!("Failed to create subtask: {}", e)),
                    ..Default::default()
                },
            }
        }

        self.inner.lock().await.subtasks.insert(task.id, child_ids.clone());
        task.add_step(
            "decomposed",
            Some(format!("Split into {} subtasks: {:?}", child_ids.len(), child_ids)),
            None,
        );

        let deadline = Instant::now() + Duration::from_secs(self.config.run_all_timeout_secs);
        loop {
            let mut all_terminal = true;
            let mut any_failed = false;
            for id in &child_ids {
                match self.repo.get(*id).await.map(|t| t.status) {
                    Some(status) if status.is_terminal() => any_failed |= status == TaskStatus::Error,
                    _ => all_terminal = false,
                }
            }

            if all_terminal {
                return if any_failed {
                    TaskOutcome {
                        success: false,
                        steps_completed: child_ids.len() as u32,
                        error: Some("One or more subtasks failed".to_string()),
                        ..Default::default()
                    }
                } else {
                    TaskOutcome {
                        success: true,
                        steps_completed: child_ids.len() as u32,
                        ..Default::default()
                    }
                };
            }

            if Instant::now() >= deadline || self.shutdown.load(Ordering::SeqCst) {
                return TaskOutcome {
                    success: false,
                    steps_completed: 0,
                    error: Some("Subtasks did not finish in time".to_string()),
                    ..Default::default()
                };
            }

            // Steal one of our own queued subtasks rather than idling
            if let Some(stolen) = self.pop_specific(&child_ids, worker_id).await {
                self.process_leaf(worker_id, stolen).await;
            } else {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    /// Execute a stolen subtask directly on this worker's engine, skipping
    /// strategy dispatch (subtasks are leaf units of work)
    async fn process_leaf(&self, worker_id: usize, task_id: u64) {
        let Some(mut task) = self.repo.get(task_id).await else {
            self.finish(worker_id, task_id).await;
            return;
        };

        if task.status == TaskStatus::Pending {
            if task.set_status(TaskStatus::Running).is_err() || self.repo.update(&task).await.is_err() {
                self.finish(worker_id, task_id).await;
                return;
            }
        } else if task.status != TaskStatus::Running {
            self.finish(worker_id, task_id).await;
            return;
        }

        self.plugins.run_before(&task).await;
        let outcome = self.workers[worker_id].execute(&mut task).await;

        if task.status == TaskStatus::Running {
            let target = if outcome.success { TaskStatus::Done } else { TaskStatus::Error };
            let _ = task.set_status(target);
        }
        if let Err(e) = self.repo.update(&task).await {
            warn!(task_id, error = %e, "Failed to persist subtask");
        }

        self.plugins.run_after(&task, outcome.success).await;
        self.finish(worker_id, task_id).await;
    }

    /// Pop a specific task id set from the queue, preserving the rest
    async fn pop_specific(&self, wanted: &[u64], worker_id: usize) -> Option<u64> {
        let mut inner = self.inner.lock().await;

        let mut kept = Vec::new();
        let mut found = None;
        while let Some(entry) = inner.queue.pop() {
            if found.is_none() && wanted.contains(&entry.task_id) {
                found = Some(entry.task_id);
            } else {
                kept.push(entry);
            }
        }
        for entry in kept {
            inner.queue.push(entry);
        }

        if let Some(task_id) = found {
            inner.active.insert(task_id, worker_id);
        }
        found
    }

    /// Competitive: race clones of the task on ephemeral workers; the first
    /// successful result wins and its step log replaces the task's
    async fn run_competitive(&self, task: &mut Task) -> TaskOutcome {
        let racers = self.workers.len().max(2);

        let mut handles: Vec<JoinHandle<(TaskOutcome, Task)>> = (0..racers)
            .map(|n| {
                let deps = self.deps.clone();
                let mut clone = task.clone();
                tokio::spawn(async move {
                    let racer = Worker::new(1000 + n, deps);
                    let outcome = racer.execute(&mut clone).await;
                    (outcome, clone)
                })
            })
            .collect();

        let mut last: Option<(TaskOutcome, Task)> = None;
        while !handles.is_empty() {
            let (result, _idx, rest) = select_all(handles).await;
            handles = rest;

            if let Ok((outcome, clone)) = result {
                if outcome.success {
                    for handle in &handles {
                        handle.abort();
                    }
                    *task = merge_winner(task, clone);
                    return outcome;
                }
                last = Some((outcome, clone));
            }
        }

        match last {
            Some((outcome, clone)) => {
                *task = merge_winner(task, clone);
                outcome
            }
            None => TaskOutcome {
                success: false,
                steps_completed: 0,
                error: Some("All competitive workers aborted".to_string()),
                ..Default::default()
            },
        }
    }
}

/// Keep the winner's step log and memory but the parent's identity fields
fn merge_winner(original: &Task, winner: Task) -> Task {
    Task {
        id: original.id,
        goal: original.goal.clone(),
        created_at: original.created_at.clone(),
        priority: original.priority,
        ..winner
    }
}

/// Split a goal into subtask goals on coordinating conjunctions
fn decompose_goal(goal: &str) -> Vec<String> {
    let mut parts = vec![goal.to_string()];

    for separator in [" and then ", "; ", " then ", " and "] {
        parts = parts
            .into_iter()
            .flat_map(|part| {
                part.split(separator)
                    .map(|s| s.trim().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
    }

    parts.into_iter().filter(|p| !p.is_empty()).collect()
}
