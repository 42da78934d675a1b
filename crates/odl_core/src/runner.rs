//! Async task runner.
//!
//! Wraps long pipeline operations as tasks with a documented state machine:
//! PENDING → RUNNING → (SUCCESS | FAILED | CANCELED). Submissions to the
//! same workspace are serialized FIFO by a per-workspace worker loop;
//! different workspaces run in parallel under a global concurrency cap.
//!
//! Cancellation is cooperative: `cancel` sets a flag that stage code checks
//! at defined points (between gates, between environments, between
//! questions). An in-flight warehouse call is never interrupted; the next
//! checkpoint terminates the task with CANCELED.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, Semaphore};
use uuid::Uuid;

use crate::error::{ErrorBody, OdlError, Result};

// ── Cancellation ───────────────────────────────────────────────

/// Cooperative cancellation flag shared between the runner and stage code.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Stage checkpoint: returns `Err(Canceled)` once the flag is set.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_canceled() {
            Err(OdlError::Canceled)
        } else {
            Ok(())
        }
    }
}

// ── Task state ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: Uuid,
    pub workspace_id: Uuid,
    pub kind: String,
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// The work a task performs: an async closure from a cancel flag to a JSON
/// result. Stage errors propagate out typed.
pub type TaskFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'static>>;
pub type TaskFn = Box<dyn FnOnce(CancelFlag) -> TaskFuture + Send + 'static>;

struct TaskEntry {
    status: TaskStatus,
    cancel: CancelFlag,
}

struct QueuedTask {
    task_id: Uuid,
    work: TaskFn,
}

// ── Runner ─────────────────────────────────────────────────────

pub struct AsyncRunner {
    tasks: Arc<Mutex<HashMap<Uuid, TaskEntry>>>,
    queues: Mutex<HashMap<Uuid, mpsc::UnboundedSender<QueuedTask>>>,
    permits: Arc<Semaphore>,
}

impl AsyncRunner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            queues: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Enqueue a task for its workspace. Returns the task id immediately.
    pub async fn submit(
        &self,
        workspace_id: Uuid,
        kind: &str,
        work: TaskFn,
    ) -> Uuid {
        let task_id = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let status = TaskStatus {
            task_id,
            workspace_id,
            kind: kind.to_string(),
            state: TaskState::Pending,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        };
        self.tasks
            .lock()
            .await
            .insert(task_id, TaskEntry { status, cancel });

        let sender = self.workspace_sender(workspace_id).await;
        // The worker loop owns the receiver; a send only fails if the loop
        // died, which would be a bug worth surfacing loudly.
        if sender.send(QueuedTask { task_id, work }).is_err() {
            tracing::error!(%workspace_id, %task_id, "workspace worker gone; task dropped");
            let mut tasks = self.tasks.lock().await;
            if let Some(entry) = tasks.get_mut(&task_id) {
                entry.status.state = TaskState::Failed;
                entry.status.error =
                    Some(OdlError::Internal(anyhow::anyhow!("workspace worker unavailable")).to_body());
                entry.status.completed_at = Some(Utc::now());
            }
        }
        task_id
    }

    pub async fn status(&self, task_id: Uuid) -> Result<TaskStatus> {
        self.tasks
            .lock()
            .await
            .get(&task_id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| OdlError::NotFound(format!("task {task_id}")))
    }

    /// Request cooperative cancellation. Pending tasks flip to CANCELED at
    /// pick-up; running tasks at their next checkpoint.
    pub async fn cancel(&self, task_id: Uuid) -> Result<()> {
        let tasks = self.tasks.lock().await;
        let entry = tasks
            .get(&task_id)
            .ok_or_else(|| OdlError::NotFound(format!("task {task_id}")))?;
        if !entry.status.state.is_terminal() {
            entry.cancel.cancel();
        }
        Ok(())
    }

    pub async fn list(&self, workspace_id: Option<Uuid>) -> Vec<TaskStatus> {
        let tasks = self.tasks.lock().await;
        let mut out: Vec<TaskStatus> = tasks
            .values()
            .map(|e| e.status.clone())
            .filter(|s| workspace_id.map_or(true, |w| s.workspace_id == w))
            .collect();
        out.sort_by_key(|s| s.submitted_at);
        out
    }

    /// Get (or spawn) the FIFO worker loop for a workspace.
    async fn workspace_sender(&self, workspace_id: Uuid) -> mpsc::UnboundedSender<QueuedTask> {
        let mut queues = self.queues.lock().await;
        if let Some(sender) = queues.get(&workspace_id) {
            return sender.clone();
        }
        let (sender, mut receiver) = mpsc::unbounded_channel::<QueuedTask>();
        let tasks = Arc::clone(&self.tasks);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            while let Some(queued) = receiver.recv().await {
                let permit = permits
                    .acquire()
                    .await
                    .expect("task semaphore never closes");
                run_one(&tasks, queued).await;
                drop(permit);
            }
        });
        queues.insert(workspace_id, sender.clone());
        sender
    }
}

async fn run_one(tasks: &Mutex<HashMap<Uuid, TaskEntry>>, queued: QueuedTask) {
    let QueuedTask { task_id, work } = queued;

    // Pick-up: honor cancellation requested while pending, else mark RUNNING.
    let cancel = {
        let mut guard = tasks.lock().await;
        let Some(entry) = guard.get_mut(&task_id) else {
            return;
        };
        if entry.cancel.is_canceled() {
            entry.status.state = TaskState::Canceled;
            entry.status.completed_at = Some(Utc::now());
            return;
        }
        entry.status.state = TaskState::Running;
        entry.status.started_at = Some(Utc::now());
        entry.cancel.clone()
    };

    let outcome = work(cancel).await;

    let mut guard = tasks.lock().await;
    let Some(entry) = guard.get_mut(&task_id) else {
        return;
    };
    entry.status.completed_at = Some(Utc::now());
    match outcome {
        Ok(result) => {
            entry.status.state = TaskState::Success;
            entry.status.result = Some(result);
            tracing::debug!(%task_id, kind = %entry.status.kind, "task succeeded");
        }
        Err(OdlError::Canceled) => {
            entry.status.state = TaskState::Canceled;
            tracing::info!(%task_id, kind = %entry.status.kind, "task canceled");
        }
        Err(err) => {
            entry.status.state = TaskState::Failed;
            tracing::warn!(%task_id, kind = %entry.status.kind, error = %err, "task failed");
            entry.status.error = Some(err.to_body());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn work<F, Fut>(f: F) -> TaskFn
    where
        F: FnOnce(CancelFlag) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Box::new(move |cancel| Box::pin(f(cancel)))
    }

    async fn wait_terminal(runner: &AsyncRunner, task_id: Uuid) -> TaskStatus {
        for _ in 0..200 {
            let status = runner.status(task_id).await.unwrap();
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_success_flow() {
        let runner = AsyncRunner::new(2);
        let id = runner
            .submit(
                Uuid::new_v4(),
                "compile",
                work(|_| async { Ok(serde_json::json!({"ok": true})) }),
            )
            .await;
        let status = wait_terminal(&runner, id).await;
        assert_eq!(status.state, TaskState::Success);
        assert_eq!(status.result.unwrap()["ok"], true);
        assert!(status.started_at.is_some());
        assert!(status.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_carries_retryable_flag() {
        let runner = AsyncRunner::new(2);
        let id = runner
            .submit(
                Uuid::new_v4(),
                "deploy",
                work(|_| async { Err(OdlError::Timeout("verify deadline".into())) }),
            )
            .await;
        let status = wait_terminal(&runner, id).await;
        assert_eq!(status.state, TaskState::Failed);
        let error = status.error.unwrap();
        assert_eq!(error.code, "TIMEOUT");
        assert!(error.retryable);
    }

    #[tokio::test]
    async fn test_cancel_observed_at_checkpoint() {
        let runner = AsyncRunner::new(2);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let id = runner
            .submit(
                Uuid::new_v4(),
                "regression",
                work(move |cancel| async move {
                    started_tx.send(()).ok();
                    // Simulated per-question loop with a checkpoint each turn.
                    for _ in 0..100 {
                        cancel.checkpoint()?;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Ok(serde_json::json!({}))
                }),
            )
            .await;
        started_rx.await.unwrap();
        runner.cancel(id).await.unwrap();
        let status = wait_terminal(&runner, id).await;
        assert_eq!(status.state, TaskState::Canceled);
    }

    #[tokio::test]
    async fn test_same_workspace_fifo() {
        let runner = AsyncRunner::new(4);
        let workspace = Uuid::new_v4();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut ids = Vec::new();
        for i in 0..3u64 {
            let order = Arc::clone(&order);
            ids.push(
                runner
                    .submit(
                        workspace,
                        "eval",
                        work(move |_| async move {
                            // The slowest task is submitted first; FIFO means
                            // it still completes first.
                            tokio::time::sleep(Duration::from_millis(30 - i * 10)).await;
                            order.lock().await.push(i);
                            Ok(serde_json::json!(i))
                        }),
                    )
                    .await,
            );
        }
        for id in &ids {
            wait_terminal(&runner, *id).await;
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_cancel_pending_task_never_runs() {
        let runner = AsyncRunner::new(1);
        let workspace = Uuid::new_v4();
        let (block_tx, block_rx) = tokio::sync::oneshot::channel::<()>();

        // First task blocks the workspace queue until released.
        let blocker = runner
            .submit(
                workspace,
                "compile",
                work(move |_| async move {
                    block_rx.await.ok();
                    Ok(serde_json::json!({}))
                }),
            )
            .await;

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let pending = runner
            .submit(
                workspace,
                "compile",
                work(move |_| async move {
                    ran_clone.store(true, Ordering::SeqCst);
                    Ok(serde_json::json!({}))
                }),
            )
            .await;

        runner.cancel(pending).await.unwrap();
        block_tx.send(()).unwrap();

        wait_terminal(&runner, blocker).await;
        let status = wait_terminal(&runner, pending).await;
        assert_eq!(status.state, TaskState::Canceled);
        assert!(!ran.load(Ordering::SeqCst));
    }
}
