use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::mesh::TaskService;
use crate::types::GenerationTask;
use crate::{Result, VitaError};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Where the watch loop stands for the current task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    /// The task has not reached a terminal status; the timer keeps running.
    Polling,
    /// A terminal status was observed; the timer has stopped for good.
    Finished,
    /// A status-fetch call itself failed. The timer is stopped and the last
    /// known task snapshot is preserved, not overwritten.
    PollFailed(String),
}

/// One observation of the watched task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub task: GenerationTask,
    pub state: WatchState,
}

impl TaskSnapshot {
    pub fn is_settled(&self) -> bool {
        !matches!(self.state, WatchState::Polling)
    }
}

/// A caller-owned task slot. At most one polling loop runs per slot; watching
/// a new task cancels the previous loop first, and `cancel` is idempotent.
#[derive(Default)]
pub struct TaskSlot {
    active: Option<ActiveWatch>,
}

struct ActiveWatch {
    abort: AbortHandle,
}

impl Drop for ActiveWatch {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts polling `task` against `service`: one immediate poll, then a
    /// fixed interval until a terminal status, a poll failure, or
    /// cancellation. Snapshots arrive on the returned watch channel.
    pub fn watch(
        &mut self,
        service: Arc<dyn TaskService>,
        task: GenerationTask,
    ) -> watch::Receiver<TaskSnapshot> {
        self.cancel();

        let (tx, rx) = watch::channel(TaskSnapshot {
            task: task.clone(),
            state: WatchState::Polling,
        });

        let handle = tokio::spawn(run_poll_loop(service, task, tx));
        self.active = Some(ActiveWatch {
            abort: handle.abort_handle(),
        });
        rx
    }

    /// Stops any active loop without further network calls. Idempotent.
    pub fn cancel(&mut self) {
        self.active = None;
    }
}

async fn run_poll_loop(
    service: Arc<dyn TaskService>,
    mut task: GenerationTask,
    tx: watch::Sender<TaskSnapshot>,
) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        // First tick completes immediately, so the first poll carries no
        // artificial delay.
        interval.tick().await;

        match refresh(service.as_ref(), &task).await {
            Ok(update) => {
                if update.accepted_endpoint.is_some() {
                    task.accepted_endpoint = update.accepted_endpoint.clone();
                }
                task.status = update.status.clone();
                task.mesh_url = update.mesh_url.clone();
                task.preview_url = update.preview_url.clone();

                let terminal = task.status.is_terminal();
                let state = if terminal {
                    debug!(task_id = %task.task_id, status = %task.status, "task reached terminal status");
                    WatchState::Finished
                } else {
                    WatchState::Polling
                };
                let stop = tx
                    .send(TaskSnapshot {
                        task: task.clone(),
                        state,
                    })
                    .is_err();
                if terminal || stop {
                    return;
                }
            }
            Err(err) => {
                let err = VitaError::Polling(Box::new(err));
                let _ = tx.send(TaskSnapshot {
                    task: task.clone(),
                    state: WatchState::PollFailed(err.to_string()),
                });
                return;
            }
        }
    }
}

async fn refresh(service: &dyn TaskService, task: &GenerationTask) -> Result<GenerationTask> {
    service
        .poll_task(
            &task.task_id,
            task.source,
            task.accepted_endpoint.as_deref(),
        )
        .await
}
