//! Polling loop for asynchronous remote tasks

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::BridgeError;
use crate::models::task::AsyncTask;
use crate::rpc::RpcClient;

/// Poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between two fetches
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
        }
    }
}

/// Something that can re-fetch a task by id
#[async_trait]
pub trait FetchTask: Send + Sync {
    async fn fetch_task(&self, task_id: &str) -> Result<AsyncTask, BridgeError>;
}

#[async_trait]
impl FetchTask for RpcClient {
    async fn fetch_task(&self, task_id: &str) -> Result<AsyncTask, BridgeError> {
        self.get_task(task_id).await
    }
}

/// Fetch a task until it reaches a terminal status.
///
/// Every fetched snapshot goes to `on_progress` together with its 1-based
/// fetch number. There is no delay before the first fetch and no bound on
/// the number of fetches. A terminal `error` or `canceled` status is
/// returned like `success`; only fetch failures are errors.
pub async fn poll_task<T, S, F, P>(
    options: &Options,
    source: &T,
    task_id: &str,
    sleep_fn: S,
    mut on_progress: P,
) -> Result<AsyncTask, BridgeError>
where
    T: FetchTask + ?Sized,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
    P: FnMut(&AsyncTask, u32),
{
    let mut fetches: u32 = 0;

    loop {
        if fetches > 0 {
            sleep_fn(options.interval).await;
        }

        let task = source.fetch_task(task_id).await?;
        fetches += 1;
        debug!(
            "Task {} is {:?} ({:.0}%)",
            task_id,
            task.status,
            task.progress * 100.0
        );
        on_progress(&task, fetches);

        if task.is_terminal() {
            info!("Task {} finished with {:?} after {} fetches", task_id, task.status, fetches);
            return Ok(task);
        }
    }
}
