//! Detached watcher following a pipeline run until it leaves `Running`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::pipeline::{is_empty_result, run_id, run_status};
use crate::report;
use crate::rpc::RpcClient;
use crate::surface::Surface;

/// Run watcher options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between two status fetches
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
        }
    }
}

/// Stops a run watcher from another task
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a spawned run watcher
pub struct RunWatchHandle {
    run_id: String,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<Option<Value>>,
}

impl RunWatchHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stop before the next reschedule. A fetch already in flight completes.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(self.cancel.clone())
    }

    /// Wait for the watcher to stop. Returns the last fetched run.
    pub async fn join(self) -> Option<Value> {
        match self.handle.await {
            Ok(run) => run,
            Err(e) => {
                warn!("Run watcher for {} panicked: {}", self.run_id, e);
                None
            }
        }
    }
}

/// Whether a fetched run still needs watching
pub fn is_still_running(run: &Value) -> bool {
    !is_empty_result(run) && matches!(run_status(run), None | Some("Running"))
}

/// Spawn a watcher for `run`. The first fetch happens immediately; each
/// fetched run is handed to `on_update`. A fetch failure is reported on the
/// surface and ends the watch.
pub fn spawn<U>(
    options: &Options,
    client: Arc<RpcClient>,
    surface: Arc<dyn Surface>,
    run: &Value,
    on_update: U,
) -> Option<RunWatchHandle>
where
    U: Fn(Value) + Send + Sync + 'static,
{
    let run_id = match run_id(run) {
        Some(id) => id.to_string(),
        None => {
            warn!("Pipeline run has no id, not watching it");
            return None;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let interval = options.interval;
    let handle = tokio::spawn(watch(
        run_id.clone(),
        interval,
        client,
        surface,
        cancel.clone(),
        on_update,
    ));

    Some(RunWatchHandle {
        run_id,
        cancel,
        handle,
    })
}

async fn watch<U>(
    mut run_id: String,
    interval: Duration,
    client: Arc<RpcClient>,
    surface: Arc<dyn Surface>,
    cancel: Arc<AtomicBool>,
    on_update: U,
) -> Option<Value>
where
    U: Fn(Value) + Send + Sync + 'static,
{
    info!("Watching pipeline run {}", run_id);
    let mut last = None;

    loop {
        let run = match client.get_run(&run_id).await {
            Ok(run) => run,
            Err(e) => {
                report::present(surface.as_ref(), &e).await;
                return last;
            }
        };
        on_update(run.clone());

        if !is_still_running(&run) {
            info!("Pipeline run {} is {:?}", run_id, run_status(&run));
            return Some(run);
        }
        if let Some(id) = crate::models::pipeline::run_id(&run) {
            run_id = id.to_string();
        }
        last = Some(run);

        if cancel.load(Ordering::SeqCst) {
            debug!("Run watcher for {} canceled", run_id);
            return last;
        }
        tokio::time::sleep(interval).await;
        if cancel.load(Ordering::SeqCst) {
            debug!("Run watcher for {} canceled", run_id);
            return last;
        }
    }
}
