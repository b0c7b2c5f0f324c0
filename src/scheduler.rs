//! Task scheduler
//!
//! One perpetual polling task per synced table, each on its own tokio task,
//! started at service start and stopped through a shared cancellation token.
//! A task finishes its in-flight round before it observes cancellation; no
//! transaction is interrupted mid-flight.

use crate::pipeline::DataSyncPipeline;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct SyncScheduler {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Token to derive per-pipeline child tokens from.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(&mut self, pipeline: DataSyncPipeline) {
        self.handles.push(tokio::spawn(run_table_loop(pipeline)));
    }

    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal every table loop and wait for them to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn run_table_loop(pipeline: DataSyncPipeline) {
    let cancel = pipeline.cancellation().clone();
    info!(table = pipeline.table_name(), "sync task started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(err) = pipeline.process_pending().await {
            // Structural failure; this table's processing stops.
            error!(table = pipeline.table_name(), %err, "sync aborted");
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pipeline.poll_interval()) => {}
        }
    }
    info!(table = pipeline.table_name(), "sync task stopped");
}
