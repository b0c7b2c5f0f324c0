//! Data sync pipeline
//!
//! Owns the per-table processing loop and its transaction boundaries: poll
//! the journal, run the transformer chain, persist, evaluate, then commit or
//! roll back both connections. One call to `process_pending` drives attempts
//! until the journal has nothing pending (a "round"); the scheduler sleeps
//! between rounds.

use crate::batch::BatchProcessor;
use crate::config::PipelineConfiguration;
use crate::error::{Result, SyncError};
use crate::metadata::TableMetaData;
use crate::persist::Persistor;
use crate::results::ResultHandler;
use crate::store::{SyncSession, SyncStores};
use crate::transform::{TransformContext, TransformerChain};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum BatchOutcome {
    /// Poll found nothing pending; the round is complete.
    NoWork,
    /// A batch was applied and committed; more may be pending.
    Applied,
    /// The batch failed and was rolled back; the same rows stay pending and
    /// are retried on the next round.
    RolledBack,
}

pub struct DataSyncPipeline {
    config: PipelineConfiguration,
    table: TableMetaData,
    stores: Arc<dyn SyncStores>,
    batch: BatchProcessor,
    chain: TransformerChain,
    persistor: Persistor,
    results: ResultHandler,
    context: TransformContext,
    cancel: CancellationToken,
}

impl DataSyncPipeline {
    pub fn new(
        config: PipelineConfiguration,
        table: TableMetaData,
        stores: Arc<dyn SyncStores>,
        chain: TransformerChain,
        context: TransformContext,
        cancel: CancellationToken,
    ) -> Self {
        let batch = BatchProcessor::new(config.batch_size);
        Self {
            config,
            table,
            stores,
            batch,
            chain,
            persistor: Persistor,
            results: ResultHandler,
            context,
            cancel,
        }
    }

    pub fn table_name(&self) -> &str {
        self.table.table_name()
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// One batch round: repeat attempts until the journal yields nothing
    /// pending, the batch fails (rows stay pending for the next round), or
    /// the pipeline is cancelled. Structural failures propagate.
    pub async fn process_pending(&self) -> Result<()> {
        loop {
            // Cancellation is observed between attempts, never mid-transaction.
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            match self.process_batch().await? {
                BatchOutcome::Applied => continue,
                BatchOutcome::NoWork => return Ok(()),
                BatchOutcome::RolledBack => return Ok(()),
            }
        }
    }

    async fn process_batch(&self) -> Result<BatchOutcome> {
        let mut session = self
            .stores
            .begin()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        let entries = match self.batch.poll_journal(session.as_mut(), &self.table).await {
            Ok(entries) => entries,
            Err(err) => {
                rollback_quietly(session, self.table.table_name()).await;
                return Err(err);
            }
        };

        if entries.is_empty() {
            debug!(table = self.table.table_name(), "no pending journal entries");
            // Keeps a freshly initialized sync-version row.
            session
                .commit()
                .await
                .map_err(|e| SyncError::Persistence(e.to_string()))?;
            return Ok(BatchOutcome::NoWork);
        }

        let pending = entries.len();
        let transformed = match self.chain.transform(entries, &self.context) {
            Ok(transformed) => transformed,
            Err(err) => {
                // Nothing persisted yet; journal state is untouched.
                rollback_quietly(session, self.table.table_name()).await;
                return Err(err);
            }
        };

        let results = self
            .persistor
            .persist(transformed, session.as_mut(), &self.table)
            .await;
        let advanced = self
            .results
            .process_results(&results, session.as_mut(), &self.table)
            .await;

        if advanced {
            session
                .commit()
                .await
                .map_err(|e| SyncError::Persistence(e.to_string()))?;
            info!(
                table = self.table.table_name(),
                applied = pending,
                "batch applied"
            );
            Ok(BatchOutcome::Applied)
        } else {
            rollback_quietly(session, self.table.table_name()).await;
            warn!(
                table = self.table.table_name(),
                attempted = results.len(),
                of = pending,
                "batch rolled back, entries remain pending"
            );
            Ok(BatchOutcome::RolledBack)
        }
    }
}

async fn rollback_quietly(session: Box<dyn SyncSession>, table: &str) {
    if let Err(err) = session.rollback().await {
        warn!(table, %err, "rollback failed");
    }
}
