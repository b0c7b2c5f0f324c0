//! Batch processor
//!
//! Reads the target watermark, compares it to the journal's maximum sync
//! identifier and pulls the next bounded batch of journal rows, ascending by
//! sync id. The upper bound is the literal `watermark + batch_size + 1`,
//! exclusive; with contiguous sync ids that admits at most `batch_size` rows.

use crate::error::{Result, SyncError};
use crate::journal::JournalEntry;
use crate::metadata::TableMetaData;
use crate::store::SyncSession;
use tracing::debug;

pub struct BatchProcessor {
    batch_size: i64,
}

impl BatchProcessor {
    pub fn new(batch_size: i64) -> Self {
        Self { batch_size }
    }

    pub async fn poll_journal(
        &self,
        session: &mut dyn SyncSession,
        table: &TableMetaData,
    ) -> Result<Vec<JournalEntry>> {
        let watermark = session
            .read_watermark(table)
            .await
            .map_err(|e| journal_error(table, e))?;
        let max_sync_id = session
            .read_max_sync_id(table)
            .await
            .map_err(|e| journal_error(table, e))?;

        if max_sync_id <= watermark {
            return Ok(Vec::new());
        }

        let upper = watermark + self.batch_size + 1;
        let entries = session
            .fetch_journal_rows(table, watermark, upper)
            .await
            .map_err(|e| journal_error(table, e))?;

        debug!(
            table = table.table_name(),
            watermark,
            max_sync_id,
            pending = entries.len(),
            "polled journal"
        );
        Ok(entries)
    }
}

fn journal_error(table: &TableMetaData, err: crate::store::StoreError) -> SyncError {
    SyncError::Journal {
        table: table.table_name().to_string(),
        message: err.to_string(),
    }
}
