//! Result handler
//!
//! Decides whether a persisted batch may advance the watermark. The
//! watermark moves only when every entry succeeded, and only to the sync id
//! of the last entry of the ascending batch. A failed watermark write counts
//! as batch failure so the caller rolls the transaction back and the
//! watermark never gets ahead of committed data.

use crate::metadata::TableMetaData;
use crate::persist::TransactionResult;
use crate::store::SyncSession;
use tracing::{debug, error};

pub struct ResultHandler;

impl ResultHandler {
    pub async fn process_results(
        &self,
        results: &[TransactionResult],
        session: &mut dyn SyncSession,
        table: &TableMetaData,
    ) -> bool {
        if !all_succeeded(results) {
            return false;
        }
        let last = match results.last() {
            Some(last) => last,
            // Nothing to evaluate; trivially complete.
            None => return true,
        };
        match session.write_watermark(table, last.sync_id()).await {
            Ok(()) => {
                debug!(
                    table = table.table_name(),
                    watermark = last.sync_id(),
                    "advanced watermark"
                );
                true
            }
            Err(cause) => {
                error!(
                    table = table.table_name(),
                    watermark = last.sync_id(),
                    %cause,
                    "failed to advance watermark"
                );
                false
            }
        }
    }
}

fn all_succeeded(results: &[TransactionResult]) -> bool {
    results.iter().all(|r| r.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{JournalEntry, Operation};
    use crate::store::StoreError;

    #[test]
    fn test_all_succeeded_scan() {
        let ok = TransactionResult::succeeded(JournalEntry::new(Operation::Insert, 1));
        let bad = TransactionResult::failed(
            JournalEntry::new(Operation::Insert, 2),
            StoreError::ConstraintViolation("fk".to_string()),
        );
        assert!(all_succeeded(&[]));
        assert!(all_succeeded(&[ok]));
        let ok = TransactionResult::succeeded(JournalEntry::new(Operation::Insert, 1));
        assert!(!all_succeeded(&[ok, bad]));
    }
}
