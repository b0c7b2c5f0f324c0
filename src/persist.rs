//! Persistor
//!
//! Applies transformed journal entries to the target table with
//! existence-checked upsert semantics, one entry at a time, in batch order.
//! The first failing entry stops the batch so the surrounding transaction can
//! roll back as a unit; per-entry outcomes are returned as data and never
//! thrown past this module.

use crate::journal::{JournalEntry, Operation};
use crate::metadata::TableMetaData;
use crate::store::{StoreError, StoreResult, SyncSession};
use tracing::{debug, error};

#[derive(Debug)]
pub struct TransactionResult {
    entry: JournalEntry,
    success: bool,
    cause: Option<StoreError>,
}

impl TransactionResult {
    pub fn succeeded(entry: JournalEntry) -> Self {
        Self {
            entry,
            success: true,
            cause: None,
        }
    }

    pub fn failed(entry: JournalEntry, cause: StoreError) -> Self {
        Self {
            entry,
            success: false,
            cause: Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn entry(&self) -> &JournalEntry {
        &self.entry
    }

    pub fn sync_id(&self) -> i64 {
        self.entry.sync_id()
    }

    pub fn cause(&self) -> Option<&StoreError> {
        self.cause.as_ref()
    }
}

pub struct Persistor;

impl Persistor {
    pub async fn persist(
        &self,
        entries: Vec<JournalEntry>,
        session: &mut dyn SyncSession,
        table: &TableMetaData,
    ) -> Vec<TransactionResult> {
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.apply(&entry, session, table).await {
                Ok(()) => results.push(TransactionResult::succeeded(entry)),
                Err(cause) => {
                    if cause.is_constraint_violation() {
                        // Expected during referential-integrity races; the
                        // batch rolls back and the row is retried next poll.
                        debug!(
                            table = table.table_name(),
                            sync_id = entry.sync_id(),
                            %cause,
                            "constraint violation while persisting entry"
                        );
                    } else {
                        error!(
                            table = table.table_name(),
                            sync_id = entry.sync_id(),
                            %cause,
                            "failed to persist entry"
                        );
                    }
                    results.push(TransactionResult::failed(entry, cause));
                    break;
                }
            }
        }
        results
    }

    async fn apply(
        &self,
        entry: &JournalEntry,
        session: &mut dyn SyncSession,
        table: &TableMetaData,
    ) -> StoreResult<()> {
        let exists = session.exists(table, entry).await?;
        match (exists, entry.operation()) {
            (true, Operation::Delete) => session.delete(table, entry).await,
            (true, _) => session.update(table, entry).await,
            // Deleting an absent row is a no-op; replay stays idempotent.
            (false, Operation::Delete) => Ok(()),
            (false, _) => session.insert(table, entry).await,
        }
    }
}
