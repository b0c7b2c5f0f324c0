//! Database seam
//!
//! The pipeline talks to the journal and the target schema through the
//! `SyncStores`/`SyncSession` pair: one session per batch attempt, holding
//! one source and one target transaction, committed or rolled back as a unit
//! by the orchestrator. The Postgres implementation lives in
//! [`postgres`]; tests drive the pipeline against an in-memory double.

pub mod postgres;

use crate::journal::JournalEntry;
use crate::metadata::TableMetaData;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Integrity constraint rejection (foreign key, uniqueness). Expected
    /// during replay races; the batch rolls back and retries.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Factory for per-attempt sessions over the pooled source and target
/// data sources.
#[async_trait]
pub trait SyncStores: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn SyncSession>>;
}

/// One batch attempt's view of both databases. Journal reads go to the
/// source transaction, everything else to the target transaction. Nothing is
/// visible to other sessions until `commit`.
#[async_trait]
pub trait SyncSession: Send {
    /// Highest sync identifier present in the journal table.
    async fn read_max_sync_id(&mut self, table: &TableMetaData) -> StoreResult<i64>;

    /// Journal rows with sync_id in the exclusive range (greater_than,
    /// less_than), ascending.
    async fn fetch_journal_rows(
        &mut self,
        table: &TableMetaData,
        greater_than: i64,
        less_than: i64,
    ) -> StoreResult<Vec<JournalEntry>>;

    /// Last-applied watermark; initializes the sync-version row to 0 when
    /// the table is empty.
    async fn read_watermark(&mut self, table: &TableMetaData) -> StoreResult<i64>;

    async fn write_watermark(&mut self, table: &TableMetaData, value: i64) -> StoreResult<()>;

    /// Whether a target row exists for the entry's primary key.
    async fn exists(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<bool>;

    async fn insert(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()>;

    async fn update(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()>;

    async fn delete(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
