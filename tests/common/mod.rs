//! In-memory store double for pipeline tests
//!
//! Mirrors the transactional behavior of the Postgres store: a session works
//! on a staged copy of the shared state, `commit` publishes it, `rollback`
//! discards it. Failures are injected per sync id (constraint violations) or
//! on watermark writes. Every store operation is recorded in an operation log
//! that survives rollback, so tests can assert exactly what was attempted.

use async_trait::async_trait;
use schemasync::journal::{FieldValue, JournalEntry};
use schemasync::metadata::TableMetaData;
use schemasync::store::{StoreError, StoreResult, SyncSession, SyncStores};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub type Row = HashMap<String, FieldValue>;

#[derive(Default, Clone)]
pub struct MemoryState {
    /// Source journal rows; read-only as far as the pipeline is concerned.
    pub journal: Vec<JournalEntry>,
    /// Sync-version table content; `None` means the table is empty.
    pub watermark: Option<i64>,
    /// Target table rows keyed by rendered primary key.
    pub rows: BTreeMap<String, Row>,
    /// Sync ids whose writes raise a constraint violation.
    pub poison: HashSet<i64>,
    /// When set, every watermark write fails.
    pub fail_watermark_writes: bool,
}

pub struct MemorySyncStores {
    state: Arc<Mutex<MemoryState>>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl MemorySyncStores {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_journal(entries: Vec<JournalEntry>) -> Self {
        let stores = Self::new();
        stores.state.lock().unwrap().journal = entries;
        stores
    }

    pub fn mutate<F: FnOnce(&mut MemoryState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn watermark(&self) -> Option<i64> {
        self.state.lock().unwrap().watermark
    }

    pub fn rows(&self) -> BTreeMap<String, Row> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Convenience wrapper over the `SyncStores` trait for tests that drive
    /// pipeline components directly.
    pub async fn begin_session(&self) -> Box<dyn SyncSession> {
        self.begin().await.unwrap()
    }
}

#[async_trait]
impl SyncStores for MemorySyncStores {
    async fn begin(&self) -> StoreResult<Box<dyn SyncSession>> {
        let staged = self.state.lock().unwrap().clone();
        Ok(Box::new(MemorySession {
            staged,
            shared: self.state.clone(),
            ops: self.ops.clone(),
        }))
    }
}

pub struct MemorySession {
    staged: MemoryState,
    shared: Arc<Mutex<MemoryState>>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl MemorySession {
    fn log(&self, op: &str) {
        self.ops.lock().unwrap().push(op.to_string());
    }

    fn key_of(table: &TableMetaData, entry: &JournalEntry) -> String {
        table
            .primary_keys()
            .iter()
            .map(|k| format!("{:?}", entry.value(k)))
            .collect::<Vec<_>>()
            .join("|")
    }

    fn row_of(table: &TableMetaData, entry: &JournalEntry) -> Row {
        table
            .columns()
            .iter()
            .map(|c| (c.name.clone(), entry.value(&c.name).clone()))
            .collect()
    }

    fn check_poison(&self, entry: &JournalEntry) -> StoreResult<()> {
        if self.staged.poison.contains(&entry.sync_id()) {
            return Err(StoreError::ConstraintViolation(format!(
                "injected violation for sync id {}",
                entry.sync_id()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncSession for MemorySession {
    async fn read_max_sync_id(&mut self, _table: &TableMetaData) -> StoreResult<i64> {
        Ok(self
            .staged
            .journal
            .iter()
            .map(|e| e.sync_id())
            .max()
            .unwrap_or(0))
    }

    async fn fetch_journal_rows(
        &mut self,
        _table: &TableMetaData,
        greater_than: i64,
        less_than: i64,
    ) -> StoreResult<Vec<JournalEntry>> {
        let mut rows: Vec<JournalEntry> = self
            .staged
            .journal
            .iter()
            .filter(|e| e.sync_id() > greater_than && e.sync_id() < less_than)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.sync_id());
        Ok(rows)
    }

    async fn read_watermark(&mut self, _table: &TableMetaData) -> StoreResult<i64> {
        match self.staged.watermark {
            Some(value) => Ok(value),
            None => {
                self.staged.watermark = Some(0);
                Ok(0)
            }
        }
    }

    async fn write_watermark(&mut self, _table: &TableMetaData, value: i64) -> StoreResult<()> {
        self.log(&format!("watermark:{}", value));
        if self.staged.fail_watermark_writes {
            return Err(StoreError::Database(
                "injected watermark failure".to_string(),
            ));
        }
        self.staged.watermark = Some(value);
        Ok(())
    }

    async fn exists(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<bool> {
        self.log(&format!("exists:{}", entry.sync_id()));
        Ok(self.staged.rows.contains_key(&Self::key_of(table, entry)))
    }

    async fn insert(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()> {
        self.log(&format!("insert:{}", entry.sync_id()));
        self.check_poison(entry)?;
        self.staged
            .rows
            .insert(Self::key_of(table, entry), Self::row_of(table, entry));
        Ok(())
    }

    async fn update(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()> {
        self.log(&format!("update:{}", entry.sync_id()));
        self.check_poison(entry)?;
        self.staged
            .rows
            .insert(Self::key_of(table, entry), Self::row_of(table, entry));
        Ok(())
    }

    async fn delete(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()> {
        self.log(&format!("delete:{}", entry.sync_id()));
        self.check_poison(entry)?;
        self.staged.rows.remove(&Self::key_of(table, entry));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        *self.shared.lock().unwrap() = self.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
