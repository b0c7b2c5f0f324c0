//! PostgreSQL store
//!
//! One pooled connection per role (source, target). Every batch attempt
//! opens one transaction on each; the orchestrator decides commit or
//! rollback. SQL text is derived from `TableMetaData` so parameter binding
//! stays positional and in column order.

use crate::config::TableConfig;
use crate::error::{Result, SyncError};
use crate::journal::{FieldValue, JournalEntry, Operation, ACTION_COLUMN, SYNC_ID_COLUMN};
use crate::metadata::{ColumnDefinition, TableMetaData};
use crate::store::{StoreError, StoreResult, SyncSession, SyncStores};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo};
use std::time::Duration;
use uuid::Uuid;

pub struct PgSyncStores {
    source: PgPool,
    target: PgPool,
}

impl PgSyncStores {
    pub fn new(source: PgPool, target: PgPool) -> Self {
        Self { source, target }
    }

    pub async fn connect(source_url: &str, target_url: &str) -> Result<Self> {
        let source = connect_pool(source_url).await?;
        let target = connect_pool(target_url).await?;
        Ok(Self { source, target })
    }

    pub fn target_pool(&self) -> &PgPool {
        &self.target
    }

    pub fn source_pool(&self) -> &PgPool {
        &self.source
    }

    /// Watermark vs. journal head for one table, outside any pipeline
    /// transaction. Used by the status command.
    pub async fn read_status(
        &self,
        source_schema: &str,
        target_schema: &str,
        table: &str,
    ) -> Result<TableStatus> {
        let watermark_sql = format!(
            "SELECT {}::int8 FROM {}.{}",
            SYNC_ID_COLUMN,
            target_schema,
            crate::journal::sync_version_table_name(table)
        );
        let row = sqlx::query(&watermark_sql)
            .fetch_optional(&self.target)
            .await
            .map_err(|e| status_error(table, e))?;
        let watermark = match row {
            Some(row) => row.try_get(0).map_err(|e| status_error(table, e))?,
            None => 0,
        };

        let max_sql = format!(
            "SELECT MAX({})::int8 FROM {}.{}",
            SYNC_ID_COLUMN,
            source_schema,
            crate::journal::journal_table_name(table)
        );
        let row = sqlx::query(&max_sql)
            .fetch_one(&self.source)
            .await
            .map_err(|e| status_error(table, e))?;
        let max: Option<i64> = row.try_get(0).map_err(|e| status_error(table, e))?;

        Ok(TableStatus {
            watermark,
            max_sync_id: max.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableStatus {
    pub watermark: i64,
    pub max_sync_id: i64,
}

impl TableStatus {
    pub fn pending(&self) -> i64 {
        (self.max_sync_id - self.watermark).max(0)
    }
}

fn status_error(table: &str, err: sqlx::Error) -> SyncError {
    SyncError::Journal {
        table: table.to_string(),
        message: err.to_string(),
    }
}

async fn connect_pool(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await
        .map_err(|e| SyncError::Connectivity(e.to_string()))?;

    // Test the connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| SyncError::Connectivity(e.to_string()))?;

    Ok(pool)
}

#[async_trait]
impl SyncStores for PgSyncStores {
    async fn begin(&self) -> StoreResult<Box<dyn SyncSession>> {
        let source = self.source.begin().await.map_err(classify)?;
        let target = self.target.begin().await.map_err(classify)?;
        Ok(Box::new(PgSyncSession { source, target }))
    }
}

pub struct PgSyncSession {
    source: Transaction<'static, Postgres>,
    target: Transaction<'static, Postgres>,
}

#[async_trait]
impl SyncSession for PgSyncSession {
    async fn read_max_sync_id(&mut self, table: &TableMetaData) -> StoreResult<i64> {
        let sql = format!(
            "SELECT MAX({})::int8 FROM {}",
            SYNC_ID_COLUMN,
            table.qualified_journal()
        );
        let row = sqlx::query(&sql)
            .fetch_one(&mut *self.source)
            .await
            .map_err(classify)?;
        let max: Option<i64> = row.try_get(0).map_err(classify)?;
        Ok(max.unwrap_or(0))
    }

    async fn fetch_journal_rows(
        &mut self,
        table: &TableMetaData,
        greater_than: i64,
        less_than: i64,
    ) -> StoreResult<Vec<JournalEntry>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} > $1 AND {} < $2 ORDER BY {} ASC",
            table.qualified_journal(),
            SYNC_ID_COLUMN,
            SYNC_ID_COLUMN,
            SYNC_ID_COLUMN
        );
        let rows = sqlx::query(&sql)
            .bind(greater_than)
            .bind(less_than)
            .fetch_all(&mut *self.source)
            .await
            .map_err(classify)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(decode_journal_row(row)?);
        }
        Ok(entries)
    }

    async fn read_watermark(&mut self, table: &TableMetaData) -> StoreResult<i64> {
        let select = format!(
            "SELECT {}::int8 FROM {}",
            SYNC_ID_COLUMN,
            table.qualified_sync_version()
        );
        let row = sqlx::query(&select)
            .fetch_optional(&mut *self.target)
            .await
            .map_err(classify)?;
        match row {
            Some(row) => row.try_get(0).map_err(classify),
            None => {
                let insert = format!(
                    "INSERT INTO {} ({}) VALUES (0)",
                    table.qualified_sync_version(),
                    SYNC_ID_COLUMN
                );
                sqlx::query(&insert)
                    .execute(&mut *self.target)
                    .await
                    .map_err(classify)?;
                Ok(0)
            }
        }
    }

    async fn write_watermark(&mut self, table: &TableMetaData, value: i64) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET {} = $1",
            table.qualified_sync_version(),
            SYNC_ID_COLUMN
        );
        sqlx::query(&sql)
            .bind(value)
            .execute(&mut *self.target)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn exists(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<bool> {
        let sql = table.select_by_key_sql();
        let mut query = sqlx::query(&sql);
        for key in table.primary_keys() {
            query = bind_entry_column(query, table, key, entry)?;
        }
        let row = query
            .fetch_optional(&mut *self.target)
            .await
            .map_err(classify)?;
        Ok(row.is_some())
    }

    async fn insert(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()> {
        let sql = table.insert_sql();
        let mut query = sqlx::query(&sql);
        for column in table.columns() {
            query = bind_value(query, entry.value(&column.name), column)?;
        }
        query.execute(&mut *self.target).await.map_err(classify)?;
        Ok(())
    }

    async fn update(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()> {
        let sql = table.update_sql();
        let mut query = sqlx::query(&sql);
        for column in table.non_primary_keys() {
            query = bind_value(query, entry.value(&column.name), column)?;
        }
        for key in table.primary_keys() {
            query = bind_entry_column(query, table, key, entry)?;
        }
        for key in table.extra_predicates() {
            query = bind_entry_column(query, table, key, entry)?;
        }
        query.execute(&mut *self.target).await.map_err(classify)?;
        Ok(())
    }

    async fn delete(&mut self, table: &TableMetaData, entry: &JournalEntry) -> StoreResult<()> {
        let sql = table.delete_sql();
        let mut query = sqlx::query(&sql);
        for key in table.primary_keys() {
            query = bind_entry_column(query, table, key, entry)?;
        }
        query.execute(&mut *self.target).await.map_err(classify)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.target.commit().await.map_err(classify)?;
        self.source.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.target.rollback().await.map_err(classify)?;
        self.source.rollback().await.map_err(classify)?;
        Ok(())
    }
}

/// Map a driver error into the store taxonomy. SQLSTATE class 23 covers the
/// integrity constraint family, including 23503 (foreign key), which on
/// Postgres does not share a common code prefix with uniqueness beyond the
/// class itself.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if is_constraint_sqlstate(code.as_ref()) {
                return StoreError::ConstraintViolation(db.message().to_string());
            }
        }
    }
    StoreError::Database(err.to_string())
}

fn is_constraint_sqlstate(code: &str) -> bool {
    code.starts_with("23")
}

fn decode_journal_row(row: &PgRow) -> StoreResult<JournalEntry> {
    let mut fields = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_field(row, column.ordinal(), column.type_info().name())?;
        fields.push((column.name().to_string(), value));
    }

    let sync_id = fields
        .iter()
        .find(|(name, _)| name.as_str() == SYNC_ID_COLUMN)
        .and_then(|(_, v)| v.as_int())
        .ok_or_else(|| {
            StoreError::Database(format!("journal row without {} column", SYNC_ID_COLUMN))
        })?;
    let action = fields
        .iter()
        .find(|(name, _)| name.as_str() == ACTION_COLUMN)
        .and_then(|(_, v)| v.as_text().map(str::to_string))
        .ok_or_else(|| {
            StoreError::Database(format!("journal row without {} column", ACTION_COLUMN))
        })?;
    let operation =
        Operation::from_action(&action).map_err(|e| StoreError::Database(e.to_string()))?;

    let mut entry = JournalEntry::new(operation, sync_id);
    for (name, value) in fields {
        entry.set_field(&name, value);
    }
    Ok(entry)
}

fn decode_field(row: &PgRow, index: usize, type_name: &str) -> StoreResult<FieldValue> {
    let value = match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(classify)?
            .map(|v| FieldValue::Int(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(classify)?
            .map(|v| FieldValue::Int(v as i64)),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map_err(classify)?
            .map(FieldValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map_err(classify)?
            .map(|v| FieldValue::Float(v as f64)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map_err(classify)?
            .map(FieldValue::Float),
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map_err(classify)?
            .map(FieldValue::Bool),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<String>, _>(index)
            .map_err(classify)?
            .map(FieldValue::Text),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map_err(classify)?
            .map(FieldValue::Bytes),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map_err(classify)?
            .map(FieldValue::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map_err(classify)?
            .map(|v| FieldValue::Timestamp(Utc.from_utc_datetime(&v))),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)
            .map_err(classify)?
            .map(FieldValue::Uuid),
        other => {
            return Err(StoreError::Database(format!(
                "unsupported journal column type {}",
                other
            )))
        }
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

fn bind_entry_column<'q>(
    query: Query<'q, Postgres, PgArguments>,
    table: &TableMetaData,
    column_name: &str,
    entry: &JournalEntry,
) -> StoreResult<Query<'q, Postgres, PgArguments>> {
    let column = table.column(column_name).ok_or_else(|| {
        StoreError::Database(format!(
            "column '{}' missing from metadata for table {}",
            column_name,
            table.table_name()
        ))
    })?;
    bind_value(query, entry.value(column_name), column)
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &FieldValue,
    column: &ColumnDefinition,
) -> StoreResult<Query<'q, Postgres, PgArguments>> {
    let query = match value {
        FieldValue::Null => bind_typed_null(query, &column.sql_type),
        FieldValue::Int(v) => query.bind(*v),
        FieldValue::Float(v) => query.bind(*v),
        FieldValue::Text(v) => query.bind(v.clone()),
        FieldValue::Bool(v) => query.bind(*v),
        FieldValue::Bytes(v) => query.bind(v.clone()),
        FieldValue::Timestamp(v) => query.bind(*v),
        FieldValue::Uuid(v) => query.bind(*v),
    };
    Ok(query)
}

/// Nulls are bound with the column's declared type so the prepared statement
/// parameter types line up.
fn bind_typed_null<'q>(
    query: Query<'q, Postgres, PgArguments>,
    sql_type: &str,
) -> Query<'q, Postgres, PgArguments> {
    match sql_type.to_ascii_lowercase().as_str() {
        "smallint" | "integer" | "bigint" => query.bind(Option::<i64>::None),
        "real" | "double precision" | "numeric" => query.bind(Option::<f64>::None),
        "boolean" => query.bind(Option::<bool>::None),
        "bytea" => query.bind(Option::<Vec<u8>>::None),
        "uuid" => query.bind(Option::<Uuid>::None),
        t if t.starts_with("timestamp") => query.bind(Option::<DateTime<Utc>>::None),
        _ => query.bind(Option::<String>::None),
    }
}

/// Build the table descriptor from the target catalog. Runs once per
/// pipeline, before the polling task starts.
pub async fn load_table_metadata(
    pool: &PgPool,
    source_schema: &str,
    target_schema: &str,
    table: &TableConfig,
) -> Result<TableMetaData> {
    let column_rows = sqlx::query(
        r#"
        SELECT column_name::text,
               data_type::text,
               character_maximum_length::int4,
               column_default::text,
               is_identity::text
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
        "#,
    )
    .bind(target_schema)
    .bind(&table.name)
    .fetch_all(pool)
    .await
    .map_err(|e| SyncError::Metadata {
        table: table.name.clone(),
        message: e.to_string(),
    })?;

    if column_rows.is_empty() {
        return Err(SyncError::Metadata {
            table: table.name.clone(),
            message: format!("table not found in target schema {}", target_schema),
        });
    }

    let mut columns = Vec::with_capacity(column_rows.len());
    for row in &column_rows {
        let name: String = row.try_get(0).map_err(|e| metadata_error(&table.name, e))?;
        let sql_type: String = row.try_get(1).map_err(|e| metadata_error(&table.name, e))?;
        let size: Option<i32> = row.try_get(2).map_err(|e| metadata_error(&table.name, e))?;
        let default: Option<String> = row.try_get(3).map_err(|e| metadata_error(&table.name, e))?;
        let is_identity: String = row.try_get(4).map_err(|e| metadata_error(&table.name, e))?;
        let auto_increment = is_identity == "YES"
            || default
                .as_deref()
                .map(|d| d.starts_with("nextval("))
                .unwrap_or(false);
        columns.push(ColumnDefinition {
            name,
            sql_type,
            size,
            default,
            auto_increment,
        });
    }

    let key_rows = sqlx::query(
        r#"
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = $1
          AND tc.table_name = $2
        ORDER BY kcu.ordinal_position
        "#,
    )
    .bind(target_schema)
    .bind(&table.name)
    .fetch_all(pool)
    .await
    .map_err(|e| SyncError::Metadata {
        table: table.name.clone(),
        message: e.to_string(),
    })?;

    let mut primary_keys = Vec::with_capacity(key_rows.len());
    for row in &key_rows {
        let name: String = row.try_get(0).map_err(|e| metadata_error(&table.name, e))?;
        primary_keys.push(name);
    }

    TableMetaData::new(
        source_schema,
        target_schema,
        &table.name,
        columns,
        primary_keys,
        table.extra_predicates.clone(),
    )
}

fn metadata_error(table: &str, err: sqlx::Error) -> SyncError {
    SyncError::Metadata {
        table: table.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_sqlstate_classification() {
        assert!(is_constraint_sqlstate("23503"));
        assert!(is_constraint_sqlstate("23505"));
        assert!(is_constraint_sqlstate("23000"));
        assert!(!is_constraint_sqlstate("42P01"));
        assert!(!is_constraint_sqlstate("08006"));
    }
}
