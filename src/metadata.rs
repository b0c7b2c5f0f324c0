//! Table metadata
//!
//! Immutable per-table schema descriptor built once per pipeline. The column
//! order is stable across builds; positional SQL parameter binding in the
//! store depends on it.

use crate::error::{Result, SyncError};
use crate::journal::{journal_table_name, sync_version_table_name};
use itertools::Itertools;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub size: Option<i32>,
    pub default: Option<String>,
    pub auto_increment: bool,
}

impl ColumnDefinition {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            size: None,
            default: None,
            auto_increment: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableMetaData {
    table: String,
    source_schema: String,
    target_schema: String,
    columns: Vec<ColumnDefinition>,
    primary_keys: Vec<String>,
    extra_predicates: Vec<String>,
}

impl TableMetaData {
    pub fn new(
        source_schema: &str,
        target_schema: &str,
        table: &str,
        columns: Vec<ColumnDefinition>,
        primary_keys: Vec<String>,
        extra_predicates: Vec<String>,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(SyncError::Metadata {
                table: table.to_string(),
                message: "table has no columns".to_string(),
            });
        }
        if primary_keys.is_empty() {
            return Err(SyncError::Metadata {
                table: table.to_string(),
                message: "table has no primary key".to_string(),
            });
        }
        for key in primary_keys.iter().chain(extra_predicates.iter()) {
            if !columns.iter().any(|c| &c.name == key) {
                return Err(SyncError::Metadata {
                    table: table.to_string(),
                    message: format!("key column '{}' is not a table column", key),
                });
            }
        }
        Ok(Self {
            table: table.to_string(),
            source_schema: source_schema.to_string(),
            target_schema: target_schema.to_string(),
            columns,
            primary_keys,
            extra_predicates,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn non_primary_keys(&self) -> Vec<&ColumnDefinition> {
        self.columns
            .iter()
            .filter(|c| !self.primary_keys.contains(&c.name))
            .collect()
    }

    pub fn extra_predicates(&self) -> &[String] {
        &self.extra_predicates
    }

    /// Target table, schema-qualified.
    pub fn qualified_target(&self) -> String {
        format!("{}.{}", self.target_schema, self.table)
    }

    /// Trigger-fed journal table on the source schema.
    pub fn qualified_journal(&self) -> String {
        format!("{}.{}", self.source_schema, journal_table_name(&self.table))
    }

    /// Single-row watermark table on the target schema.
    pub fn qualified_sync_version(&self) -> String {
        format!(
            "{}.{}",
            self.target_schema,
            sync_version_table_name(&self.table)
        )
    }

    pub fn column_list(&self) -> String {
        self.columns.iter().map(|c| c.name.as_str()).join(", ")
    }

    pub fn placeholder_list(&self) -> String {
        (1..=self.columns.len()).map(|i| format!("${}", i)).join(", ")
    }

    /// `pk1 = $start AND pk2 = $start+1 ...`
    pub fn primary_key_filter(&self, start: usize) -> String {
        self.primary_keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{} = ${}", k, start + i))
            .join(" AND ")
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified_target(),
            self.column_list(),
            self.placeholder_list()
        )
    }

    pub fn select_by_key_sql(&self) -> String {
        format!(
            "SELECT 1 FROM {} WHERE {}",
            self.qualified_target(),
            self.primary_key_filter(1)
        )
    }

    pub fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            self.qualified_target(),
            self.primary_key_filter(1)
        )
    }

    /// Full non-primary-key column set keyed by primary key, with any
    /// extra predicate columns appended after the primary-key placeholders.
    pub fn update_sql(&self) -> String {
        let non_pk = self.non_primary_keys();
        let assignments = non_pk
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", c.name, i + 1))
            .join(", ");
        let mut filter = self.primary_key_filter(non_pk.len() + 1);
        let extra_start = non_pk.len() + self.primary_keys.len() + 1;
        for (i, col) in self.extra_predicates.iter().enumerate() {
            filter.push_str(&format!(" AND {} = ${}", col, extra_start + i));
        }
        format!(
            "UPDATE {} SET {} WHERE {}",
            self.qualified_target(),
            assignments,
            filter
        )
    }
}
