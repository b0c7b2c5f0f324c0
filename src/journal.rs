//! Journal entry model
//!
//! One `JournalEntry` represents one row change captured by the database
//! triggers on a source table. Entries are materialized from the journal
//! table by the batch processor, rewritten in place by the transformer chain
//! and consumed by the persistor. The entry itself is never persisted; only
//! its effect on the target table is.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Column name of the auto-increment sync identifier in the journal table.
pub const SYNC_ID_COLUMN: &str = "sync_id";
/// Column name of the action tag in the journal table.
pub const ACTION_COLUMN: &str = "action";

/// Journal table companion of a synced table.
pub fn journal_table_name(table: &str) -> String {
    format!("{}_s", table)
}

/// Sync-version (watermark) table companion of a synced table.
pub fn sync_version_table_name(table: &str) -> String {
    format!("{}_sv", table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn from_action(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "insert" | "i" => Ok(Operation::Insert),
            "update" | "u" => Ok(Operation::Update),
            "delete" | "d" => Ok(Operation::Delete),
            other => Err(SyncError::Transform(format!(
                "unknown journal action tag '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Typed, nullable column value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// A column value together with the column that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryField {
    pub column: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone)]
pub struct JournalEntry {
    fields: HashMap<String, EntryField>,
    operation: Operation,
    sync_id: i64,
}

impl JournalEntry {
    pub fn new(operation: Operation, sync_id: i64) -> Self {
        let mut entry = Self {
            fields: HashMap::new(),
            operation,
            sync_id,
        };
        entry.set_field(SYNC_ID_COLUMN, FieldValue::Int(sync_id));
        entry.set_field(ACTION_COLUMN, FieldValue::Text(operation.as_str().to_string()));
        entry
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn sync_id(&self) -> i64 {
        self.sync_id
    }

    pub fn set_field(&mut self, column: &str, value: FieldValue) {
        self.fields.insert(
            column.to_string(),
            EntryField {
                column: column.to_string(),
                value,
            },
        );
    }

    pub fn field(&self, column: &str) -> Option<&EntryField> {
        self.fields.get(column)
    }

    /// Value of `column`; a missing field reads as null.
    pub fn value(&self, column: &str) -> &FieldValue {
        self.fields
            .get(column)
            .map(|f| &f.value)
            .unwrap_or(&FieldValue::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_tag_parsing() {
        assert_eq!(Operation::from_action("insert").unwrap(), Operation::Insert);
        assert_eq!(Operation::from_action("UPDATE").unwrap(), Operation::Update);
        assert_eq!(Operation::from_action("d").unwrap(), Operation::Delete);
        assert!(Operation::from_action("truncate").is_err());
    }

    #[test]
    fn test_missing_field_reads_as_null() {
        let entry = JournalEntry::new(Operation::Insert, 7);
        assert!(entry.value("no_such_column").is_null());
    }

    #[test]
    fn test_entry_carries_sync_id_and_action_fields() {
        let entry = JournalEntry::new(Operation::Delete, 42);
        assert_eq!(entry.value(SYNC_ID_COLUMN).as_int(), Some(42));
        assert_eq!(entry.value(ACTION_COLUMN).as_text(), Some("delete"));
    }

    #[test]
    fn test_set_field_replaces() {
        let mut entry = JournalEntry::new(Operation::Update, 1);
        entry.set_field("token", FieldValue::Text("old".into()));
        entry.set_field("token", FieldValue::Text("new".into()));
        assert_eq!(entry.value("token").as_text(), Some("new"));
    }

    #[test]
    fn test_companion_table_names() {
        assert_eq!(journal_table_name("oauth_token"), "oauth_token_s");
        assert_eq!(sync_version_table_name("oauth_token"), "oauth_token_sv");
    }
}
