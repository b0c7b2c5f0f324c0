//! Derived identifier population
//!
//! The target schema adds a UUID column that the legacy schema never had.
//! Rows arriving without one get a freshly minted v4 UUID; rows that already
//! carry one keep it so replays stay stable.

use crate::error::Result;
use crate::journal::{FieldValue, JournalEntry, Operation};
use crate::transform::{TransformContext, Transformer};
use uuid::Uuid;

pub struct UuidDerivationTransformer;

impl Transformer for UuidDerivationTransformer {
    fn name(&self) -> &'static str {
        "uuid-derivation"
    }

    fn transform(
        &self,
        mut entries: Vec<JournalEntry>,
        context: &TransformContext,
    ) -> Result<Vec<JournalEntry>> {
        let column = match &context.table.uuid_column {
            Some(column) => column,
            None => return Ok(entries),
        };

        for entry in &mut entries {
            if entry.operation() == Operation::Delete {
                continue;
            }
            if entry.value(column).is_null() {
                entry.set_field(column, FieldValue::Uuid(Uuid::new_v4()));
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::{context, table_config};

    fn uuid_context() -> TransformContext {
        let mut table = table_config("app_user");
        table.uuid_column = Some("external_id".to_string());
        context(table)
    }

    #[test]
    fn test_mints_uuid_for_missing_column() {
        let ctx = uuid_context();
        let entry = JournalEntry::new(Operation::Insert, 1);

        let out = UuidDerivationTransformer.transform(vec![entry], &ctx).unwrap();
        assert!(matches!(out[0].value("external_id"), FieldValue::Uuid(_)));
    }

    #[test]
    fn test_existing_uuid_kept() {
        let ctx = uuid_context();
        let existing = Uuid::new_v4();
        let mut entry = JournalEntry::new(Operation::Update, 2);
        entry.set_field("external_id", FieldValue::Uuid(existing));

        let out = UuidDerivationTransformer.transform(vec![entry], &ctx).unwrap();
        assert_eq!(out[0].value("external_id"), &FieldValue::Uuid(existing));
    }

    #[test]
    fn test_deletes_skipped() {
        let ctx = uuid_context();
        let entry = JournalEntry::new(Operation::Delete, 3);

        let out = UuidDerivationTransformer.transform(vec![entry], &ctx).unwrap();
        assert!(out[0].value("external_id").is_null());
    }
}
