//! Encryption format migration
//!
//! Rewrites the configured ciphertext columns from the legacy encryption
//! format to the current one: decrypt with the injected cipher (which accepts
//! both formats), re-encrypt, replace the field. Runs only when
//! encryption-with-transformation is enabled in the context snapshot.

use crate::error::{Result, SyncError};
use crate::journal::{FieldValue, JournalEntry, Operation};
use crate::transform::{TransformContext, Transformer};

pub struct EncryptionMigrationTransformer;

impl Transformer for EncryptionMigrationTransformer {
    fn name(&self) -> &'static str {
        "encryption-migration"
    }

    fn transform(
        &self,
        mut entries: Vec<JournalEntry>,
        context: &TransformContext,
    ) -> Result<Vec<JournalEntry>> {
        if !context.encryption_with_transformation {
            return Ok(entries);
        }

        for entry in &mut entries {
            // Deletes only need the primary key; nothing to re-encrypt.
            if entry.operation() == Operation::Delete {
                continue;
            }
            for column in &context.table.encrypted_columns {
                let ciphertext = match entry.value(column) {
                    FieldValue::Text(s) => s.clone(),
                    FieldValue::Null => continue,
                    other => {
                        return Err(SyncError::Transform(format!(
                            "encrypted column {} holds non-text value {:?}",
                            column, other
                        )))
                    }
                };
                let plaintext = context.cipher.decrypt(&ciphertext)?;
                let reencrypted = context.cipher.encrypt(&plaintext)?;
                entry.set_field(column, FieldValue::Text(reencrypted));
            }
        }
        Ok(entries)
    }
}
