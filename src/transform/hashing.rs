//! Token hash derivation
//!
//! Populates the hash columns introduced for token lookup: for each
//! configured (source, target) pair the source value is hashed and the digest
//! stored in the target column. When token encryption is on, the stored value
//! is ciphertext and is decrypted first so the digest is always over the
//! plaintext token.

use crate::error::{Result, SyncError};
use crate::journal::{FieldValue, JournalEntry, Operation};
use crate::transform::{TransformContext, Transformer};

pub struct TokenHashTransformer;

impl Transformer for TokenHashTransformer {
    fn name(&self) -> &'static str {
        "token-hash"
    }

    fn transform(
        &self,
        mut entries: Vec<JournalEntry>,
        context: &TransformContext,
    ) -> Result<Vec<JournalEntry>> {
        if !context.token_hashing_enabled {
            return Ok(entries);
        }

        for entry in &mut entries {
            if entry.operation() == Operation::Delete {
                continue;
            }
            for pair in &context.table.hashed_columns {
                let stored = match entry.value(&pair.source) {
                    FieldValue::Text(s) => s.clone(),
                    FieldValue::Null => continue,
                    other => {
                        return Err(SyncError::Transform(format!(
                            "hashed column {} holds non-text value {:?}",
                            pair.source, other
                        )))
                    }
                };
                let token = if context.token_encryption_enabled {
                    context.cipher.decrypt(&stored)?
                } else {
                    stored.into_bytes()
                };
                let digest = context.cipher.hash(&token);
                entry.set_field(&pair.target, FieldValue::Text(digest));
            }
        }
        Ok(entries)
    }
}
