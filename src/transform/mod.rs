//! Transformer chain
//!
//! A batch passes through an ordered list of version-scoped row rewrites
//! before persistence. Stage selection is resolved once per pipeline from the
//! registry; each stage sees the output of the one before it. Stages are pure
//! functions of (entries, context): every formerly-global toggle is a
//! snapshot in `TransformContext`, and crypto is an injected capability.

pub mod derive;
pub mod encryption;
pub mod hashing;
pub mod registry;

use crate::config::TableConfig;
use crate::crypto::CipherService;
use crate::error::Result;
use crate::journal::JournalEntry;
use std::sync::Arc;
use tracing::debug;

/// Per-pipeline snapshot handed to every stage. Built at pipeline
/// construction; stages never read live server configuration.
#[derive(Clone)]
pub struct TransformContext {
    pub table: TableConfig,
    pub token_encryption_enabled: bool,
    pub token_hashing_enabled: bool,
    pub encryption_with_transformation: bool,
    pub cipher: Arc<dyn CipherService>,
}

pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite the batch in place. Must not touch the source database and
    /// must tolerate missing fields (they read as null).
    fn transform(
        &self,
        entries: Vec<JournalEntry>,
        context: &TransformContext,
    ) -> Result<Vec<JournalEntry>>;
}

/// Default stage when no version-specific transformer matches.
pub struct PassThroughTransformer;

impl Transformer for PassThroughTransformer {
    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn transform(
        &self,
        entries: Vec<JournalEntry>,
        _context: &TransformContext,
    ) -> Result<Vec<JournalEntry>> {
        Ok(entries)
    }
}

pub struct TransformerChain {
    stages: Vec<Arc<dyn Transformer>>,
}

impl TransformerChain {
    pub fn new(stages: Vec<Arc<dyn Transformer>>) -> Self {
        Self { stages }
    }

    pub fn pass_through() -> Self {
        Self {
            stages: vec![Arc::new(PassThroughTransformer)],
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn transform(
        &self,
        mut entries: Vec<JournalEntry>,
        context: &TransformContext,
    ) -> Result<Vec<JournalEntry>> {
        for stage in &self.stages {
            debug!(stage = stage.name(), entries = entries.len(), "applying transformer");
            entries = stage.transform(entries, context)?;
        }
        Ok(entries)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::TableConfig;
    use crate::crypto::CipherService;
    use crate::error::{Result, SyncError};

    /// Prefix-swapping cipher with deterministic output, for asserting exact
    /// transformed values.
    pub struct PrefixCipher;

    impl CipherService for PrefixCipher {
        fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
            Ok(format!("cur:{}", String::from_utf8_lossy(plaintext)))
        }

        fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
            let stripped = ciphertext
                .strip_prefix("cur:")
                .or_else(|| ciphertext.strip_prefix("old:"))
                .ok_or_else(|| SyncError::Crypto(format!("bad ciphertext '{}'", ciphertext)))?;
            Ok(stripped.as_bytes().to_vec())
        }

        fn hash(&self, value: &[u8]) -> String {
            format!("#{}", String::from_utf8_lossy(value))
        }
    }

    pub fn table_config(name: &str) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            encrypted_columns: vec![],
            hashed_columns: vec![],
            uuid_column: None,
            extra_predicates: vec![],
        }
    }

    pub fn context(table: TableConfig) -> TransformContext {
        TransformContext {
            table,
            token_encryption_enabled: false,
            token_hashing_enabled: false,
            encryption_with_transformation: false,
            cipher: std::sync::Arc::new(PrefixCipher),
        }
    }
}
