//! Transformer registry
//!
//! Explicit mapping from (table name, version ordinal) to a transformer
//! factory, built at startup by registration calls. Resolution picks every
//! factory whose ordinal falls inside the source..target bracket, sorted
//! ascending, so an encryption-format rewrite for 5.5.0 always runs before a
//! re-hash for 5.8.0.

use crate::config::Configuration;
use crate::transform::derive::UuidDerivationTransformer;
use crate::transform::encryption::EncryptionMigrationTransformer;
use crate::transform::hashing::TokenHashTransformer;
use crate::transform::{Transformer, TransformerChain};
use crate::version::{in_version_bracket, ProductVersion};
use std::sync::Arc;
use tracing::info;

/// Release ordinals at which the stock transformers take effect.
pub const UUID_DERIVATION_ORDINAL: u32 = 3;
pub const ENCRYPTION_MIGRATION_ORDINAL: u32 = 5;
pub const TOKEN_HASH_ORDINAL: u32 = 8;

type TransformerFactory = Box<dyn Fn() -> Arc<dyn Transformer> + Send + Sync>;

struct Registration {
    table: String,
    ordinal: u32,
    factory: TransformerFactory,
}

#[derive(Default)]
pub struct TransformerRegistry {
    registrations: Vec<Registration>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    pub fn register<F>(&mut self, table: &str, ordinal: u32, factory: F)
    where
        F: Fn() -> Arc<dyn Transformer> + Send + Sync + 'static,
    {
        self.registrations.push(Registration {
            table: table.to_string(),
            ordinal,
            factory: Box::new(factory),
        });
    }

    /// Registry with the stock transformers for every configured table.
    pub fn with_defaults(config: &Configuration) -> Self {
        let mut registry = Self::new();
        for table in &config.tables {
            if table.uuid_column.is_some() {
                registry.register(&table.name, UUID_DERIVATION_ORDINAL, || {
                    Arc::new(UuidDerivationTransformer)
                });
            }
            if !table.encrypted_columns.is_empty() {
                registry.register(&table.name, ENCRYPTION_MIGRATION_ORDINAL, || {
                    Arc::new(EncryptionMigrationTransformer)
                });
            }
            if !table.hashed_columns.is_empty() {
                registry.register(&table.name, TOKEN_HASH_ORDINAL, || {
                    Arc::new(TokenHashTransformer)
                });
            }
        }
        registry
    }

    /// Ordered transformer chain for one table's sync bracket. Falls back to
    /// pass-through when nothing matches.
    pub fn resolve(
        &self,
        table: &str,
        source: ProductVersion,
        target: ProductVersion,
    ) -> TransformerChain {
        let mut selected: Vec<(u32, Arc<dyn Transformer>)> = self
            .registrations
            .iter()
            .filter(|r| r.table == table && in_version_bracket(source, target, r.ordinal))
            .map(|r| (r.ordinal, (r.factory)()))
            .collect();
        selected.sort_by_key(|(ordinal, _)| *ordinal);

        if selected.is_empty() {
            info!(table, %source, %target, "no transformers in bracket, using pass-through");
            return TransformerChain::pass_through();
        }

        let stages: Vec<Arc<dyn Transformer>> =
            selected.into_iter().map(|(_, stage)| stage).collect();
        info!(
            table,
            %source,
            %target,
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "resolved transformer chain"
        );
        TransformerChain::new(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::PassThroughTransformer;

    fn named(name: &'static str) -> impl Fn() -> Arc<dyn Transformer> + Send + Sync {
        struct Named(&'static str);
        impl Transformer for Named {
            fn name(&self) -> &'static str {
                self.0
            }
            fn transform(
                &self,
                entries: Vec<crate::journal::JournalEntry>,
                _context: &crate::transform::TransformContext,
            ) -> crate::error::Result<Vec<crate::journal::JournalEntry>> {
                Ok(entries)
            }
        }
        move || Arc::new(Named(name)) as Arc<dyn Transformer>
    }

    fn registry_with_ordinals() -> TransformerRegistry {
        let mut registry = TransformerRegistry::new();
        // Registered out of order on purpose
        registry.register("t", 8, named("at-8"));
        registry.register("t", 5, named("at-5"));
        registry.register("t", 7, named("at-7"));
        registry.register("other", 6, named("other-6"));
        registry
    }

    #[test]
    fn test_bracket_selection_and_ordering() {
        let registry = registry_with_ordinals();
        let chain = registry.resolve(
            "t",
            ProductVersion::from_ordinal(3),
            ProductVersion::from_ordinal(7),
        );
        assert_eq!(chain.stage_names(), vec!["at-5", "at-7"]);
    }

    #[test]
    fn test_empty_bracket_falls_back_to_pass_through() {
        let registry = registry_with_ordinals();
        let chain = registry.resolve(
            "t",
            ProductVersion::from_ordinal(3),
            ProductVersion::from_ordinal(4),
        );
        assert_eq!(chain.stage_names(), vec![PassThroughTransformer.name()]);
    }

    #[test]
    fn test_other_tables_do_not_leak() {
        let registry = registry_with_ordinals();
        let chain = registry.resolve(
            "other",
            ProductVersion::from_ordinal(0),
            ProductVersion::from_ordinal(11),
        );
        assert_eq!(chain.stage_names(), vec!["other-6"]);
    }

    #[test]
    fn test_full_bracket_selects_all() {
        let registry = registry_with_ordinals();
        let chain = registry.resolve(
            "t",
            ProductVersion::from_ordinal(5),
            ProductVersion::from_ordinal(8),
        );
        assert_eq!(chain.stage_names(), vec!["at-5", "at-7", "at-8"]);
    }
}
