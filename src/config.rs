//! Configuration loading
//!
//! Settings come from a JSON file plus environment overrides (loaded through
//! dotenv by the binary). Everything is validated eagerly at startup; a table
//! with a broken configuration never gets a pipeline.

use crate::error::{Result, SyncError};
use crate::version::ProductVersion;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const SOURCE_URL_ENV: &str = "SCHEMASYNC_SOURCE_URL";
pub const TARGET_URL_ENV: &str = "SCHEMASYNC_TARGET_URL";
pub const ENCRYPTION_KEY_ENV: &str = "SCHEMASYNC_ENCRYPTION_KEY";

/// Hash column derivation: `source` column's value, hashed, lands in `target`.
#[derive(Debug, Clone, Deserialize)]
pub struct HashedColumn {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub name: String,
    /// Ciphertext columns rewritten by the encryption migration stage.
    #[serde(default)]
    pub encrypted_columns: Vec<String>,
    /// Hash columns derived by the token hashing stage.
    #[serde(default)]
    pub hashed_columns: Vec<HashedColumn>,
    /// Column populated with a minted UUID when absent.
    #[serde(default)]
    pub uuid_column: Option<String>,
    /// Extra predicate columns appended to the update filter, e.g. the
    /// access/refresh token hashes on the OAuth token table.
    #[serde(default)]
    pub extra_predicates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub source_version: String,
    pub target_version: String,
    pub batch_size: i64,
    pub poll_interval_secs: u64,
    pub source_schema: String,
    pub target_schema: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub token_encryption_enabled: bool,
    #[serde(default)]
    pub token_hashing_enabled: bool,
    #[serde(default)]
    pub encryption_with_transformation: bool,
    pub tables: Vec<TableConfig>,
}

impl Configuration {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: Configuration = serde_json::from_str(&raw)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over file values for connection and key
    /// material, so deployments can keep secrets out of the config file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SOURCE_URL_ENV) {
            self.source_url = Some(url);
        }
        if let Ok(url) = std::env::var(TARGET_URL_ENV) {
            self.target_url = Some(url);
        }
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            self.encryption_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let source = ProductVersion::parse(&self.source_version)?;
        let target = ProductVersion::parse(&self.target_version)?;
        if source > target {
            return Err(SyncError::Configuration(format!(
                "source version {} is newer than target version {}",
                source, target
            )));
        }
        if self.batch_size < 1 {
            return Err(SyncError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(SyncError::Configuration(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.source_schema.is_empty() || self.target_schema.is_empty() {
            return Err(SyncError::Configuration(
                "source_schema and target_schema are mandatory".to_string(),
            ));
        }
        if self.source_url.is_none() {
            return Err(SyncError::Configuration(format!(
                "source database URL missing (set source_url or {})",
                SOURCE_URL_ENV
            )));
        }
        if self.target_url.is_none() {
            return Err(SyncError::Configuration(format!(
                "target database URL missing (set target_url or {})",
                TARGET_URL_ENV
            )));
        }
        if self.tables.is_empty() {
            return Err(SyncError::Configuration(
                "no tables configured for sync".to_string(),
            ));
        }
        for table in &self.tables {
            if table.name.is_empty() {
                return Err(SyncError::Configuration(
                    "table entry with empty name".to_string(),
                ));
            }
        }
        let needs_key = self.token_encryption_enabled || self.encryption_with_transformation;
        if needs_key && self.encryption_key.is_none() {
            return Err(SyncError::Configuration(format!(
                "encryption enabled but no key configured (set encryption_key or {})",
                ENCRYPTION_KEY_ENV
            )));
        }
        Ok(())
    }

    pub fn source_version(&self) -> Result<ProductVersion> {
        ProductVersion::parse(&self.source_version)
    }

    pub fn target_version(&self) -> Result<ProductVersion> {
        ProductVersion::parse(&self.target_version)
    }

    /// Per-table snapshot of the run settings, built once at startup.
    pub fn pipeline_configuration(&self, table: &TableConfig) -> Result<PipelineConfiguration> {
        Ok(PipelineConfiguration {
            table: table.clone(),
            source_version: self.source_version()?,
            target_version: self.target_version()?,
            batch_size: self.batch_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            source_schema: self.source_schema.clone(),
            target_schema: self.target_schema.clone(),
        })
    }
}

/// Immutable per-run settings for one table's pipeline. Built once at service
/// startup and shared read-only with every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfiguration {
    pub table: TableConfig,
    pub source_version: ProductVersion,
    pub target_version: ProductVersion,
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub source_schema: String,
    pub target_schema: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Configuration {
        Configuration {
            source_version: "5.3.0".to_string(),
            target_version: "5.9.0".to_string(),
            batch_size: 100,
            poll_interval_secs: 5,
            source_schema: "idm".to_string(),
            target_schema: "idm_v2".to_string(),
            source_url: Some("postgres://localhost/src".to_string()),
            target_url: Some("postgres://localhost/tgt".to_string()),
            encryption_key: None,
            token_encryption_enabled: false,
            token_hashing_enabled: false,
            encryption_with_transformation: false,
            tables: vec![TableConfig {
                name: "oauth_token".to_string(),
                encrypted_columns: vec![],
                hashed_columns: vec![],
                uuid_column: None,
                extra_predicates: vec![],
            }],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_versions() {
        let mut config = base_config();
        config.source_version = "5.9.0".to_string();
        config.target_version = "5.3.0".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let mut config = base_config();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_url() {
        let mut config = base_config();
        config.target_url = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encryption_requires_key() {
        let mut config = base_config();
        config.encryption_with_transformation = true;
        assert!(config.validate().is_err());
        config.encryption_key = Some("ab".repeat(32));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_table_list() {
        let mut config = base_config();
        config.tables.clear();
        assert!(config.validate().is_err());
    }
}
