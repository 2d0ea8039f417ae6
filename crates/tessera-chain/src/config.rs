//! Chain configuration.
//!
//! Loaded from TOML; every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```toml
//! seal_retry_limit = 3
//! max_field_len = 512
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use tessera_contracts::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    /// How many times a seal that lost a race re-reads the head and tries
    /// again before surfacing `SealConflict`.
    pub seal_retry_limit: u32,

    /// Upper bound, in bytes, for every string field of an entry.
    pub max_field_len: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            seal_retry_limit: 3,
            max_field_len: 512,
        }
    }
}

impl ChainConfig {
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse chain config TOML: {}", e),
        })?;
        if config.max_field_len == 0 {
            return Err(LedgerError::Config {
                reason: "max_field_len must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read chain config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
