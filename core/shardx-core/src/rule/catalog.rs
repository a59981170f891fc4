//! Schema catalog — where unconfigured (single) tables live.
//!
//! Supplied by the caller from data source metadata; the router only reads it.

use crate::error::{ShardxError, ShardxResult};
use ahash::AHashMap;

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    // lower-cased table name → owning data source
    tables: AHashMap<String, String>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `table` lives in `data_source`.
    ///
    /// A table owned by two data sources is ambiguous and rejected.
    pub fn register(&mut self, table: &str, data_source: &str) -> ShardxResult<()> {
        let key = table.to_ascii_lowercase();
        match self.tables.get(&key) {
            Some(existing) if existing != data_source => Err(ShardxError::config(format!(
                "single table '{table}' exists in both '{existing}' and '{data_source}'"
            ))),
            _ => {
                self.tables.insert(key, data_source.to_string());
                Ok(())
            }
        }
    }

    pub fn with_table(mut self, table: &str, data_source: &str) -> ShardxResult<Self> {
        self.register(table, data_source)?;
        Ok(self)
    }

    pub fn find_data_source(&self, table: &str) -> Option<&str> {
        self.tables
            .get(&table.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
