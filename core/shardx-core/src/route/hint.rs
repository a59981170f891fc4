//! Out-of-band sharding values for hint strategies.

use crate::value::ScalarValue;
use ahash::AHashMap;

/// Hint values per logical table, passed explicitly with a route request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HintValues {
    database: AHashMap<String, Vec<ScalarValue>>,
    table: AHashMap<String, Vec<ScalarValue>>,
}

impl HintValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database_value(&mut self, logic_table: &str, value: impl Into<ScalarValue>) {
        self.database
            .entry(logic_table.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn add_table_value(&mut self, logic_table: &str, value: impl Into<ScalarValue>) {
        self.table
            .entry(logic_table.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn with_database_value(mut self, logic_table: &str, value: impl Into<ScalarValue>) -> Self {
        self.add_database_value(logic_table, value);
        self
    }

    pub fn with_table_value(mut self, logic_table: &str, value: impl Into<ScalarValue>) -> Self {
        self.add_table_value(logic_table, value);
        self
    }

    pub fn database_values(&self, logic_table: &str) -> &[ScalarValue] {
        self.database
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn table_values(&self, logic_table: &str) -> &[ScalarValue] {
        self.table
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.database.is_empty() && self.table.is_empty()
    }
}
