//! Generated key allocation.
//!
//! [`KeyGenerator`] is the closed set of key algorithms (`SNOWFLAKE`, `UUID`,
//! `INCREMENT`). [`GeneratedKey`] carries the values allocated for one INSERT:
//! value `i` belongs to inserted row `i`, so the rewrite consumes them by row
//! position regardless of which route unit a row lands in.

pub mod snowflake;

use crate::config::AlgorithmConfiguration;
use crate::error::{ShardxError, ShardxResult};
use crate::value::ScalarValue;
use parking_lot::Mutex;
use rand::RngCore;
use snowflake::{DEFAULT_MAX_TOLERATE_MILLIS, DEFAULT_MAX_VIBRATION_OFFSET, SnowflakeKeyGenerator};
use std::collections::VecDeque;
use std::fmt::Write as _;

pub use snowflake::Clock;

#[derive(Debug)]
pub struct IncrementKeyGenerator {
    next: Mutex<i64>,
    max_value: i64,
}

impl IncrementKeyGenerator {
    pub fn new(initial_value: i64, max_value: i64) -> ShardxResult<Self> {
        if initial_value > max_value {
            return Err(ShardxError::config(format!(
                "increment initial-value {initial_value} exceeds max-value {max_value}"
            )));
        }
        Ok(Self {
            next: Mutex::new(initial_value),
            max_value,
        })
    }

    /// Reserve `count` consecutive values, or none at all.
    fn reserve(&self, count: usize) -> ShardxResult<Vec<i64>> {
        let mut next = self.next.lock();
        let start = *next;
        let remaining = self.max_value.saturating_sub(start).saturating_add(1).max(0);
        if (count as i64) > remaining {
            return Err(ShardxError::KeyGeneration(format!(
                "increment range exhausted: {count} keys requested, {remaining} left"
            )));
        }
        let end = start.saturating_add(count as i64);
        *next = end;
        Ok((start..end).collect())
    }
}

#[derive(Debug)]
pub enum KeyGenerator {
    Snowflake(SnowflakeKeyGenerator),
    Uuid,
    Increment(IncrementKeyGenerator),
}

fn int_prop(name: &str, config: &AlgorithmConfiguration, key: &str, default: i64) -> ShardxResult<i64> {
    match config.props.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ShardxError::config(format!(
                "key generator '{name}': property '{key}' expects an integer, got '{raw}'"
            ))
        }),
    }
}

impl KeyGenerator {
    pub fn from_config(name: &str, config: &AlgorithmConfiguration) -> ShardxResult<Self> {
        match config.kind.to_ascii_uppercase().as_str() {
            "SNOWFLAKE" => Ok(Self::Snowflake(SnowflakeKeyGenerator::new(
                int_prop(name, config, "worker-id", 0)?,
                int_prop(
                    name,
                    config,
                    "max-tolerate-time-difference-milliseconds",
                    DEFAULT_MAX_TOLERATE_MILLIS,
                )?,
                int_prop(name, config, "max-vibration-offset", DEFAULT_MAX_VIBRATION_OFFSET)?,
            )?)),
            "UUID" => Ok(Self::Uuid),
            "INCREMENT" => Ok(Self::Increment(IncrementKeyGenerator::new(
                int_prop(name, config, "initial-value", 1)?,
                int_prop(name, config, "max-value", i64::MAX)?,
            )?)),
            _ => Err(ShardxError::UnknownAlgorithm {
                kind: config.kind.clone(),
            }),
        }
    }

    /// Produce exactly `count` keys, front-to-back in row order.
    pub fn generate(&self, count: usize) -> ShardxResult<VecDeque<ScalarValue>> {
        match self {
            KeyGenerator::Snowflake(generator) => (0..count)
                .map(|_| generator.next_key().map(ScalarValue::Int64))
                .collect(),
            KeyGenerator::Uuid => Ok((0..count).map(|_| ScalarValue::Utf8(random_uuid())).collect()),
            KeyGenerator::Increment(generator) => Ok(generator
                .reserve(count)?
                .into_iter()
                .map(ScalarValue::Int64)
                .collect()),
        }
    }
}

/// Hyphen-free random (version 4) UUID.
fn random_uuid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    bytes.iter().fold(String::with_capacity(32), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Keys allocated for one INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKey {
    pub column: String,
    /// Whether the column was added by the rewrite (absent from the INSERT)
    pub generated: bool,
    pub values: VecDeque<ScalarValue>,
}

impl GeneratedKey {
    /// Value for inserted row `row`.
    pub fn value_for_row(&self, row: usize) -> Option<&ScalarValue> {
        self.values.get(row)
    }
}

/// Allocate one key per row, failing atomically.
pub fn allocate(generator: &KeyGenerator, column: &str, row_count: usize) -> ShardxResult<GeneratedKey> {
    let values = generator.generate(row_count)?;
    if values.len() != row_count {
        return Err(ShardxError::KeyGeneration(format!(
            "expected {row_count} keys for column '{column}', got {}",
            values.len()
        )));
    }
    Ok(GeneratedKey {
        column: column.to_string(),
        generated: true,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_shape() {
        let keys = KeyGenerator::Uuid.generate(2).unwrap();
        let first = keys[0].as_str().unwrap();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(&first[12..13], "4");
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn test_increment_exhaustion_is_atomic() {
        let generator = KeyGenerator::from_config(
            "seq",
            &AlgorithmConfiguration::new("INCREMENT")
                .with_prop("initial-value", "8")
                .with_prop("max-value", "10"),
        )
        .unwrap();
        let err = generator.generate(4).unwrap_err();
        assert!(matches!(err, ShardxError::KeyGeneration(_)));
        // nothing consumed by the failed request
        let keys = generator.generate(3).unwrap();
        assert_eq!(
            Vec::from(keys),
            vec![ScalarValue::Int64(8), ScalarValue::Int64(9), ScalarValue::Int64(10)]
        );
        assert!(generator.generate(1).is_err());
    }

    #[test]
    fn test_allocate_one_key_per_row() {
        let generator = KeyGenerator::from_config(
            "snowflake",
            &AlgorithmConfiguration::new("snowflake").with_prop("worker-id", "7"),
        )
        .unwrap();
        let key = allocate(&generator, "order_id", 3).unwrap();
        assert_eq!(key.values.len(), 3);
        let ids: Vec<i64> = key.values.iter().map(|v| v.as_i64().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(snowflake::decompose(ids[0]).1, 7);
        assert!(key.value_for_row(2).is_some());
        assert!(key.value_for_row(3).is_none());
    }

    #[test]
    fn test_unknown_generator() {
        let err = KeyGenerator::from_config("x", &AlgorithmConfiguration::new("LEAF")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bad_worker_id_prop() {
        let err = KeyGenerator::from_config(
            "x",
            &AlgorithmConfiguration::new("SNOWFLAKE").with_prop("worker-id", "abc"),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
