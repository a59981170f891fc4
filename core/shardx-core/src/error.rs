//! Error types for the ShardX routing pipeline.
//!
//! All public APIs return `ShardxResult<T>`; library code does not panic.
//! Variants are grouped the way failures surface: configuration problems are
//! caught while the rule is loaded, routing and rewrite problems before any
//! SQL reaches a data source, and stream problems while results are merged.

use thiserror::Error;

/// Unified error type for all ShardX operations.
#[derive(Debug, Error)]
pub enum ShardxError {
    // ===== Configuration (rule load time) =====
    /// Generic configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Algorithm type not part of the supported set
    #[error("unknown sharding algorithm type '{kind}'")]
    UnknownAlgorithm { kind: String },

    /// Binding tables do not line up ordinal by ordinal
    #[error("binding tables '{left}' and '{right}' are not aligned: {reason}")]
    BindingTableMismatch {
        left: String,
        right: String,
        reason: String,
    },

    /// Inline expression could not be parsed or evaluated
    #[error("inline expression error in '{expression}': {message}")]
    InlineExpression { expression: String, message: String },

    // ===== Routing =====
    /// Table is neither configured nor present in any data source
    #[error("table '{table}' cannot be routed: not found in any data source")]
    UnroutableTable { table: String },

    /// Routing produced no usable target
    #[error("routing failed: {0}")]
    RoutingFailed(String),

    /// Cross-group fan-out rejected by configuration
    #[error("cartesian route across [{}] is not allowed", .tables.join(", "))]
    UnsupportedCartesianRoute { tables: Vec<String> },

    /// Fan-out exceeds the configured cap
    #[error("route fan-out of {units} units exceeds the configured maximum of {limit}")]
    RoutingOverBroad { units: usize, limit: usize },

    // ===== Rewrite =====
    /// Two tokens touch the same source text
    #[error("overlapping SQL tokens: [{first_start}, {first_stop}) and [{second_start}, {second_stop})")]
    OverlappingTokens {
        first_start: usize,
        first_stop: usize,
        second_start: usize,
        second_stop: usize,
    },

    /// Token or parameter position lies outside the input
    #[error("parameter index {index} out of range ({count} parameters)")]
    InvalidParameterIndex { index: usize, count: usize },

    /// Token span lies outside the SQL text
    #[error("token span [{start}, {stop}) is outside SQL of length {len}")]
    TokenOutOfBounds {
        start: usize,
        stop: usize,
        len: usize,
    },

    // ===== Key generation =====
    /// Key generator could not produce a value
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    // ===== Merge =====
    /// Underlying row stream failed
    #[error("stream error from '{data_source}': {message}")]
    Stream {
        data_source: String,
        message: String,
    },

    /// Merged result used in an invalid state
    #[error("merge state error: {0}")]
    MergeState(String),

    /// Column index out of range for the current row
    #[error("column index {index} out of range ({count} columns)")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    // ===== Plumbing =====
    /// Invalid arguments
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Result type alias for all ShardX operations.
pub type ShardxResult<T> = Result<T, ShardxError>;

impl From<serde_json::Error> for ShardxError {
    fn from(err: serde_json::Error) -> Self {
        ShardxError::Serialization(err.to_string())
    }
}

impl ShardxError {
    /// Shorthand for configuration errors built from `format!` output.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        ShardxError::Configuration(message.into())
    }

    /// Whether the error was raised while loading the rule.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ShardxError::Configuration(_)
                | ShardxError::UnknownAlgorithm { .. }
                | ShardxError::BindingTableMismatch { .. }
                | ShardxError::InlineExpression { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unroutable_table() {
        let err = ShardxError::UnroutableTable {
            table: "t_missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "table 't_missing' cannot be routed: not found in any data source"
        );
    }

    #[test]
    fn error_display_cartesian() {
        let err = ShardxError::UnsupportedCartesianRoute {
            tables: vec!["t_order".to_string(), "t_user".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "cartesian route across [t_order, t_user] is not allowed"
        );
    }

    #[test]
    fn error_display_over_broad() {
        let err = ShardxError::RoutingOverBroad { units: 16, limit: 8 };
        assert!(err.to_string().contains("16 units"));
        assert!(err.to_string().contains("maximum of 8"));
    }

    #[test]
    fn error_display_overlapping_tokens() {
        let err = ShardxError::OverlappingTokens {
            first_start: 0,
            first_stop: 10,
            second_start: 5,
            second_stop: 12,
        };
        assert_eq!(
            err.to_string(),
            "overlapping SQL tokens: [0, 10) and [5, 12)"
        );
    }

    #[test]
    fn error_display_stream() {
        let err = ShardxError::Stream {
            data_source: "ds_1".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "stream error from 'ds_1': connection reset");
    }

    #[test]
    fn configuration_classification() {
        assert!(ShardxError::UnknownAlgorithm {
            kind: "FOO".to_string()
        }
        .is_configuration());
        assert!(ShardxError::config("bad").is_configuration());
        assert!(!ShardxError::RoutingFailed("x".to_string()).is_configuration());
    }

    #[test]
    fn serde_error_converts() {
        let err: ShardxError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, ShardxError::Serialization(_)));
    }
}
