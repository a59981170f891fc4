//! Sharding strategies.
//!
//! A strategy binds an algorithm to the column(s) it reads. Every variant
//! answers the same question: given candidate names and the condition values
//! that apply to this table, which candidates remain? Missing values never
//! fail; they fall back to every candidate.

use crate::config::StrategyConfiguration;
use crate::error::{ShardxError, ShardxResult};
use crate::route::condition::{ConditionValue, ShardingConditionValue};
use crate::rule::algorithm::{
    ComplexAlgorithm, HintAlgorithm, ShardingAlgorithm, StandardAlgorithm,
};
use crate::rule::inline::InlineExpression;
use crate::value::ScalarValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ShardingStrategy {
    Standard {
        column: String,
        algorithm: StandardAlgorithm,
    },
    Complex {
        columns: Vec<String>,
        algorithm: ComplexAlgorithm,
    },
    Hint {
        algorithm: HintAlgorithm,
    },
    Inline {
        column: String,
        expression: InlineExpression,
    },
    None,
}

fn push_unique(result: &mut Vec<String>, target: String) {
    if !result.contains(&target) {
        result.push(target);
    }
}

impl ShardingStrategy {
    /// Resolve a strategy configuration against the named algorithms.
    pub fn from_config(
        config: &StrategyConfiguration,
        algorithms: &BTreeMap<String, ShardingAlgorithm>,
    ) -> ShardxResult<Self> {
        let lookup = |name: &str| {
            algorithms.get(name).ok_or_else(|| {
                ShardxError::config(format!("sharding algorithm '{name}' is not defined"))
            })
        };
        let require_column = |column: &str| {
            if column.trim().is_empty() {
                Err(ShardxError::config("sharding column must not be empty"))
            } else {
                Ok(column.trim().to_string())
            }
        };
        match config {
            StrategyConfiguration::Standard {
                sharding_column,
                algorithm,
            } => match lookup(algorithm)? {
                ShardingAlgorithm::Standard(a) => Ok(Self::Standard {
                    column: require_column(sharding_column)?,
                    algorithm: a.clone(),
                }),
                _ => Err(ShardxError::config(format!(
                    "algorithm '{algorithm}' cannot back a standard strategy"
                ))),
            },
            StrategyConfiguration::Complex {
                sharding_columns,
                algorithm,
            } => match lookup(algorithm)? {
                ShardingAlgorithm::Complex(a) => {
                    let columns = sharding_columns
                        .split(',')
                        .map(require_column)
                        .collect::<ShardxResult<Vec<_>>>()?;
                    Ok(Self::Complex {
                        columns,
                        algorithm: a.clone(),
                    })
                }
                _ => Err(ShardxError::config(format!(
                    "algorithm '{algorithm}' cannot back a complex strategy"
                ))),
            },
            StrategyConfiguration::Hint { algorithm } => match lookup(algorithm)? {
                ShardingAlgorithm::Hint(a) => Ok(Self::Hint {
                    algorithm: a.clone(),
                }),
                _ => Err(ShardxError::config(format!(
                    "algorithm '{algorithm}' cannot back a hint strategy"
                ))),
            },
            StrategyConfiguration::Inline {
                sharding_column,
                algorithm_expression,
            } => Ok(Self::Inline {
                column: require_column(sharding_column)?,
                expression: InlineExpression::parse(algorithm_expression)?,
            }),
            StrategyConfiguration::None => Ok(Self::None),
        }
    }

    /// Columns whose condition values this strategy consumes.
    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            Self::Standard { column, .. } | Self::Inline { column, .. } => vec![column.as_str()],
            Self::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            Self::Hint { .. } | Self::None => Vec::new(),
        }
    }

    pub fn is_hint(&self) -> bool {
        matches!(self, Self::Hint { .. })
    }

    /// Narrow `available` using the condition values for one table.
    ///
    /// `hints` is only read by the hint strategy; an empty hint list routes
    /// to every candidate.
    pub fn shard(
        &self,
        available: &[String],
        values: &[&ShardingConditionValue],
        hints: &[ScalarValue],
    ) -> ShardxResult<Vec<String>> {
        let find = |column: &str| {
            values
                .iter()
                .find(|v| v.column.eq_ignore_ascii_case(column))
                .copied()
        };
        match self {
            Self::None => Ok(available.to_vec()),
            Self::Hint { algorithm } => {
                if hints.is_empty() {
                    Ok(available.to_vec())
                } else {
                    algorithm.do_sharding(available, hints)
                }
            }
            Self::Standard { column, algorithm } => {
                let Some(condition) = find(column) else {
                    return Ok(available.to_vec());
                };
                match &condition.value {
                    ConditionValue::List(list) => {
                        let mut result = Vec::new();
                        for value in list {
                            if let Some(target) = algorithm.do_sharding(available, column, value)? {
                                push_unique(&mut result, target);
                            }
                        }
                        Ok(result)
                    }
                    ConditionValue::Range(range) => Ok(algorithm.do_range_sharding(available, range)),
                }
            }
            Self::Inline { column, expression } => {
                let Some(condition) = find(column) else {
                    return Ok(available.to_vec());
                };
                match &condition.value {
                    ConditionValue::List(list) => {
                        let mut result = Vec::new();
                        for value in list {
                            let target = expression.evaluate(|name| {
                                name.eq_ignore_ascii_case(column).then(|| value.clone())
                            })?;
                            if let Some(found) =
                                available.iter().find(|a| a.eq_ignore_ascii_case(&target))
                            {
                                push_unique(&mut result, found.clone());
                            }
                        }
                        Ok(result)
                    }
                    // inline expressions cannot be inverted over a range
                    ConditionValue::Range(_) => Ok(available.to_vec()),
                }
            }
            Self::Complex { columns, algorithm } => {
                let mut lists: Vec<(String, Vec<ScalarValue>)> = Vec::new();
                for column in columns {
                    if let Some(ShardingConditionValue {
                        value: ConditionValue::List(list),
                        ..
                    }) = find(column)
                    {
                        lists.push((column.clone(), list.clone()));
                    }
                }
                Ok(algorithm
                    .do_sharding(available, &lists)?
                    .unwrap_or_else(|| available.to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmConfiguration;
    use crate::rule::algorithm::RangeValue;

    fn candidates(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn eq(column: &str, values: &[i64]) -> ShardingConditionValue {
        ShardingConditionValue::list(
            "t_order",
            column,
            values.iter().map(|v| ScalarValue::Int64(*v)).collect(),
        )
    }

    fn algorithms() -> BTreeMap<String, ShardingAlgorithm> {
        let mut map = BTreeMap::new();
        map.insert(
            "mod4".to_string(),
            ShardingAlgorithm::from_config(
                "mod4",
                &AlgorithmConfiguration::new("MOD").with_prop("sharding-count", "4"),
            )
            .unwrap(),
        );
        map.insert(
            "hint".to_string(),
            ShardingAlgorithm::from_config(
                "hint",
                &AlgorithmConfiguration::new("HINT_INLINE")
                    .with_prop("algorithm-expression", "t_${value}"),
            )
            .unwrap(),
        );
        map
    }

    #[test]
    fn test_standard_in_dedup_preserves_first_occurrence() {
        let strategy = ShardingStrategy::from_config(
            &StrategyConfiguration::Standard {
                sharding_column: "order_id".to_string(),
                algorithm: "mod4".to_string(),
            },
            &algorithms(),
        )
        .unwrap();
        let condition = eq("order_id", &[7, 3, 4, 11]);
        let result = strategy
            .shard(&candidates("t_", 4), &[&condition], &[])
            .unwrap();
        assert_eq!(result, vec!["t_3", "t_0"]);
    }

    #[test]
    fn test_missing_condition_falls_back_to_all() {
        let strategy = ShardingStrategy::Inline {
            column: "user_id".to_string(),
            expression: InlineExpression::parse("ds_${user_id % 2}").unwrap(),
        };
        let other = eq("order_id", &[1]);
        let result = strategy.shard(&candidates("ds_", 2), &[&other], &[]).unwrap();
        assert_eq!(result, candidates("ds_", 2));
    }

    #[test]
    fn test_inline_column_match_is_case_insensitive() {
        let strategy = ShardingStrategy::Inline {
            column: "user_id".to_string(),
            expression: InlineExpression::parse("ds_${user_id % 2}").unwrap(),
        };
        let condition = eq("USER_ID", &[3]);
        let result = strategy.shard(&candidates("ds_", 2), &[&condition], &[]).unwrap();
        assert_eq!(result, vec!["ds_1"]);
    }

    #[test]
    fn test_range_on_standard() {
        let strategy = ShardingStrategy::from_config(
            &StrategyConfiguration::Standard {
                sharding_column: "order_id".to_string(),
                algorithm: "mod4".to_string(),
            },
            &algorithms(),
        )
        .unwrap();
        let condition =
            ShardingConditionValue::range("t_order", "order_id", RangeValue::closed(1, 2));
        let result = strategy
            .shard(&candidates("t_", 4), &[&condition], &[])
            .unwrap();
        assert_eq!(result, vec!["t_1", "t_2"]);
    }

    #[test]
    fn test_hint_ignores_statement_conditions() {
        let strategy = ShardingStrategy::from_config(
            &StrategyConfiguration::Hint {
                algorithm: "hint".to_string(),
            },
            &algorithms(),
        )
        .unwrap();
        let condition = eq("order_id", &[1]);
        assert_eq!(
            strategy
                .shard(&candidates("t_", 4), &[&condition], &[ScalarValue::Int64(2)])
                .unwrap(),
            vec!["t_2"]
        );
        assert_eq!(
            strategy.shard(&candidates("t_", 4), &[&condition], &[]).unwrap(),
            candidates("t_", 4)
        );
    }

    #[test]
    fn test_algorithm_kind_mismatch() {
        let err = ShardingStrategy::from_config(
            &StrategyConfiguration::Standard {
                sharding_column: "order_id".to_string(),
                algorithm: "hint".to_string(),
            },
            &algorithms(),
        )
        .unwrap_err();
        assert!(err.is_configuration());

        let err = ShardingStrategy::from_config(
            &StrategyConfiguration::Standard {
                sharding_column: "order_id".to_string(),
                algorithm: "missing".to_string(),
            },
            &algorithms(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
