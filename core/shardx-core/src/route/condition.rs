//! Sharding conditions extracted from the predicate tree.
//!
//! [`ShardingConditions`] is an OR of [`ShardingCondition`] branches; each
//! branch is an AND of column values. Values for the same column inside one
//! branch are intersected before routing. Branches are never merged with one
//! another: the route is the union of each branch's candidates.

use crate::rule::algorithm::RangeValue;
use crate::value::ScalarValue;
use std::ops::Bound;

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// EQ or IN
    List(Vec<ScalarValue>),
    /// BETWEEN, `<`, `<=`, `>`, `>=`
    Range(RangeValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardingConditionValue {
    pub table: String,
    pub column: String,
    pub value: ConditionValue,
}

impl ShardingConditionValue {
    pub fn list(table: &str, column: &str, values: Vec<ScalarValue>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: ConditionValue::List(values),
        }
    }

    pub fn eq(table: &str, column: &str, value: impl Into<ScalarValue>) -> Self {
        Self::list(table, column, vec![value.into()])
    }

    pub fn range(table: &str, column: &str, range: RangeValue) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: ConditionValue::Range(range),
        }
    }

    pub fn between(
        table: &str,
        column: &str,
        lower: impl Into<ScalarValue>,
        upper: impl Into<ScalarValue>,
    ) -> Self {
        Self::range(table, column, RangeValue::closed(lower, upper))
    }

    fn same_target(&self, other: &Self) -> bool {
        self.table.eq_ignore_ascii_case(&other.table)
            && self.column.eq_ignore_ascii_case(&other.column)
    }

    /// AND of two values on the same column; `None` when nothing satisfies both.
    fn intersect(&self, other: &Self) -> Option<Self> {
        let value = match (&self.value, &other.value) {
            (ConditionValue::List(a), ConditionValue::List(b)) => {
                let kept: Vec<ScalarValue> = a
                    .iter()
                    .filter(|x| b.iter().any(|y| x.compare(y).is_eq()))
                    .cloned()
                    .collect();
                ConditionValue::List(kept)
            }
            (ConditionValue::List(list), ConditionValue::Range(range))
            | (ConditionValue::Range(range), ConditionValue::List(list)) => ConditionValue::List(
                list.iter().filter(|v| range.contains(v)).cloned().collect(),
            ),
            (ConditionValue::Range(a), ConditionValue::Range(b)) => {
                ConditionValue::Range(a.intersect(b))
            }
        };
        let empty = match &value {
            ConditionValue::List(list) => list.is_empty(),
            ConditionValue::Range(range) => range.is_empty(),
        };
        (!empty).then(|| Self {
            table: self.table.clone(),
            column: self.column.clone(),
            value,
        })
    }
}

/// One AND branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
}

impl ShardingCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, value: ShardingConditionValue) -> Self {
        self.values.push(value);
        self
    }

    pub fn push(&mut self, value: ShardingConditionValue) {
        self.values.push(value);
    }

    /// Values that apply to `table`.
    pub fn values_for(&self, table: &str) -> Vec<&ShardingConditionValue> {
        self.values
            .iter()
            .filter(|v| v.table.eq_ignore_ascii_case(table))
            .collect()
    }

    /// Intersect values on the same column. `None` means the branch can never
    /// be true.
    pub fn merged(&self) -> Option<ShardingCondition> {
        let mut merged: Vec<ShardingConditionValue> = Vec::with_capacity(self.values.len());
        for value in &self.values {
            match merged.iter_mut().find(|m| m.same_target(value)) {
                Some(existing) => *existing = existing.intersect(value)?,
                None => {
                    // a lone empty IN list is as false as an empty intersection
                    if matches!(&value.value, ConditionValue::List(l) if l.is_empty()) {
                        return None;
                    }
                    if matches!(&value.value, ConditionValue::Range(r) if r.is_empty()) {
                        return None;
                    }
                    merged.push(value.clone());
                }
            }
        }
        Some(ShardingCondition { values: merged })
    }
}

/// OR of AND branches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    conditions: Vec<ShardingCondition>,
}

impl ShardingConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(condition: ShardingCondition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    pub fn with(mut self, condition: ShardingCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn push(&mut self, condition: ShardingCondition) {
        self.conditions.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[ShardingCondition] {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut Vec<ShardingCondition> {
        &mut self.conditions
    }

    /// Branches after AND-merging, always-false branches dropped.
    ///
    /// Returns `(branches, all_false)`. `all_false` is set when there was at
    /// least one branch and every branch was always-false.
    pub fn resolve(&self) -> (Vec<ShardingCondition>, bool) {
        let resolved: Vec<ShardingCondition> =
            self.conditions.iter().filter_map(ShardingCondition::merged).collect();
        let all_false = !self.conditions.is_empty() && resolved.is_empty();
        (resolved, all_false)
    }
}

/// `column > value`
pub fn greater_than(table: &str, column: &str, value: impl Into<ScalarValue>) -> ShardingConditionValue {
    ShardingConditionValue::range(
        table,
        column,
        RangeValue::new(Bound::Excluded(value.into()), Bound::Unbounded),
    )
}

/// `column < value`
pub fn less_than(table: &str, column: &str, value: impl Into<ScalarValue>) -> ShardingConditionValue {
    ShardingConditionValue::range(
        table,
        column,
        RangeValue::new(Bound::Unbounded, Bound::Excluded(value.into())),
    )
}
