//! Routing — logical statement to physical targets.
//!
//! [`RouteEngine`] is a pure function of the statement, its sharding
//! conditions and the immutable [`crate::rule::ShardingRule`]. The result is a
//! [`RouteContext`]: an ordered, de-duplicated list of [`RouteUnit`]s in which
//! every logical table of the statement is mapped to exactly one actual table.

pub mod condition;
pub mod engine;
pub mod hint;
mod standard;


pub use condition::{ConditionValue, ShardingCondition, ShardingConditionValue, ShardingConditions};
pub use engine::RouteEngine;
pub use hint::HintValues;

use smallvec::SmallVec;

/// Logical name paired with the physical name chosen for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: &str, actual_name: &str) -> Self {
        Self {
            logic_name: logic_name.to_string(),
            actual_name: actual_name.to_string(),
        }
    }
}

/// One physical execution target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteUnit {
    pub data_source: RouteMapper,
    // most statements touch one or two tables
    pub table_mappers: SmallVec<[RouteMapper; 2]>,
}

impl RouteUnit {
    pub fn new(data_source: &str) -> Self {
        Self {
            data_source: RouteMapper::new(data_source, data_source),
            table_mappers: SmallVec::new(),
        }
    }

    pub fn with_table(mut self, logic_name: &str, actual_name: &str) -> Self {
        self.add_table(logic_name, actual_name);
        self
    }

    /// Map `logic_name` unless it is already mapped.
    pub fn add_table(&mut self, logic_name: &str, actual_name: &str) {
        if self.actual_table(logic_name).is_none() {
            self.table_mappers.push(RouteMapper::new(logic_name, actual_name));
        }
    }

    pub fn data_source_name(&self) -> &str {
        &self.data_source.actual_name
    }

    /// Actual table chosen for `logic_name` in this unit.
    pub fn actual_table(&self, logic_name: &str) -> Option<&str> {
        self.table_mappers
            .iter()
            .find(|m| m.logic_name.eq_ignore_ascii_case(logic_name))
            .map(|m| m.actual_name.as_str())
    }
}

/// The routing result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteContext {
    units: Vec<RouteUnit>,
    // INSERT only: unit index of each inserted row; empty when rows are not split
    insert_row_units: Vec<usize>,
}

impl RouteContext {
    pub fn new(units: Vec<RouteUnit>) -> Self {
        let mut context = Self::default();
        for unit in units {
            context.push_unit(unit);
        }
        context
    }

    pub(crate) fn with_insert_rows(units: Vec<RouteUnit>, insert_row_units: Vec<usize>) -> Self {
        Self {
            units,
            insert_row_units,
        }
    }

    /// Append `unit` unless an identical one is already present; returns its index.
    pub fn push_unit(&mut self, unit: RouteUnit) -> usize {
        match self.units.iter().position(|u| *u == unit) {
            Some(index) => index,
            None => {
                self.units.push(unit);
                self.units.len() - 1
            }
        }
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub(crate) fn units_mut(&mut self) -> &mut Vec<RouteUnit> {
        &mut self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }

    /// Data sources touched, first-occurrence order.
    pub fn actual_data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !names.contains(&unit.data_source_name()) {
                names.push(unit.data_source_name());
            }
        }
        names
    }

    /// Whether INSERT rows are split across units.
    pub fn splits_insert_rows(&self) -> bool {
        !self.insert_row_units.is_empty()
    }

    /// Unit index per inserted row.
    pub fn insert_row_units(&self) -> &[usize] {
        &self.insert_row_units
    }

    /// Rows (in statement order) routed to unit `unit_index`.
    pub fn rows_for_unit(&self, unit_index: usize) -> Vec<usize> {
        self.insert_row_units
            .iter()
            .enumerate()
            .filter(|(_, u)| **u == unit_index)
            .map(|(row, _)| row)
            .collect()
    }
}
