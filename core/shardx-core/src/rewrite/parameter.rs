//! Parameter builders.
//!
//! Both builders copy the caller's parameters; the original list is never
//! modified. [`GroupedParameterBuilder`] splits INSERT parameters into one
//! group per VALUES row so each unit receives only its own rows.

use crate::error::{ShardxError, ShardxResult};
use crate::sql::statement::InsertRowSegment;
use crate::value::ScalarValue;
use std::collections::BTreeMap;

/// Same list for every unit, with individual positions replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardParameterBuilder {
    original: Vec<ScalarValue>,
    replaced: BTreeMap<usize, ScalarValue>,
}

impl StandardParameterBuilder {
    pub fn new(parameters: &[ScalarValue]) -> Self {
        Self {
            original: parameters.to_vec(),
            replaced: BTreeMap::new(),
        }
    }

    pub fn replace(&mut self, index: usize, value: ScalarValue) -> ShardxResult<()> {
        if index >= self.original.len() {
            return Err(ShardxError::InvalidParameterIndex {
                index,
                count: self.original.len(),
            });
        }
        self.replaced.insert(index, value);
        Ok(())
    }

    pub fn parameters(&self) -> Vec<ScalarValue> {
        self.original
            .iter()
            .enumerate()
            .map(|(i, v)| self.replaced.get(&i).unwrap_or(v).clone())
            .collect()
    }
}

/// INSERT parameters: leading, one group per row, trailing.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedParameterBuilder {
    leading: Vec<ScalarValue>,
    groups: Vec<Vec<ScalarValue>>,
    trailing: Vec<ScalarValue>,
}

impl GroupedParameterBuilder {
    pub fn new(parameters: &[ScalarValue], rows: &[InsertRowSegment]) -> ShardxResult<Self> {
        let fetch = |index: usize| {
            parameters
                .get(index)
                .cloned()
                .ok_or(ShardxError::InvalidParameterIndex {
                    index,
                    count: parameters.len(),
                })
        };
        let mut groups = Vec::with_capacity(rows.len());
        let mut first: Option<usize> = None;
        let mut last: Option<usize> = None;
        for row in rows {
            let mut group = Vec::new();
            for index in row.parameter_indexes() {
                group.push(fetch(index)?);
                first = Some(first.map_or(index, |f| f.min(index)));
                last = Some(last.map_or(index, |l| l.max(index)));
            }
            groups.push(group);
        }
        let (leading, trailing) = match (first, last) {
            (Some(first), Some(last)) => (parameters[..first].to_vec(), parameters[last + 1..].to_vec()),
            _ => (parameters.to_vec(), Vec::new()),
        };
        Ok(Self {
            leading,
            groups,
            trailing,
        })
    }

    /// Append `value` to the parameters of row `row`.
    pub fn add_to_group(&mut self, row: usize, value: ScalarValue) -> ShardxResult<()> {
        let count = self.groups.len();
        self.groups
            .get_mut(row)
            .ok_or(ShardxError::InvalidParameterIndex { index: row, count })?
            .push(value);
        Ok(())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Parameters for the given rows, in statement order.
    pub fn parameters_for_rows(&self, rows: &[usize]) -> Vec<ScalarValue> {
        let mut out = self.leading.clone();
        for row in rows {
            if let Some(group) = self.groups.get(*row) {
                out.extend(group.iter().cloned());
            }
        }
        out.extend(self.trailing.iter().cloned());
        out
    }

    pub fn parameters(&self) -> Vec<ScalarValue> {
        let all: Vec<usize> = (0..self.groups.len()).collect();
        self.parameters_for_rows(&all)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterBuilder {
    Standard(StandardParameterBuilder),
    Grouped(GroupedParameterBuilder),
}

impl ParameterBuilder {
    /// Parameters for one unit; `rows` is only read by the grouped builder.
    pub fn parameters_for(&self, rows: Option<&[usize]>) -> Vec<ScalarValue> {
        match (self, rows) {
            (ParameterBuilder::Standard(builder), _) => builder.parameters(),
            (ParameterBuilder::Grouped(builder), Some(rows)) => builder.parameters_for_rows(rows),
            (ParameterBuilder::Grouped(builder), None) => builder.parameters(),
        }
    }
}
