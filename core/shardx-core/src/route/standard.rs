//! Routing of sharded tables: strategies, binding groups and cartesian fan-out.

use crate::error::{ShardxError, ShardxResult};
use crate::route::condition::{ShardingCondition, ShardingConditionValue, ShardingConditions};
use crate::route::hint::HintValues;
use crate::route::RouteUnit;
use crate::rule::{DataNode, ShardingRule, TableRule};
use tracing::trace;

/// Sharded tables that route together: a primary plus its bound members.
struct TableGroup<'a> {
    primary: &'a TableRule,
    members: Vec<&'a TableRule>,
}

impl TableGroup<'_> {
    fn covers(&self, table: &str) -> bool {
        self.primary.logic_table().eq_ignore_ascii_case(table)
            || self
                .members
                .iter()
                .any(|m| m.logic_table().eq_ignore_ascii_case(table))
    }

    /// Condition values on any table of the group; bound tables share
    /// sharding columns, so a value on a member narrows the primary too.
    fn values<'c>(&self, condition: &'c ShardingCondition) -> Vec<&'c ShardingConditionValue> {
        condition
            .values
            .iter()
            .filter(|v| self.covers(&v.table))
            .collect()
    }
}

pub(crate) struct ShardingRouter<'a> {
    rule: &'a ShardingRule,
    hints: &'a HintValues,
}

impl<'a> ShardingRouter<'a> {
    pub(crate) fn new(rule: &'a ShardingRule, hints: &'a HintValues) -> Self {
        Self { rule, hints }
    }

    /// Database strategy over the table's data sources, then table strategy
    /// over each surviving data source's actual tables.
    pub(crate) fn route_table(
        &self,
        table: &TableRule,
        values: &[&ShardingConditionValue],
    ) -> ShardxResult<Vec<DataNode>> {
        let logic = table.logic_table();
        let data_sources = table.database_strategy().shard(
            table.data_source_names(),
            values,
            self.hints.database_values(logic),
        )?;
        let mut nodes = Vec::new();
        for ds in data_sources {
            let candidates = table.actual_tables_in(&ds);
            let tables = table.table_strategy().shard(
                &candidates,
                values,
                self.hints.table_values(logic),
            )?;
            for actual in tables {
                let node = DataNode::new(&ds, &actual);
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
        }
        trace!(table = logic, nodes = nodes.len(), "table routed");
        Ok(nodes)
    }

    /// Union of every OR branch; no branches means no narrowing.
    fn route_group(&self, group: &TableGroup<'_>, branches: &[ShardingCondition]) -> ShardxResult<Vec<DataNode>> {
        if branches.is_empty() {
            return self.route_table(group.primary, &[]);
        }
        let mut nodes: Vec<DataNode> = Vec::new();
        for branch in branches {
            for node in self.route_table(group.primary, &group.values(branch))? {
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
        }
        Ok(nodes)
    }

    /// Expand primary nodes into units that also carry each bound member at
    /// the same ordinal.
    fn group_units(&self, group: &TableGroup<'_>, nodes: &[DataNode]) -> ShardxResult<Vec<RouteUnit>> {
        let mut units = Vec::with_capacity(nodes.len());
        for node in nodes {
            let ordinal = group.primary.ordinal_of(node).ok_or_else(|| {
                ShardxError::RoutingFailed(format!(
                    "data node '{node}' is not part of table '{}'",
                    group.primary.logic_table()
                ))
            })?;
            let mut unit = RouteUnit::new(&node.data_source)
                .with_table(group.primary.logic_table(), &node.table);
            for member in &group.members {
                let bound = member.node_at(ordinal).ok_or_else(|| {
                    ShardxError::RoutingFailed(format!(
                        "binding table '{}' has no data node at ordinal {ordinal}",
                        member.logic_table()
                    ))
                })?;
                unit.add_table(member.logic_table(), &bound.table);
            }
            units.push(unit);
        }
        Ok(units)
    }

    /// Route a non-INSERT statement over its sharded tables.
    pub(crate) fn route_query(
        &self,
        tables: &[&'a TableRule],
        conditions: &ShardingConditions,
        allow_cartesian: bool,
    ) -> ShardxResult<Vec<RouteUnit>> {
        let mut groups: Vec<TableGroup<'a>> = Vec::new();
        for &table in tables {
            let logic = table.logic_table();
            match groups
                .iter_mut()
                .find(|g| self.rule.is_binding_pair(g.primary.logic_table(), logic))
            {
                Some(group) => group.members.push(table),
                None => groups.push(TableGroup {
                    primary: table,
                    members: Vec::new(),
                }),
            }
        }
        if groups.len() > 1 && !allow_cartesian {
            return Err(ShardxError::UnsupportedCartesianRoute {
                tables: groups
                    .iter()
                    .map(|g| g.primary.logic_table().to_string())
                    .collect(),
            });
        }

        let (branches, all_false) = conditions.resolve();
        let mut units: Vec<RouteUnit> = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            let nodes = self.route_group(group, &branches)?;
            let group_units = self.group_units(group, &nodes)?;
            units = if i == 0 {
                group_units
            } else {
                // cartesian product, confined to one data source per unit
                let mut combined = Vec::new();
                for left in &units {
                    for right in group_units
                        .iter()
                        .filter(|r| r.data_source == left.data_source)
                    {
                        let mut unit = left.clone();
                        for mapper in &right.table_mappers {
                            unit.add_table(&mapper.logic_name, &mapper.actual_name);
                        }
                        combined.push(unit);
                    }
                }
                combined
            };
        }
        if units.is_empty() {
            return Err(ShardxError::RoutingFailed(format!(
                "no data node matches the conditions on [{}]",
                tables
                    .iter()
                    .map(|t| t.logic_table())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if all_false {
            // the statement can never match; one target keeps the result shape
            units.truncate(1);
        }
        Ok(units)
    }

    /// Route each INSERT row to exactly one data node.
    ///
    /// Returns the distinct units plus the unit index of every row.
    pub(crate) fn route_insert(
        &self,
        table: &TableRule,
        conditions: &ShardingConditions,
        row_count: usize,
    ) -> ShardxResult<(Vec<RouteUnit>, Vec<usize>)> {
        if !conditions.is_empty() && conditions.len() != row_count {
            return Err(ShardxError::InvalidArguments(format!(
                "INSERT has {row_count} rows but {} sharding conditions",
                conditions.len()
            )));
        }
        let empty = ShardingCondition::new();
        let mut units: Vec<RouteUnit> = Vec::new();
        let mut row_units = Vec::with_capacity(row_count);
        for row in 0..row_count {
            let condition = conditions.conditions().get(row).unwrap_or(&empty);
            let merged = condition.merged().ok_or_else(|| {
                ShardxError::RoutingFailed(format!("insert row {row} has contradictory sharding values"))
            })?;
            let nodes = self.route_table(table, &merged.values_for(table.logic_table()))?;
            let [node] = nodes.as_slice() else {
                return Err(ShardxError::RoutingFailed(format!(
                    "insert row {row} of '{}' must resolve to exactly one data node, got {}",
                    table.logic_table(),
                    nodes.len()
                )));
            };
            let unit = RouteUnit::new(&node.data_source).with_table(table.logic_table(), &node.table);
            let index = match units.iter().position(|u| *u == unit) {
                Some(index) => index,
                None => {
                    units.push(unit);
                    units.len() - 1
                }
            };
            row_units.push(index);
        }
        Ok((units, row_units))
    }
}
