//! Route engine — classifies the statement's tables and dispatches.
//!
//! | Tables in statement           | Route                                       |
//! |-------------------------------|---------------------------------------------|
//! | none                          | first data source                           |
//! | broadcast only                | SELECT: first data source; others: all      |
//! | single (catalog) + broadcast  | the single tables' data source              |
//! | sharded (+ broadcast/single)  | strategies, binding groups, cartesian check |

use crate::config::ConfigurationProperties;
use crate::error::{ShardxError, ShardxResult};
use crate::route::condition::ShardingConditions;
use crate::route::hint::HintValues;
use crate::route::standard::ShardingRouter;
use crate::route::{RouteContext, RouteUnit};
use crate::rule::{SchemaCatalog, ShardingRule, TableRule};
use crate::sql::statement::{BoundStatement, StatementKind};
use tracing::debug;

pub struct RouteEngine<'a> {
    rule: &'a ShardingRule,
    props: &'a ConfigurationProperties,
    catalog: &'a SchemaCatalog,
}

/// Statement tables sorted by how they route.
struct ClassifiedTables<'a> {
    sharded: Vec<&'a TableRule>,
    broadcast: Vec<String>,
    // (logic table, owning data source)
    single: Vec<(String, String)>,
}

impl<'a> RouteEngine<'a> {
    pub fn new(
        rule: &'a ShardingRule,
        props: &'a ConfigurationProperties,
        catalog: &'a SchemaCatalog,
    ) -> Self {
        Self {
            rule,
            props,
            catalog,
        }
    }

    pub fn route(
        &self,
        statement: &BoundStatement,
        conditions: &ShardingConditions,
    ) -> ShardxResult<RouteContext> {
        self.route_with_hint(statement, conditions, &HintValues::default())
    }

    pub fn route_with_hint(
        &self,
        statement: &BoundStatement,
        conditions: &ShardingConditions,
        hints: &HintValues,
    ) -> ShardxResult<RouteContext> {
        let tables = self.classify(statement)?;
        let mut context = if !tables.sharded.is_empty() {
            let router = ShardingRouter::new(self.rule, hints);
            if statement.kind == StatementKind::Insert {
                let [table] = tables.sharded.as_slice() else {
                    return Err(ShardxError::RoutingFailed(
                        "INSERT must target exactly one sharded table".to_string(),
                    ));
                };
                let row_count = statement.insert_row_count().max(1);
                let (units, rows) = router.route_insert(table, conditions, row_count)?;
                if statement.insert_row_count() > 0 {
                    RouteContext::with_insert_rows(units, rows)
                } else {
                    RouteContext::new(units)
                }
            } else {
                RouteContext::new(router.route_query(
                    &tables.sharded,
                    conditions,
                    self.props.allow_cartesian_route,
                )?)
            }
        } else if let Some((_, ds)) = tables.single.first() {
            RouteContext::new(vec![RouteUnit::new(ds)])
        } else if tables.broadcast.is_empty() || statement.kind == StatementKind::Select {
            let first = self.rule.data_source_names().first().ok_or_else(|| {
                ShardxError::RoutingFailed("no data source configured".to_string())
            })?;
            RouteContext::new(vec![RouteUnit::new(first)])
        } else {
            RouteContext::new(
                self.rule
                    .data_source_names()
                    .iter()
                    .map(|ds| RouteUnit::new(ds))
                    .collect(),
            )
        };

        if let Some((_, ds)) = tables.single.first() {
            if let Some((other, other_ds)) = tables.single.iter().find(|(_, d)| d != ds) {
                return Err(ShardxError::RoutingFailed(format!(
                    "single table '{other}' lives in '{other_ds}', not '{ds}'"
                )));
            }
            if context.splits_insert_rows() {
                return Err(ShardxError::RoutingFailed(
                    "INSERT rows cannot be split alongside single tables".to_string(),
                ));
            }
            context.units_mut().retain(|u| u.data_source_name() == ds.as_str());
            if context.is_empty() {
                return Err(ShardxError::RoutingFailed(format!(
                    "sharded tables do not route to data source '{ds}' of the single tables"
                )));
            }
        }
        for unit in context.units_mut() {
            for (logic, _) in &tables.single {
                unit.add_table(logic, logic);
            }
            for logic in &tables.broadcast {
                unit.add_table(logic, logic);
            }
        }
        // re-dedup after mappers were attached
        let context = if context.splits_insert_rows() {
            context
        } else {
            RouteContext::new(context.units().to_vec())
        };

        if let Some(limit) = self.props.max_route_units
            && context.len() > limit
        {
            return Err(ShardxError::RoutingOverBroad {
                units: context.len(),
                limit,
            });
        }
        debug!(
            kind = ?statement.kind,
            units = context.len(),
            data_sources = context.actual_data_source_names().len(),
            "statement routed"
        );
        Ok(context)
    }

    fn classify(&self, statement: &BoundStatement) -> ShardxResult<ClassifiedTables<'a>> {
        let mut classified = ClassifiedTables {
            sharded: Vec::new(),
            broadcast: Vec::new(),
            single: Vec::new(),
        };
        for name in statement.logical_tables() {
            if let Some(rule) = self.rule.find_table_rule(name) {
                classified.sharded.push(rule);
            } else if self.rule.is_broadcast_table(name) {
                classified.broadcast.push(name.to_string());
            } else if let Some(ds) = self.catalog.find_data_source(name) {
                classified.single.push((name.to_string(), ds.to_string()));
            } else {
                return Err(ShardxError::UnroutableTable {
                    table: name.to_string(),
                });
            }
        }
        Ok(classified)
    }
}
