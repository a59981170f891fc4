//! Sharding engine — the pipeline facade.
//!
//! `prepare` turns one bound statement into execution units
//! (key allocation → routing → rewrite) and fails as a whole; `merge` turns
//! the streams the caller obtained for those units back into one cursor.

use crate::config::{ConfigurationProperties, RuleConfiguration};
use crate::engine::execution::ExecutionUnit;
use crate::engine::parallel::{ParallelExecutor, StatementExecutor};
use crate::error::ShardxResult;
use crate::keygen::{self, GeneratedKey};
use crate::merge::{MergeEngine, MergedResult, RowStream};
use crate::rewrite::RewriteEngine;
use crate::route::condition::{ShardingCondition, ShardingConditionValue, ShardingConditions};
use crate::route::engine::RouteEngine;
use crate::route::hint::HintValues;
use crate::route::RouteContext;
use crate::rule::{SchemaCatalog, ShardingRule};
use crate::sql::context::SelectStatementContext;
use crate::sql::statement::{BoundStatement, StatementKind};
use crate::value::ScalarValue;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything produced for one statement execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub kind: StatementKind,
    pub route_context: RouteContext,
    pub units: Vec<ExecutionUnit>,
    /// Present for SELECTs routed to more than one unit
    pub select_context: Option<SelectStatementContext>,
    pub generated_key: Option<GeneratedKey>,
}

pub struct ShardingEngine {
    rule: Arc<ShardingRule>,
    props: ConfigurationProperties,
    catalog: SchemaCatalog,
}

impl ShardingEngine {
    pub fn new(rule: Arc<ShardingRule>, props: ConfigurationProperties, catalog: SchemaCatalog) -> Self {
        Self {
            rule,
            props,
            catalog,
        }
    }

    /// Validate `config` and build the engine.
    pub fn from_config(
        config: &RuleConfiguration,
        props: ConfigurationProperties,
        catalog: SchemaCatalog,
    ) -> ShardxResult<Self> {
        let rule = ShardingRule::new(config)?;
        info!(
            data_sources = rule.data_source_names().len(),
            tables = rule.table_rules().len(),
            "sharding rule loaded"
        );
        Ok(Self::new(Arc::new(rule), props, catalog))
    }

    pub fn rule(&self) -> &ShardingRule {
        &self.rule
    }

    pub fn props(&self) -> &ConfigurationProperties {
        &self.props
    }

    pub fn prepare(
        &self,
        statement: &BoundStatement,
        conditions: &ShardingConditions,
        sql: &str,
        parameters: &[ScalarValue],
    ) -> ShardxResult<ExecutionContext> {
        self.prepare_with_hint(statement, conditions, sql, parameters, &HintValues::default())
    }

    /// Allocate keys, route and rewrite. Nothing is returned unless every
    /// step succeeds.
    pub fn prepare_with_hint(
        &self,
        statement: &BoundStatement,
        conditions: &ShardingConditions,
        sql: &str,
        parameters: &[ScalarValue],
        hints: &HintValues,
    ) -> ShardxResult<ExecutionContext> {
        let generated_key = self.generate_key(statement)?;
        let conditions = self.conditions_with_key(statement, conditions, generated_key.as_ref());

        let route_context = RouteEngine::new(&self.rule, &self.props, &self.catalog)
            .route_with_hint(statement, &conditions, hints)?;

        let select_context = match &statement.select {
            Some(select) if statement.kind == StatementKind::Select && !route_context.is_single_unit() => {
                Some(SelectStatementContext::new(select, parameters, self.props.database_type)?)
            }
            _ => None,
        };

        let units = RewriteEngine::new(&self.props).rewrite(
            statement,
            &route_context,
            select_context.as_ref(),
            generated_key.as_ref(),
            sql,
            parameters,
        )?;
        debug!(kind = ?statement.kind, units = units.len(), "statement prepared");
        Ok(ExecutionContext {
            kind: statement.kind,
            route_context,
            units,
            select_context,
            generated_key,
        })
    }

    /// Keys for an INSERT whose table generates its key column and whose
    /// column list does not name it.
    fn generate_key(&self, statement: &BoundStatement) -> ShardxResult<Option<GeneratedKey>> {
        let (Some(insert), Some(table)) = (&statement.insert, statement.logical_tables().first().copied())
        else {
            return Ok(None);
        };
        let Some(strategy) = self.rule.find_key_generate_strategy(table) else {
            return Ok(None);
        };
        if insert.contains_column(&strategy.column) {
            return Ok(None);
        }
        let key = keygen::allocate(&strategy.generator, &strategy.column, insert.rows.len())?;
        debug!(table, column = %strategy.column, keys = key.values.len(), "keys generated");
        Ok(Some(key))
    }

    /// Row conditions extended with the generated value when the key column
    /// is also a sharding column.
    fn conditions_with_key<'c>(
        &self,
        statement: &BoundStatement,
        conditions: &'c ShardingConditions,
        key: Option<&GeneratedKey>,
    ) -> Cow<'c, ShardingConditions> {
        let (Some(key), Some(table)) = (key, statement.logical_tables().first().copied()) else {
            return Cow::Borrowed(conditions);
        };
        let sharded_by_key = self
            .rule
            .find_table_rule(table)
            .is_some_and(|rule| rule.is_sharding_column(&key.column));
        let rows = statement.insert_row_count();
        if !sharded_by_key || !(conditions.is_empty() || conditions.len() == rows) {
            return Cow::Borrowed(conditions);
        }
        let mut extended = conditions.clone();
        if extended.is_empty() {
            for _ in 0..rows {
                extended.push(ShardingCondition::new());
            }
        }
        for (row, condition) in extended.conditions_mut().iter_mut().enumerate() {
            if let Some(value) = key.value_for_row(row) {
                condition.push(ShardingConditionValue::eq(table, &key.column, value.clone()));
            }
        }
        Cow::Owned(extended)
    }

    pub fn merge(
        &self,
        context: &ExecutionContext,
        streams: Vec<Box<dyn RowStream>>,
    ) -> ShardxResult<Box<dyn MergedResult>> {
        MergeEngine::new().merge(context.kind, context.select_context.as_ref(), streams)
    }

    /// Run every unit through `executor` and merge the resulting streams.
    pub fn execute(
        &self,
        context: &ExecutionContext,
        pool: &ParallelExecutor,
        executor: &dyn StatementExecutor,
    ) -> ShardxResult<Box<dyn MergedResult>> {
        let streams = pool.execute_all(&context.units, executor)?;
        self.merge(context, streams)
    }
}
