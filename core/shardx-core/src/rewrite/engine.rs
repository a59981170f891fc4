//! Rewrite engine — one SQL + parameter list per route unit.

use crate::config::ConfigurationProperties;
use crate::engine::ExecutionUnit;
use crate::error::ShardxResult;
use crate::keygen::GeneratedKey;
use crate::rewrite::generator::{self, RewritePlan};
use crate::rewrite::token::RenderTarget;
use crate::route::RouteContext;
use crate::sql::context::SelectStatementContext;
use crate::sql::statement::BoundStatement;
use crate::value::ScalarValue;
use tracing::{debug, info};

pub struct RewriteEngine<'a> {
    props: &'a ConfigurationProperties,
}

impl<'a> RewriteEngine<'a> {
    pub fn new(props: &'a ConfigurationProperties) -> Self {
        Self { props }
    }

    /// Rewrite `sql` for every unit of `route_context`, in unit order.
    ///
    /// Fails as a whole: either every unit is rewritten or none is returned.
    pub fn rewrite(
        &self,
        statement: &BoundStatement,
        route_context: &RouteContext,
        select_context: Option<&SelectStatementContext>,
        generated_key: Option<&GeneratedKey>,
        sql: &str,
        parameters: &[ScalarValue],
    ) -> ShardxResult<Vec<ExecutionUnit>> {
        let RewritePlan {
            tokens,
            parameters: builder,
        } = generator::plan(
            statement,
            route_context,
            select_context,
            generated_key,
            sql,
            parameters,
        )?;
        debug!(
            tokens = tokens.tokens().len(),
            units = route_context.len(),
            "rewrite planned"
        );

        let split_rows = route_context.splits_insert_rows();
        let mut units = Vec::with_capacity(route_context.len());
        for (index, unit) in route_context.units().iter().enumerate() {
            let rows = split_rows.then(|| route_context.rows_for_unit(index));
            let target = RenderTarget {
                unit: Some(unit),
                rows: rows.as_deref(),
            };
            let rewritten = ExecutionUnit {
                data_source_name: unit.data_source_name().to_string(),
                sql: tokens.render(sql, &target),
                parameters: builder.parameters_for(rows.as_deref()),
            };
            if self.props.sql_show {
                info!(
                    data_source = %rewritten.data_source_name,
                    sql = %rewritten.sql,
                    parameters = ?rewritten.parameters,
                    "actual SQL"
                );
            }
            units.push(rewritten);
        }
        Ok(units)
    }
}
