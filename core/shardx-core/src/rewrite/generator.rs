//! Token generators — one per kind of rewrite.
//!
//! Each generator inspects the statement independently and contributes
//! tokens (and parameter edits); [`SqlTokens::new`] then checks that the
//! combined set does not overlap.

use crate::error::{ShardxError, ShardxResult};
use crate::keygen::GeneratedKey;
use crate::rewrite::parameter::{GroupedParameterBuilder, ParameterBuilder, StandardParameterBuilder};
use crate::rewrite::token::{SqlToken, SqlTokens, TokenKind};
use crate::route::RouteContext;
use crate::sql::context::SelectStatementContext;
use crate::sql::statement::{BoundStatement, InsertSegments, PaginationKind, SelectSegments};
use crate::value::ScalarValue;

/// Tokens plus parameters for one statement, shared by all its units.
#[derive(Debug, Clone, PartialEq)]
pub struct RewritePlan {
    pub tokens: SqlTokens,
    pub parameters: ParameterBuilder,
}

fn table_tokens(statement: &BoundStatement, tokens: &mut Vec<SqlToken>) {
    for table in &statement.tables {
        tokens.push(SqlToken::table(table.start, table.stop, &table.name));
    }
}

/// Derived projections, injected ORDER BY and the per-shard pagination window.
fn select_tokens(
    select: &SelectSegments,
    context: &SelectStatementContext,
    tokens: &mut Vec<SqlToken>,
    parameters: &mut StandardParameterBuilder,
) -> ShardxResult<()> {
    if !context.derived_projections().is_empty() {
        let appended: Vec<String> = context
            .derived_projections()
            .iter()
            .map(|d| d.to_sql())
            .collect();
        tokens.push(SqlToken::insert(
            select.projections.stop,
            format!(", {}", appended.join(", ")),
        ));
    }
    if let (Some(order_by), Some(group_by)) = (context.injected_order_by(), &select.group_by) {
        tokens.push(SqlToken::insert(group_by.stop, order_by));
    }
    if let (Some(segment), Some(pagination)) = (&select.pagination, context.pagination()) {
        // shards cannot know the global window: fetch from 0 up to offset + count
        if let Some(offset) = &segment.offset {
            match offset.kind {
                PaginationKind::Literal(_) => tokens.push(SqlToken::replace(offset.start, offset.stop, "0")),
                PaginationKind::Parameter(index) => parameters.replace(index, ScalarValue::Int64(0))?,
            }
        }
        if let (Some(row_count), Some(fetch)) = (&segment.row_count, pagination.fetch_count()) {
            match row_count.kind {
                PaginationKind::Literal(_) => {
                    tokens.push(SqlToken::replace(row_count.start, row_count.stop, fetch.to_string()))
                }
                PaginationKind::Parameter(index) => {
                    let fetch = i64::try_from(fetch).unwrap_or(i64::MAX);
                    parameters.replace(index, ScalarValue::Int64(fetch))?
                }
            }
        }
    }
    Ok(())
}

/// Generated key column, and the VALUES rows re-rendered so units can take
/// only their own rows.
fn insert_tokens(
    sql: &str,
    insert: &InsertSegments,
    generated_key: Option<&GeneratedKey>,
    split_rows: bool,
    tokens: &mut Vec<SqlToken>,
    parameters: &mut GroupedParameterBuilder,
) -> ShardxResult<()> {
    let key = generated_key.filter(|k| k.generated);
    if let Some(key) = key {
        let position = insert.columns_stop.ok_or_else(|| {
            ShardxError::InvalidArguments(format!(
                "INSERT without a column list cannot receive generated column '{}'",
                key.column
            ))
        })?;
        tokens.push(SqlToken::insert(position, format!(", {}", key.column)));
    }
    if key.is_none() && !split_rows {
        return Ok(());
    }
    let (Some(first), Some(last)) = (insert.rows.first(), insert.rows.last()) else {
        return Ok(());
    };
    let mut rows = Vec::with_capacity(insert.rows.len());
    for (i, row) in insert.rows.iter().enumerate() {
        let text = sql.get(row.start..row.stop).ok_or(ShardxError::TokenOutOfBounds {
            start: row.start,
            stop: row.stop,
            len: sql.len(),
        })?;
        match key {
            Some(key) => {
                let value = key.value_for_row(i).ok_or_else(|| {
                    ShardxError::KeyGeneration(format!("no generated key for insert row {i}"))
                })?;
                let body = text.strip_suffix(')').ok_or_else(|| {
                    ShardxError::InvalidArguments(format!("insert row {i} is not parenthesized"))
                })?;
                if row.is_parameterized() {
                    parameters.add_to_group(i, value.clone())?;
                    rows.push(format!("{body}, ?)"));
                } else {
                    rows.push(format!("{body}, {})", value.to_sql_literal()));
                }
            }
            None => rows.push(text.to_string()),
        }
    }
    tokens.push(SqlToken {
        start: first.start,
        stop: last.stop,
        kind: TokenKind::InsertValues { rows },
    });
    Ok(())
}

/// Plan the rewrite of one statement.
///
/// `select_context` is only present for multi-unit SELECTs; single-unit
/// routes keep their ORDER BY, projections and pagination untouched.
pub fn plan(
    statement: &BoundStatement,
    route_context: &RouteContext,
    select_context: Option<&SelectStatementContext>,
    generated_key: Option<&GeneratedKey>,
    sql: &str,
    parameters: &[ScalarValue],
) -> ShardxResult<RewritePlan> {
    let mut tokens = Vec::new();
    table_tokens(statement, &mut tokens);
    let builder = match (&statement.insert, &statement.select) {
        (Some(insert), _) => {
            let mut builder = GroupedParameterBuilder::new(parameters, &insert.rows)?;
            insert_tokens(
                sql,
                insert,
                generated_key,
                route_context.splits_insert_rows(),
                &mut tokens,
                &mut builder,
            )?;
            ParameterBuilder::Grouped(builder)
        }
        (None, Some(select)) => {
            let mut builder = StandardParameterBuilder::new(parameters);
            if let Some(context) = select_context {
                select_tokens(select, context, &mut tokens, &mut builder)?;
            }
            ParameterBuilder::Standard(builder)
        }
        (None, None) => ParameterBuilder::Standard(StandardParameterBuilder::new(parameters)),
    };
    Ok(RewritePlan {
        tokens: SqlTokens::new(sql, tokens)?,
        parameters: builder,
    })
}
