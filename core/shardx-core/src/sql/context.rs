//! Select statement context — column positions the merge engine works with.
//!
//! Built once per multi-unit SELECT. Resolves every ORDER BY / GROUP BY item
//! and aggregation to a result column index, and plans the derived
//! projections that must be appended so each shard returns those columns:
//!
//! ```text
//! SELECT user_id, AVG(price) FROM t_order GROUP BY user_id ORDER BY created
//!   → appended: COUNT(price) AS AVG_DERIVED_COUNT_0, SUM(price) AS AVG_DERIVED_SUM_0,
//!               created AS ORDER_BY_DERIVED_0
//! ```

use crate::config::DatabaseType;
use crate::error::{ShardxError, ShardxResult};
use crate::sql::statement::{
    AggregationType, NullsOrder, OrderByItem, OrderByTarget, OrderDirection, PaginationKind,
    PaginationValue, Projection, SelectSegments,
};
use crate::value::ScalarValue;

/// Projection appended to every shard's SELECT list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProjection {
    pub expression: String,
    pub alias: String,
}

impl DerivedProjection {
    pub fn to_sql(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

/// An ORDER BY or GROUP BY item resolved to a column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderByColumn {
    pub index: usize,
    pub direction: OrderDirection,
    pub nulls_first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationColumn {
    pub kind: AggregationType,
    pub index: usize,
    /// `(count index, sum index)` of the derived pair backing an AVG
    pub avg_derived: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub row_count: Option<u64>,
}

impl Pagination {
    /// Rows each shard must return so the merged window is complete.
    pub fn fetch_count(&self) -> Option<u64> {
        self.row_count.map(|r| self.offset.saturating_add(r))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatementContext {
    visible_column_count: usize,
    derived: Vec<DerivedProjection>,
    group_by: Vec<OrderByColumn>,
    order_by: Vec<OrderByColumn>,
    injected_order_by: Option<String>,
    aggregations: Vec<AggregationColumn>,
    pagination: Option<Pagination>,
}

fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn owners_match(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => names_match(a, b),
        _ => true,
    }
}

fn normalize(expression: &str) -> String {
    expression
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Resolve a pagination value, reading parameters where needed.
pub(crate) fn pagination_value(value: &PaginationValue, parameters: &[ScalarValue]) -> ShardxResult<u64> {
    match value.kind {
        PaginationKind::Literal(v) => Ok(v),
        PaginationKind::Parameter(index) => {
            let parameter = parameters.get(index).ok_or(ShardxError::InvalidParameterIndex {
                index,
                count: parameters.len(),
            })?;
            parameter
                .as_i64()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| {
                    ShardxError::InvalidArguments(format!(
                        "pagination parameter {index} is not a non-negative integer: {parameter}"
                    ))
                })
        }
    }
}

struct Resolver<'a> {
    projections: &'a [Projection],
    visible: usize,
    derived: Vec<DerivedProjection>,
}

impl Resolver<'_> {
    fn find_projection(&self, target: &OrderByTarget) -> ShardxResult<Option<usize>> {
        if let OrderByTarget::Index(position) = target {
            if *position == 0 || *position > self.visible {
                return Err(ShardxError::InvalidArguments(format!(
                    "ORDER BY position {position} is outside the {} selected columns",
                    self.visible
                )));
            }
            return Ok(Some(position - 1));
        }
        let mut start = 0;
        for projection in self.projections {
            let matched = match (projection, target) {
                (_, OrderByTarget::Column { name, .. }) | (_, OrderByTarget::Expression(name))
                    if projection.alias().is_some_and(|a| names_match(a, name)) =>
                {
                    Some(0)
                }
                (
                    Projection::Column { name, owner, .. },
                    OrderByTarget::Column {
                        name: target_name,
                        owner: target_owner,
                    },
                ) => (names_match(name, target_name) && owners_match(owner, target_owner)).then_some(0),
                (
                    Projection::Star { owner, columns },
                    OrderByTarget::Column {
                        name: target_name,
                        owner: target_owner,
                    },
                ) if owners_match(owner, target_owner) => {
                    columns.iter().position(|c| names_match(c, target_name))
                }
                (Projection::Expression { text, .. }, OrderByTarget::Expression(expression)) => {
                    (normalize(text) == normalize(expression)).then_some(0)
                }
                (Projection::Aggregation { kind, inner, .. }, OrderByTarget::Expression(expression)) => {
                    (normalize(&format!("{}({inner})", kind.as_sql())) == normalize(expression))
                        .then_some(0)
                }
                _ => None,
            };
            if let Some(offset) = matched {
                return Ok(Some(start + offset));
            }
            start += projection.width();
        }
        Ok(None)
    }

    /// Index of `item`, appending a derived projection when it is not selected.
    fn resolve(&mut self, item: &OrderByItem, prefix: &str, counter: &mut usize) -> ShardxResult<usize> {
        if let Some(index) = self.find_projection(&item.target)? {
            return Ok(index);
        }
        let expression = item.target.to_sql();
        if let Some(position) = self
            .derived
            .iter()
            .position(|d| normalize(&d.expression) == normalize(&expression))
        {
            return Ok(self.visible + position);
        }
        self.derived.push(DerivedProjection {
            expression,
            alias: format!("{prefix}{counter}"),
        });
        *counter += 1;
        Ok(self.visible + self.derived.len() - 1)
    }
}

impl SelectStatementContext {
    pub fn new(
        select: &SelectSegments,
        parameters: &[ScalarValue],
        database_type: DatabaseType,
    ) -> ShardxResult<Self> {
        let projections = &select.projections.items;
        let visible: usize = projections.iter().map(Projection::width).sum();
        let mut resolver = Resolver {
            projections,
            visible,
            derived: Vec::new(),
        };

        let mut aggregations = Vec::new();
        let mut start = 0;
        let mut avg_counter = 0;
        for projection in projections {
            if let Projection::Aggregation { kind, inner, .. } = projection {
                let avg_derived = if *kind == AggregationType::Avg {
                    resolver.derived.push(DerivedProjection {
                        expression: format!("COUNT({inner})"),
                        alias: format!("AVG_DERIVED_COUNT_{avg_counter}"),
                    });
                    resolver.derived.push(DerivedProjection {
                        expression: format!("SUM({inner})"),
                        alias: format!("AVG_DERIVED_SUM_{avg_counter}"),
                    });
                    avg_counter += 1;
                    let count = visible + resolver.derived.len() - 2;
                    Some((count, count + 1))
                } else {
                    None
                };
                aggregations.push(AggregationColumn {
                    kind: *kind,
                    index: start,
                    avg_derived,
                });
            }
            start += projection.width();
        }

        let null_is_smallest = database_type.null_is_smallest();
        let column = |item: &OrderByItem, index: usize| OrderByColumn {
            index,
            direction: item.direction,
            nulls_first: match item.nulls {
                Some(NullsOrder::First) => true,
                Some(NullsOrder::Last) => false,
                None => (item.direction == OrderDirection::Asc) == null_is_smallest,
            },
        };

        let mut order_counter = 0;
        let mut order_by = Vec::new();
        if let Some(segment) = &select.order_by {
            for item in &segment.items {
                let index = resolver.resolve(item, "ORDER_BY_DERIVED_", &mut order_counter)?;
                order_by.push(column(item, index));
            }
        }
        let mut group_counter = 0;
        let mut group_by = Vec::new();
        let mut injected_order_by = None;
        if let Some(segment) = &select.group_by {
            for item in &segment.items {
                let index = resolver.resolve(item, "GROUP_BY_DERIVED_", &mut group_counter)?;
                group_by.push(column(item, index));
            }
            if order_by.is_empty() && !group_by.is_empty() {
                order_by = group_by.clone();
                let items: Vec<String> = segment
                    .items
                    .iter()
                    .map(|i| {
                        let direction = match i.direction {
                            OrderDirection::Asc => "ASC",
                            OrderDirection::Desc => "DESC",
                        };
                        format!("{} {direction}", i.target.to_sql())
                    })
                    .collect();
                injected_order_by = Some(format!(" ORDER BY {}", items.join(", ")));
            }
        }

        let pagination = match &select.pagination {
            Some(segment) => Some(Pagination {
                offset: segment
                    .offset
                    .as_ref()
                    .map(|v| pagination_value(v, parameters))
                    .transpose()?
                    .unwrap_or(0),
                row_count: segment
                    .row_count
                    .as_ref()
                    .map(|v| pagination_value(v, parameters))
                    .transpose()?,
            }),
            None => None,
        };

        Ok(Self {
            visible_column_count: visible,
            derived: resolver.derived,
            group_by,
            order_by,
            injected_order_by,
            aggregations,
            pagination,
        })
    }

    /// Columns the client sees; derived columns come after these.
    pub fn visible_column_count(&self) -> usize {
        self.visible_column_count
    }

    pub fn derived_projections(&self) -> &[DerivedProjection] {
        &self.derived
    }

    pub fn group_by(&self) -> &[OrderByColumn] {
        &self.group_by
    }

    pub fn order_by(&self) -> &[OrderByColumn] {
        &self.order_by
    }

    /// ` ORDER BY ...` text to insert after GROUP BY, when the query had none.
    pub fn injected_order_by(&self) -> Option<&str> {
        self.injected_order_by.as_deref()
    }

    pub fn aggregations(&self) -> &[AggregationColumn] {
        &self.aggregations
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    pub fn has_group_by_or_aggregation(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty()
    }

    /// Shards return rows already grouped in merge order.
    pub fn is_same_group_by_and_order_by(&self) -> bool {
        !self.group_by.is_empty() && self.group_by == self.order_by
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::statement::{GroupBySegment, OrderBySegment, PaginationSegment, ProjectionsSegment};

    fn segments(items: Vec<Projection>) -> SelectSegments {
        SelectSegments::new(ProjectionsSegment {
            start: 7,
            stop: 20,
            items,
        })
    }

    fn order_by(items: Vec<OrderByItem>) -> OrderBySegment {
        OrderBySegment {
            items,
            start: 0,
            stop: 0,
        }
    }

    #[test]
    fn test_avg_derives_count_and_sum() {
        let select = segments(vec![
            Projection::column("user_id"),
            Projection::aggregation(AggregationType::Avg, "price"),
            Projection::aggregation(AggregationType::Sum, "price"),
        ]);
        let context = SelectStatementContext::new(&select, &[], DatabaseType::MySql).unwrap();
        assert_eq!(context.visible_column_count(), 3);
        let derived: Vec<String> = context.derived_projections().iter().map(|d| d.to_sql()).collect();
        assert_eq!(
            derived,
            vec![
                "COUNT(price) AS AVG_DERIVED_COUNT_0",
                "SUM(price) AS AVG_DERIVED_SUM_0"
            ]
        );
        assert_eq!(context.aggregations()[0].index, 1);
        assert_eq!(context.aggregations()[0].avg_derived, Some((3, 4)));
        assert_eq!(context.aggregations()[1].avg_derived, None);
        assert!(context.has_group_by_or_aggregation());
    }

    #[test]
    fn test_order_by_resolves_alias_star_and_derives_missing() {
        let select = segments(vec![
            Projection::Star {
                owner: Some("o".to_string()),
                columns: vec!["order_id".to_string(), "user_id".to_string()],
            },
            Projection::Column {
                name: "status".to_string(),
                owner: None,
                alias: Some("s".to_string()),
            },
        ])
        .with_order_by(order_by(vec![
            OrderByItem::column("s", OrderDirection::Desc),
            OrderByItem {
                target: OrderByTarget::Column {
                    name: "user_id".to_string(),
                    owner: Some("o".to_string()),
                },
                direction: OrderDirection::Asc,
                nulls: None,
            },
            OrderByItem::column("created_at", OrderDirection::Asc),
        ]));
        let context = SelectStatementContext::new(&select, &[], DatabaseType::MySql).unwrap();
        let indexes: Vec<usize> = context.order_by().iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![2, 1, 3]);
        assert_eq!(context.derived_projections()[0].to_sql(), "created_at AS ORDER_BY_DERIVED_0");
    }

    #[test]
    fn test_group_by_injects_order_by() {
        let select = segments(vec![
            Projection::column("user_id"),
            Projection::aggregation(AggregationType::Count, "*"),
        ])
        .with_group_by(GroupBySegment {
            items: vec![
                OrderByItem::column("user_id", OrderDirection::Asc),
                OrderByItem::column("status", OrderDirection::Asc),
            ],
            stop: 40,
        });
        let context = SelectStatementContext::new(&select, &[], DatabaseType::MySql).unwrap();
        assert_eq!(context.injected_order_by(), Some(" ORDER BY user_id ASC, status ASC"));
        assert!(context.is_same_group_by_and_order_by());
        assert_eq!(
            context.derived_projections()[0].to_sql(),
            "status AS GROUP_BY_DERIVED_0"
        );
        assert_eq!(context.group_by()[1].index, 2);
    }

    #[test]
    fn test_group_by_reuses_order_by_derived_column() {
        let select = segments(vec![Projection::aggregation(AggregationType::Sum, "amount")])
            .with_group_by(GroupBySegment {
                items: vec![OrderByItem::column("user_id", OrderDirection::Asc)],
                stop: 40,
            })
            .with_order_by(order_by(vec![OrderByItem::column("user_id", OrderDirection::Desc)]));
        let context = SelectStatementContext::new(&select, &[], DatabaseType::MySql).unwrap();
        assert_eq!(context.derived_projections().len(), 1);
        assert_eq!(context.group_by()[0].index, context.order_by()[0].index);
        // directions differ, so shards are not grouped in merge order
        assert!(!context.is_same_group_by_and_order_by());
        assert_eq!(context.injected_order_by(), None);
    }

    #[test]
    fn test_null_order_defaults_by_dialect() {
        let select = segments(vec![Projection::column("a"), Projection::column("b")]).with_order_by(
            order_by(vec![
                OrderByItem::column("a", OrderDirection::Asc),
                OrderByItem {
                    nulls: Some(NullsOrder::First),
                    ..OrderByItem::column("b", OrderDirection::Desc)
                },
            ]),
        );
        let mysql = SelectStatementContext::new(&select, &[], DatabaseType::MySql).unwrap();
        assert!(mysql.order_by()[0].nulls_first);
        assert!(mysql.order_by()[1].nulls_first);
        let pg = SelectStatementContext::new(&select, &[], DatabaseType::PostgreSql).unwrap();
        assert!(!pg.order_by()[0].nulls_first);
        assert!(pg.order_by()[1].nulls_first);
    }

    #[test]
    fn test_pagination_from_parameters() {
        let select = segments(vec![Projection::column("a")]).with_pagination(PaginationSegment {
            offset: Some(PaginationValue::parameter(1, 30)),
            row_count: Some(PaginationValue::literal(5, 40)),
        });
        let parameters = vec![ScalarValue::from("x"), ScalarValue::Int64(10)];
        let context = SelectStatementContext::new(&select, &parameters, DatabaseType::MySql).unwrap();
        let pagination = context.pagination().unwrap();
        assert_eq!(pagination.offset, 10);
        assert_eq!(pagination.fetch_count(), Some(15));

        let err = SelectStatementContext::new(&select, &[], DatabaseType::MySql).unwrap_err();
        assert!(matches!(err, ShardxError::InvalidParameterIndex { index: 1, count: 0 }));
    }

    #[test]
    fn test_order_by_position_out_of_range() {
        let select = segments(vec![Projection::column("a")])
            .with_order_by(order_by(vec![OrderByItem::index(2, OrderDirection::Asc)]));
        assert!(SelectStatementContext::new(&select, &[], DatabaseType::MySql).is_err());
    }
}
