//! Bound statement — the parser/binder output this pipeline consumes.
//!
//! Only what routing and rewriting need is modelled: the statement kind,
//! every logical table occurrence with its source span, and the SELECT /
//! INSERT clause segments. All spans are byte offsets into the original SQL,
//! half-open (`start..stop`).

use crate::value::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

/// One occurrence of a logical table name in the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSegment {
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

impl TableSegment {
    pub fn new(name: &str, start: usize) -> Self {
        Self {
            name: name.to_string(),
            start,
            stop: start + name.len(),
        }
    }
}

// ===== SELECT =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationType {
    Max,
    Min,
    Sum,
    Count,
    Avg,
}

impl AggregationType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregationType::Max => "MAX",
            AggregationType::Min => "MIN",
            AggregationType::Sum => "SUM",
            AggregationType::Count => "COUNT",
            AggregationType::Avg => "AVG",
        }
    }
}

/// One item of the projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Column {
        name: String,
        owner: Option<String>,
        alias: Option<String>,
    },
    /// `AVG(price)`: `inner` is the argument text, `price`
    Aggregation {
        kind: AggregationType,
        inner: String,
        alias: Option<String>,
    },
    /// `*` or `o.*`, expanded by the binder into its column names
    Star {
        owner: Option<String>,
        columns: Vec<String>,
    },
    Expression {
        text: String,
        alias: Option<String>,
    },
}

impl Projection {
    pub fn column(name: &str) -> Self {
        Projection::Column {
            name: name.to_string(),
            owner: None,
            alias: None,
        }
    }

    pub fn aggregation(kind: AggregationType, inner: &str) -> Self {
        Projection::Aggregation {
            kind,
            inner: inner.to_string(),
            alias: None,
        }
    }

    /// Number of result columns this projection produces.
    pub fn width(&self) -> usize {
        match self {
            Projection::Star { columns, .. } => columns.len(),
            _ => 1,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Projection::Column { alias, .. }
            | Projection::Aggregation { alias, .. }
            | Projection::Expression { alias, .. } => alias.as_deref(),
            Projection::Star { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderByTarget {
    Column { name: String, owner: Option<String> },
    /// 1-based projection position
    Index(usize),
    Expression(String),
}

impl OrderByTarget {
    /// SQL text of the target, as rendered in a derived projection or ORDER BY.
    pub fn to_sql(&self) -> String {
        match self {
            OrderByTarget::Column { name, owner: Some(owner) } => format!("{owner}.{name}"),
            OrderByTarget::Column { name, owner: None } => name.clone(),
            OrderByTarget::Index(index) => index.to_string(),
            OrderByTarget::Expression(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByItem {
    pub target: OrderByTarget,
    pub direction: OrderDirection,
    /// Explicit `NULLS FIRST/LAST`; `None` uses the dialect default
    pub nulls: Option<NullsOrder>,
}

impl OrderByItem {
    pub fn column(name: &str, direction: OrderDirection) -> Self {
        Self {
            target: OrderByTarget::Column {
                name: name.to_string(),
                owner: None,
            },
            direction,
            nulls: None,
        }
    }

    pub fn index(index: usize, direction: OrderDirection) -> Self {
        Self {
            target: OrderByTarget::Index(index),
            direction,
            nulls: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionsSegment {
    pub start: usize,
    pub stop: usize,
    pub items: Vec<Projection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBySegment {
    pub items: Vec<OrderByItem>,
    /// End of the GROUP BY clause, where an ORDER BY can be injected
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBySegment {
    pub items: Vec<OrderByItem>,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationKind {
    Literal(u64),
    /// 0-based index into the statement parameters
    Parameter(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationValue {
    pub kind: PaginationKind,
    pub start: usize,
    pub stop: usize,
}

impl PaginationValue {
    pub fn literal(value: u64, start: usize) -> Self {
        Self {
            kind: PaginationKind::Literal(value),
            start,
            stop: start + value.to_string().len(),
        }
    }

    /// A `?` marker at `start`.
    pub fn parameter(index: usize, start: usize) -> Self {
        Self {
            kind: PaginationKind::Parameter(index),
            start,
            stop: start + 1,
        }
    }
}

/// `LIMIT`/`OFFSET` (or dialect equivalent) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaginationSegment {
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectSegments {
    pub projections: ProjectionsSegment,
    pub group_by: Option<GroupBySegment>,
    pub order_by: Option<OrderBySegment>,
    pub pagination: Option<PaginationSegment>,
}

impl SelectSegments {
    pub fn new(projections: ProjectionsSegment) -> Self {
        Self {
            projections,
            group_by: None,
            order_by: None,
            pagination: None,
        }
    }

    pub fn with_group_by(mut self, group_by: GroupBySegment) -> Self {
        self.group_by = Some(group_by);
        self
    }

    pub fn with_order_by(mut self, order_by: OrderBySegment) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationSegment) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

// ===== INSERT =====

#[derive(Debug, Clone, PartialEq)]
pub enum InsertValue {
    Literal(ScalarValue),
    /// 0-based index into the statement parameters
    Parameter(usize),
    Expression(String),
}

/// One `( ... )` row of a VALUES clause, parentheses included in the span.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRowSegment {
    pub start: usize,
    pub stop: usize,
    pub values: Vec<InsertValue>,
}

impl InsertRowSegment {
    /// Parameter indexes referenced by this row, in order.
    pub fn parameter_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.values.iter().filter_map(|v| match v {
            InsertValue::Parameter(index) => Some(*index),
            _ => None,
        })
    }

    pub fn is_parameterized(&self) -> bool {
        self.parameter_indexes().next().is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertSegments {
    pub columns: Vec<String>,
    /// Offset of the column list's closing parenthesis; `None` when the
    /// statement has no explicit column list
    pub columns_stop: Option<usize>,
    pub rows: Vec<InsertRowSegment>,
}

impl InsertSegments {
    pub fn contains_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))
    }
}

// ===== Statement =====

#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub kind: StatementKind,
    pub tables: Vec<TableSegment>,
    pub select: Option<SelectSegments>,
    pub insert: Option<InsertSegments>,
}

impl BoundStatement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            tables: Vec::new(),
            select: None,
            insert: None,
        }
    }

    pub fn select(select: SelectSegments) -> Self {
        Self {
            select: Some(select),
            ..Self::new(StatementKind::Select)
        }
    }

    pub fn insert(insert: InsertSegments) -> Self {
        Self {
            insert: Some(insert),
            ..Self::new(StatementKind::Insert)
        }
    }

    pub fn with_table(mut self, name: &str, start: usize) -> Self {
        self.tables.push(TableSegment::new(name, start));
        self
    }

    /// Distinct logical table names in first-occurrence order.
    pub fn logical_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for table in &self.tables {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                names.push(&table.name);
            }
        }
        names
    }

    pub fn insert_row_count(&self) -> usize {
        self.insert.as_ref().map_or(0, |i| i.rows.len())
    }
}
