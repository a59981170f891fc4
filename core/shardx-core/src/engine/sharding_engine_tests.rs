//! End-to-end tests of the sharding engine over the order fixture.

use crate::config::ConfigurationProperties;
use crate::engine::{ExecutionUnit, ParallelExecutor, ShardingEngine};
use crate::error::{ShardxError, ShardxResult};
use crate::merge::{MemoryRowStream, RowStream};
use crate::route::condition::{ShardingCondition, ShardingConditionValue, ShardingConditions};
use crate::rule::SchemaCatalog;
use crate::rule::fixtures::order_rule;
use crate::sql::statement::{
    BoundStatement, InsertRowSegment, InsertSegments, InsertValue, OrderByItem, OrderBySegment,
    OrderDirection, PaginationSegment, PaginationValue, Projection, ProjectionsSegment,
    SelectSegments,
};
use crate::value::ScalarValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn engine() -> ShardingEngine {
    ShardingEngine::new(
        Arc::new(order_rule()),
        ConfigurationProperties::default(),
        SchemaCatalog::new(),
    )
}

fn at(sql: &str, needle: &str) -> usize {
    sql.find(needle).unwrap()
}

fn eq(column: &str, value: i64) -> ShardingConditionValue {
    ShardingConditionValue::eq("t_order", column, value)
}

const PAGED: &str = "SELECT order_id FROM t_order ORDER BY order_id LIMIT 1, 2";

fn paged_select() -> BoundStatement {
    let sql = PAGED;
    let select = SelectSegments::new(ProjectionsSegment {
        start: 7,
        stop: 15,
        items: vec![Projection::column("order_id")],
    })
    .with_order_by(OrderBySegment {
        items: vec![OrderByItem::column("order_id", OrderDirection::Asc)],
        start: at(sql, "ORDER"),
        stop: at(sql, " LIMIT"),
    })
    .with_pagination(PaginationSegment {
        offset: Some(PaginationValue::literal(1, at(sql, "1,"))),
        row_count: Some(PaginationValue::literal(2, at(sql, "2"))),
    });
    BoundStatement::select(select).with_table("t_order", at(sql, "t_order"))
}

/// Rows of `t_order_N`: order ids ending in N.
fn rows_for(unit: &ExecutionUnit) -> Vec<Vec<ScalarValue>> {
    let suffix: i64 = if unit.sql.contains("t_order_1") { 1 } else { 0 };
    let base: i64 = if unit.data_source_name == "ds_1" { 100 } else { 0 };
    (0..3)
        .map(|i| vec![ScalarValue::Int64(base + i * 2 + suffix)])
        .collect()
}

#[test]
fn test_prepare_and_merge_paged_full_scan() {
    let engine = engine();
    let context = engine
        .prepare(&paged_select(), &ShardingConditions::new(), PAGED, &[])
        .unwrap();
    assert_eq!(context.units.len(), 4);
    assert!(context.select_context.is_some());
    assert_eq!(
        context.units[3].sql,
        "SELECT order_id FROM t_order_1 ORDER BY order_id LIMIT 0, 3"
    );
    assert_eq!(context.units[3].data_source_name, "ds_1");

    let streams: Vec<Box<dyn RowStream>> = context
        .units
        .iter()
        .map(|u| Box::new(MemoryRowStream::new(&u.data_source_name, rows_for(u))) as Box<dyn RowStream>)
        .collect();
    let mut merged = engine.merge(&context, streams).unwrap();
    let mut ids = Vec::new();
    while merged.next().unwrap() {
        ids.push(merged.get(0).unwrap().clone());
    }
    // merged order: 0, 1, 2, 3, ... → skip 1, take 2
    assert_eq!(ids, vec![ScalarValue::Int64(1), ScalarValue::Int64(2)]);
}

#[test]
fn test_single_unit_select_is_untouched() {
    let engine = engine();
    let conditions = ShardingConditions::single(
        ShardingCondition::new().with(eq("user_id", 1)).with(eq("order_id", 4)),
    );
    let context = engine
        .prepare(&paged_select(), &conditions, PAGED, &[])
        .unwrap();
    assert!(context.select_context.is_none());
    assert_eq!(
        context.units,
        vec![ExecutionUnit {
            data_source_name: "ds_1".to_string(),
            sql: "SELECT order_id FROM t_order_0 ORDER BY order_id LIMIT 1, 2".to_string(),
            parameters: Vec::new(),
        }]
    );
}

const INSERT: &str = "INSERT INTO t_order (user_id, status) VALUES (?, ?), (?, ?)";

fn insert_statement() -> BoundStatement {
    let starts: Vec<usize> = INSERT.match_indices("(?").map(|(i, _)| i).collect();
    let rows = starts
        .iter()
        .enumerate()
        .map(|(r, start)| InsertRowSegment {
            start: *start,
            stop: start + "(?, ?)".len(),
            values: vec![InsertValue::Parameter(r * 2), InsertValue::Parameter(r * 2 + 1)],
        })
        .collect();
    BoundStatement::insert(InsertSegments {
        columns: vec!["user_id".to_string(), "status".to_string()],
        columns_stop: Some(at(INSERT, ") VALUES")),
        rows,
    })
    .with_table("t_order", at(INSERT, "t_order"))
}

#[test]
fn test_insert_generates_and_routes_by_key() {
    let engine = engine();
    let conditions = ShardingConditions::new()
        .with(ShardingCondition::new().with(eq("user_id", 1)))
        .with(ShardingCondition::new().with(eq("user_id", 2)));
    let parameters = vec![
        ScalarValue::Int64(1),
        ScalarValue::from("new"),
        ScalarValue::Int64(2),
        ScalarValue::from("paid"),
    ];
    let context = engine
        .prepare(&insert_statement(), &conditions, INSERT, &parameters)
        .unwrap();
    let key = context.generated_key.clone().unwrap();
    assert_eq!(key.column, "order_id");
    assert_eq!(key.values.len(), 2);
    assert_eq!(context.units.len(), 2);

    for (row, (ds, user, status)) in [("ds_1", 1, "new"), ("ds_0", 2, "paid")].into_iter().enumerate() {
        let value = key.value_for_row(row).unwrap().clone();
        let table = format!("t_order_{}", value.as_i64().unwrap() % 2);
        let unit = context
            .units
            .iter()
            .find(|u| u.data_source_name == ds)
            .unwrap();
        assert_eq!(
            unit.sql,
            format!("INSERT INTO {table} (user_id, status, order_id) VALUES (?, ?, ?)")
        );
        assert_eq!(
            unit.parameters,
            vec![ScalarValue::Int64(user), ScalarValue::from(status), value]
        );
    }
}

#[test]
fn test_insert_with_explicit_key_generates_nothing() {
    let sql = "INSERT INTO t_order (user_id, order_id) VALUES (1, 7)";
    let statement = BoundStatement::insert(InsertSegments {
        columns: vec!["user_id".to_string(), "order_id".to_string()],
        columns_stop: Some(at(sql, ") VALUES")),
        rows: vec![InsertRowSegment {
            start: at(sql, "(1"),
            stop: sql.len(),
            values: vec![
                InsertValue::Literal(ScalarValue::Int64(1)),
                InsertValue::Literal(ScalarValue::Int64(7)),
            ],
        }],
    })
    .with_table("t_order", at(sql, "t_order"));
    let conditions = ShardingConditions::single(
        ShardingCondition::new().with(eq("user_id", 1)).with(eq("order_id", 7)),
    );
    let context = engine().prepare(&statement, &conditions, sql, &[]).unwrap();
    assert!(context.generated_key.is_none());
    assert_eq!(
        context.units[0].sql,
        "INSERT INTO t_order_1 (user_id, order_id) VALUES (1, 7)"
    );
}

#[test]
fn test_execute_through_parallel_executor() {
    let engine = engine();
    let context = engine
        .prepare(&paged_select(), &ShardingConditions::new(), PAGED, &[])
        .unwrap();
    let pool = ParallelExecutor::new(2, 1).unwrap();
    let executed = AtomicUsize::new(0);
    let executor = |unit: &ExecutionUnit| -> ShardxResult<Box<dyn RowStream>> {
        executed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryRowStream::new(&unit.data_source_name, rows_for(unit))))
    };
    let mut merged = engine.execute(&context, &pool, &executor).unwrap();
    assert_eq!(executed.load(Ordering::SeqCst), 4);
    assert!(merged.next().unwrap());
    assert_eq!(merged.get(0).unwrap(), &ScalarValue::Int64(1));
    merged.close();
}

#[test]
fn test_failed_execution_closes_opened_streams() {
    let engine = engine();
    let context = engine
        .prepare(&paged_select(), &ShardingConditions::new(), PAGED, &[])
        .unwrap();
    let pool = ParallelExecutor::new(4, 2).unwrap();
    let closes = Arc::new(AtomicUsize::new(0));
    let executor = |unit: &ExecutionUnit| -> ShardxResult<Box<dyn RowStream>> {
        if unit.data_source_name == "ds_1" && unit.sql.contains("t_order_1") {
            return Err(ShardxError::Stream {
                data_source: unit.data_source_name.clone(),
                message: "connection refused".to_string(),
            });
        }
        let stream = MemoryRowStream::new(&unit.data_source_name, Vec::new());
        let counter = stream.close_counter();
        let shared = Arc::clone(&closes);
        Ok(Box::new(CountingStream {
            inner: stream,
            counter,
            shared,
        }))
    };
    let err = engine.execute(&context, &pool, &executor).err().unwrap();
    assert!(matches!(err, ShardxError::Stream { .. }));
    assert_eq!(closes.load(Ordering::SeqCst), 3);
}

/// Forwards closes of one stream into a counter shared by all of them.
struct CountingStream {
    inner: MemoryRowStream,
    counter: Arc<AtomicUsize>,
    shared: Arc<AtomicUsize>,
}

impl RowStream for CountingStream {
    fn next_row(&mut self) -> ShardxResult<Option<Vec<ScalarValue>>> {
        self.inner.next_row()
    }

    fn close(&mut self) {
        self.inner.close();
        if self.counter.load(Ordering::SeqCst) == 1 {
            self.shared.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_zero_threads_rejected() {
    assert!(matches!(
        ParallelExecutor::new(0, 1),
        Err(ShardxError::InvalidArguments(_))
    ));
}
