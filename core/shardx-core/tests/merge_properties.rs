// Merge & Rewrite Property Tests
//
// 무작위 입력에 대한 병합/재작성 불변식 검증

use proptest::prelude::*;
use shardx_core::config::{ConfigurationProperties, DatabaseType, RuleConfiguration};
use shardx_core::merge::MemoryRowStream;
use shardx_core::rewrite::{RenderTarget, SqlToken, SqlTokens};
use shardx_core::route::{ShardingCondition, ShardingConditionValue, ShardingConditions};
use shardx_core::rule::SchemaCatalog;
use shardx_core::sql::statement::{
    BoundStatement, OrderByItem, OrderBySegment, OrderDirection, PaginationSegment,
    PaginationValue, Projection, ProjectionsSegment, SelectSegments, StatementKind,
};
use shardx_core::sql::SelectStatementContext;
use shardx_core::{MergeEngine, RowStream, ScalarValue, ShardingEngine};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ─── Helpers ────────────────────────────────────────────

const ORDERED: &str = "SELECT v FROM t ORDER BY v";

fn ordered_select(window: Option<(u64, u64)>) -> SelectSegments {
    let select = SelectSegments::new(ProjectionsSegment {
        start: 7,
        stop: 8,
        items: vec![Projection::column("v")],
    })
    .with_order_by(OrderBySegment {
        items: vec![OrderByItem::column("v", OrderDirection::Asc)],
        start: 16,
        stop: ORDERED.len(),
    });
    match window {
        Some((offset, count)) => select.with_pagination(PaginationSegment {
            offset: Some(PaginationValue::literal(offset, ORDERED.len())),
            row_count: Some(PaginationValue::literal(count, ORDERED.len())),
        }),
        None => select,
    }
}

/// Each shard returns its rows already sorted, as the ORDER BY demands.
fn arb_shards() -> impl Strategy<Value = Vec<Vec<i64>>> {
    prop::collection::vec(prop::collection::vec(-50i64..50, 0..12), 1..6).prop_map(|mut shards| {
        for shard in &mut shards {
            shard.sort_unstable();
        }
        shards
    })
}

fn streams(shards: &[Vec<i64>]) -> (Vec<Box<dyn RowStream>>, Vec<Arc<AtomicUsize>>) {
    let mut counters = Vec::new();
    let streams = shards
        .iter()
        .enumerate()
        .map(|(i, rows)| {
            let stream = MemoryRowStream::new(
                &format!("ds_{i}"),
                rows.iter().map(|v| vec![ScalarValue::Int64(*v)]).collect(),
            );
            counters.push(stream.close_counter());
            Box::new(stream) as Box<dyn RowStream>
        })
        .collect();
    (streams, counters)
}

fn merge_all(shards: &[Vec<i64>], window: Option<(u64, u64)>) -> (Vec<i64>, Vec<Arc<AtomicUsize>>) {
    let context = SelectStatementContext::new(&ordered_select(window), &[], DatabaseType::MySql).unwrap();
    let (streams, counters) = streams(shards);
    let mut merged = MergeEngine::new()
        .merge(StatementKind::Select, Some(&context), streams)
        .unwrap();
    let mut values = Vec::new();
    while merged.next().unwrap() {
        values.push(merged.get(0).unwrap().as_i64().unwrap());
    }
    merged.close();
    (values, counters)
}

/// Non-overlapping spans over a text of `len` bytes.
fn arb_spans(len: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..=len, 0..=len), 0..6).prop_map(|pairs| {
        let mut spans: Vec<(usize, usize)> = pairs
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .filter(|(a, b)| a < b)
            .collect();
        spans.sort_unstable();
        let mut kept: Vec<(usize, usize)> = Vec::new();
        for span in spans {
            if kept.last().is_none_or(|last| last.1 <= span.0) {
                kept.push(span);
            }
        }
        kept
    })
}

const BINDING_RULE: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "tables": [
        { "logic_table": "t_order", "actual_data_nodes": "ds_${0..1}.t_order_${0..3}" },
        { "logic_table": "t_order_item", "actual_data_nodes": "ds_${0..1}.t_order_item_${0..3}" }
    ],
    "binding_tables": ["t_order, t_order_item"],
    "default_database_strategy": {
        "type": "inline", "sharding_column": "user_id", "algorithm_expression": "ds_${user_id % 2}"
    },
    "default_table_strategy": {
        "type": "inline", "sharding_column": "order_id", "algorithm_expression": "t_order_${order_id % 4}"
    }
}"#;

fn suffix(sql: &str, table: &str) -> String {
    let start = sql.find(&format!("{table}_")).unwrap() + table.len() + 1;
    sql[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Properties
// ═══════════════════════════════════════════════════════════

proptest! {
    /// k-way 병합 결과는 전체 행을 정렬한 결과와 같다
    #[test]
    fn ordered_merge_equals_sorted_concatenation(shards in arb_shards()) {
        let (merged, _) = merge_all(&shards, None);
        let mut expected: Vec<i64> = shards.concat();
        expected.sort_unstable();
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn pagination_is_a_window_of_the_ordered_result(
        shards in arb_shards(),
        offset in 0u64..20,
        count in 0u64..20,
    ) {
        let (merged, _) = merge_all(&shards, Some((offset, count)));
        let mut all: Vec<i64> = shards.concat();
        all.sort_unstable();
        let from = (offset as usize).min(all.len());
        let to = (from + count as usize).min(all.len());
        prop_assert_eq!(merged, all[from..to].to_vec());
    }

    /// 어떤 경로로 끝나든 모든 스트림은 정확히 한 번 닫힌다
    #[test]
    fn every_stream_is_closed_exactly_once(
        shards in arb_shards(),
        window in prop::option::of((0u64..10, 0u64..10)),
    ) {
        let (_, counters) = merge_all(&shards, window);
        for counter in counters {
            prop_assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn identity_tokens_render_the_original(
        (sql, spans) in "[a-z_ ,()=?]{0,40}".prop_flat_map(|sql| {
            let len = sql.len();
            (Just(sql), arb_spans(len))
        })
    ) {
        let tokens = spans
            .iter()
            .map(|(start, stop)| SqlToken::replace(*start, *stop, &sql[*start..*stop]))
            .collect();
        let tokens = SqlTokens::new(&sql, tokens).unwrap();
        prop_assert_eq!(tokens.render(&sql, &RenderTarget::default()), sql);
    }

    /// 바인딩 테이블은 항상 같은 접미사의 실제 테이블로 함께 라우팅된다
    #[test]
    fn bound_tables_share_their_suffix(user_id in 0i64..1000, order_id in prop::option::of(0i64..1000)) {
        let config = RuleConfiguration::from_json(BINDING_RULE).unwrap();
        let engine = ShardingEngine::from_config(
            &config,
            ConfigurationProperties::default(),
            SchemaCatalog::new(),
        )
        .unwrap();
        let sql = "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id";
        let statement = BoundStatement::new(StatementKind::Select)
            .with_table("t_order", 14)
            .with_table("t_order_item", sql.find("t_order_item").unwrap());
        let mut condition = ShardingCondition::new()
            .with(ShardingConditionValue::eq("t_order", "user_id", user_id));
        if let Some(order_id) = order_id {
            condition = condition.with(ShardingConditionValue::eq("t_order_item", "order_id", order_id));
        }
        let context = engine
            .prepare(&statement, &ShardingConditions::single(condition), sql, &[])
            .unwrap();

        let expected_units = if order_id.is_some() { 1 } else { 4 };
        prop_assert_eq!(context.units.len(), expected_units);
        for unit in &context.units {
            prop_assert_eq!(unit.data_source_name.clone(), format!("ds_{}", user_id % 2));
            prop_assert_eq!(suffix(&unit.sql, "t_order"), suffix(&unit.sql, "t_order_item"));
            if let Some(order_id) = order_id {
                prop_assert_eq!(suffix(&unit.sql, "t_order"), (order_id % 4).to_string());
            }
        }
    }
}
