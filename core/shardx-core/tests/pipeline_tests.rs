// Pipeline Integration Tests
//
// 종단 간 통합 테스트: prepare → 인메모리 스트림 → merge

use shardx_core::config::{ConfigurationProperties, RuleConfiguration};
use shardx_core::engine::{ExecutionUnit, ShardingEngine};
use shardx_core::merge::MemoryRowStream;
use shardx_core::route::{ShardingCondition, ShardingConditionValue, ShardingConditions};
use shardx_core::rule::SchemaCatalog;
use shardx_core::sql::statement::{
    AggregationType, BoundStatement, GroupBySegment, OrderByItem, OrderDirection, Projection,
    ProjectionsSegment, SelectSegments, StatementKind,
};
use shardx_core::{RowStream, ScalarValue, ShardxError};
use std::io::Write;

// ─── Helpers ────────────────────────────────────────────

const RULE: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "tables": [
        { "logic_table": "t_order", "actual_data_nodes": "ds_${0..1}.t_order_${0..1}" },
        { "logic_table": "t_order_item", "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}" },
        { "logic_table": "t_user", "actual_data_nodes": "ds_${0..1}.t_user_${0..3}",
          "table_strategy": { "type": "standard", "sharding_column": "user_id", "algorithm": "user_hash" } }
    ],
    "binding_tables": ["t_order, t_order_item"],
    "broadcast_tables": ["t_config"],
    "default_database_strategy": {
        "type": "inline", "sharding_column": "user_id", "algorithm_expression": "ds_${user_id % 2}"
    },
    "default_table_strategy": {
        "type": "standard", "sharding_column": "order_id", "algorithm": "order_mod"
    },
    "sharding_algorithms": {
        "order_mod": { "type": "MOD", "props": { "sharding-count": "2" } },
        "user_hash": { "type": "HASH_MOD", "props": { "sharding-count": "4" } }
    }
}"#;

fn engine(props: ConfigurationProperties) -> ShardingEngine {
    shardx_core::logging::init_test();
    let config = RuleConfiguration::from_json(RULE).unwrap();
    ShardingEngine::from_config(&config, props, SchemaCatalog::new()).unwrap()
}

fn at(sql: &str, needle: &str) -> usize {
    sql.find(needle).unwrap()
}

fn eq(table: &str, column: &str, value: i64) -> ShardingConditionValue {
    ShardingConditionValue::eq(table, column, value)
}

fn table_occurrences(sql: &str, names: &[&str], kind: StatementKind) -> BoundStatement {
    let mut statement = BoundStatement::new(kind);
    for name in names {
        for (start, _) in sql.match_indices(name) {
            // skip prefixes of longer names (t_order inside t_order_item)
            let next = sql[start + name.len()..].chars().next();
            if next.is_some_and(|c| c.is_alphanumeric() || c == '_') {
                continue;
            }
            statement = statement.with_table(name, start);
        }
    }
    statement.tables.sort_by_key(|t| t.start);
    statement
}

fn memory_streams(units: &[ExecutionUnit], rows: impl Fn(&ExecutionUnit) -> Vec<Vec<ScalarValue>>) -> Vec<Box<dyn RowStream>> {
    units
        .iter()
        .map(|u| Box::new(MemoryRowStream::new(&u.data_source_name, rows(u))) as Box<dyn RowStream>)
        .collect()
}

fn row(values: &[i64]) -> Vec<ScalarValue> {
    values.iter().map(|v| ScalarValue::Int64(*v)).collect()
}

// ═══════════════════════════════════════════════════════════
// 라우팅 + 재작성
// ═══════════════════════════════════════════════════════════

/// 바인딩 테이블 조인은 같은 서수의 실제 테이블로 라우팅된다
#[test]
fn test_binding_join_routes_by_same_ordinal() {
    let engine = engine(ConfigurationProperties::default());
    let sql = "SELECT i.* FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = ?";
    let statement = table_occurrences(sql, &["t_order", "t_order_item"], StatementKind::Select);
    let conditions = ShardingConditions::single(ShardingCondition::new().with(eq("t_order", "user_id", 1)));
    let context = engine
        .prepare(&statement, &conditions, sql, &[ScalarValue::Int64(1)])
        .unwrap();
    let sqls: Vec<&str> = context.units.iter().map(|u| u.sql.as_str()).collect();
    assert_eq!(
        sqls,
        vec![
            "SELECT i.* FROM t_order_0 o JOIN t_order_item_0 i ON o.order_id = i.order_id WHERE o.user_id = ?",
            "SELECT i.* FROM t_order_1 o JOIN t_order_item_1 i ON o.order_id = i.order_id WHERE o.user_id = ?",
        ]
    );
    for unit in &context.units {
        assert_eq!(unit.data_source_name, "ds_1");
        assert_eq!(unit.parameters, vec![ScalarValue::Int64(1)]);
    }
}

/// GROUP BY + AVG: 파생 컬럼과 ORDER BY 주입 후 스트림 그룹 병합
#[test]
fn test_grouped_avg_across_shards() {
    let engine = engine(ConfigurationProperties::default());
    let sql = "SELECT user_id, AVG(price) FROM t_order GROUP BY user_id";
    let select = SelectSegments::new(ProjectionsSegment {
        start: 7,
        stop: at(sql, " FROM"),
        items: vec![
            Projection::column("user_id"),
            Projection::aggregation(AggregationType::Avg, "price"),
        ],
    })
    .with_group_by(GroupBySegment {
        items: vec![OrderByItem::column("user_id", OrderDirection::Asc)],
        stop: sql.len(),
    });
    let statement = BoundStatement::select(select).with_table("t_order", at(sql, "t_order"));
    let context = engine
        .prepare(&statement, &ShardingConditions::new(), sql, &[])
        .unwrap();
    assert_eq!(context.units.len(), 4);
    assert_eq!(
        context.units[0].sql,
        "SELECT user_id, AVG(price), COUNT(price) AS AVG_DERIVED_COUNT_0, SUM(price) AS AVG_DERIVED_SUM_0 \
         FROM t_order_0 GROUP BY user_id ORDER BY user_id ASC"
    );

    // user_id, AVG(price), COUNT(price), SUM(price)
    let streams = memory_streams(&context.units, |unit| {
        if unit.data_source_name == "ds_0" {
            vec![row(&[2, 5, 2, 10])]
        } else {
            vec![row(&[1, 5, 1, 5]), row(&[3, 10, 3, 30])]
        }
    });
    let mut merged = engine.merge(&context, streams).unwrap();
    let mut groups = Vec::new();
    while merged.next().unwrap() {
        groups.push((merged.get(0).unwrap().clone(), merged.get(1).unwrap().clone()));
    }
    assert_eq!(
        groups,
        vec![
            (ScalarValue::Int64(1), ScalarValue::Float64(5.0)),
            (ScalarValue::Int64(2), ScalarValue::Float64(5.0)),
            (ScalarValue::Int64(3), ScalarValue::Float64(10.0)),
        ]
    );
}

/// 브로드캐스트 테이블 갱신은 모든 데이터 소스로 같은 파라미터와 함께 전달된다
#[test]
fn test_broadcast_update_goes_everywhere() {
    let engine = engine(ConfigurationProperties::default());
    let sql = "UPDATE t_config SET v = ? WHERE k = ?";
    let statement = table_occurrences(sql, &["t_config"], StatementKind::Update);
    let parameters = vec![ScalarValue::from("on"), ScalarValue::from("flag")];
    let context = engine
        .prepare(&statement, &ShardingConditions::new(), sql, &parameters)
        .unwrap();
    let targets: Vec<&str> = context.units.iter().map(|u| u.data_source_name.as_str()).collect();
    assert_eq!(targets, vec!["ds_0", "ds_1"]);
    assert!(context.units.iter().all(|u| u.sql == sql && u.parameters == parameters));
}

#[test]
fn test_cartesian_rejected_unless_allowed() {
    let sql = "SELECT * FROM t_order, t_user";
    let statement = table_occurrences(sql, &["t_order", "t_user"], StatementKind::Select);
    let err = engine(ConfigurationProperties::default())
        .prepare(&statement, &ShardingConditions::new(), sql, &[])
        .unwrap_err();
    assert!(matches!(err, ShardxError::UnsupportedCartesianRoute { .. }));

    let props = ConfigurationProperties::default().with_cartesian_route(true);
    let context = engine(props)
        .prepare(&statement, &ShardingConditions::new(), sql, &[])
        .unwrap();
    // 2 order tables x 4 user tables per data source
    assert_eq!(context.units.len(), 16);
    assert!(context
        .units
        .iter()
        .all(|u| u.sql.starts_with("SELECT * FROM t_order_") && u.sql.contains(", t_user_")));
}

#[test]
fn test_fan_out_cap() {
    let sql = "SELECT * FROM t_order";
    let statement = table_occurrences(sql, &["t_order"], StatementKind::Select);
    let err = engine(ConfigurationProperties::default().with_max_route_units(2))
        .prepare(&statement, &ShardingConditions::new(), sql, &[])
        .unwrap_err();
    assert!(matches!(err, ShardxError::RoutingOverBroad { units: 4, limit: 2 }));
}

#[test]
fn test_unknown_table() {
    let sql = "SELECT * FROM t_missing";
    let statement = table_occurrences(sql, &["t_missing"], StatementKind::Select);
    let err = engine(ConfigurationProperties::default())
        .prepare(&statement, &ShardingConditions::new(), sql, &[])
        .unwrap_err();
    assert!(matches!(err, ShardxError::UnroutableTable { ref table } if table == "t_missing"));
}

/// 파일에서 읽은 룰로 HASH_MOD 라우팅
#[test]
fn test_rule_loaded_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rule.json");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(RULE.as_bytes())
        .unwrap();
    let config = RuleConfiguration::from_file(&path).unwrap();
    let engine =
        ShardingEngine::from_config(&config, ConfigurationProperties::default(), SchemaCatalog::new()).unwrap();

    let sql = "SELECT name FROM t_user WHERE user_id = 5";
    let statement = table_occurrences(sql, &["t_user"], StatementKind::Select);
    let conditions = ShardingConditions::single(ShardingCondition::new().with(eq("t_user", "user_id", 5)));
    let context = engine.prepare(&statement, &conditions, sql, &[]).unwrap();
    assert_eq!(context.units.len(), 1);
    assert_eq!(context.units[0].data_source_name, "ds_1");
    assert_eq!(context.units[0].sql, "SELECT name FROM t_user_1 WHERE user_id = 5");
}
