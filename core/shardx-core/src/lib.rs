//! # ShardX — Sharding Middleware Core
//!
//! ShardX는 하나의 논리 스키마를 여러 데이터 소스에 분산된 물리 테이블로 매핑하는
//! 샤딩 미들웨어의 핵심 파이프라인입니다. 논리 SQL 한 문장을 N 개의 물리 실행으로
//! 바꾸고, N 개의 결과 스트림을 다시 하나의 논리 결과로 병합합니다.
//!
//! ## 주요 특징
//!
//! - **라우팅**: standard / complex / hint / inline 전략, 바인딩 테이블, 브로드캐스트 테이블
//! - **재작성**: 테이블 이름, 페이지네이션, 파생 컬럼, ORDER BY 주입, 생성 키
//! - **키 생성**: SNOWFLAKE, UUID, INCREMENT
//! - **병합**: k-way 정렬 병합, 그룹 병합(스트림/메모리), LIMIT 데코레이터
//!
//! ## 빠른 시작
//!
//! ```rust
//! use shardx_core::config::{ConfigurationProperties, RuleConfiguration};
//! use shardx_core::route::{ShardingCondition, ShardingConditionValue, ShardingConditions};
//! use shardx_core::rule::SchemaCatalog;
//! use shardx_core::sql::statement::{BoundStatement, StatementKind};
//! use shardx_core::{ScalarValue, ShardingEngine};
//!
//! # fn main() -> shardx_core::ShardxResult<()> {
//! let config = RuleConfiguration::from_json(
//!     r#"{
//!         "data_sources": ["ds_0", "ds_1"],
//!         "tables": [{ "logic_table": "t_order", "actual_data_nodes": "ds_${0..1}.t_order" }],
//!         "default_database_strategy": {
//!             "type": "inline", "sharding_column": "user_id", "algorithm_expression": "ds_${user_id % 2}"
//!         }
//!     }"#,
//! )?;
//! let engine = ShardingEngine::from_config(&config, ConfigurationProperties::default(), SchemaCatalog::new())?;
//!
//! let sql = "SELECT * FROM t_order WHERE user_id = ?";
//! let statement = BoundStatement::new(StatementKind::Select).with_table("t_order", 14);
//! let conditions = ShardingConditions::single(
//!     ShardingCondition::new().with(ShardingConditionValue::eq("t_order", "user_id", 7)),
//! );
//! let context = engine.prepare(&statement, &conditions, sql, &[ScalarValue::Int64(7)])?;
//! assert_eq!(context.units.len(), 1);
//! assert_eq!(context.units[0].data_source_name, "ds_1");
//! # Ok(())
//! # }
//! ```
//!
//! ## 파이프라인
//!
//! ```text
//! BoundStatement + ShardingConditions
//!     → (키 생성) → RouteEngine → RouteContext
//!     → RewriteEngine → [ExecutionUnit]
//!     → (외부 실행기) → [RowStream] → MergeEngine → MergedResult
//! ```
//!
//! ## 모듈 구조
//!
//! - [`config`] — 룰 설정과 런타임 속성
//! - [`rule`] — 검증된 샤딩 룰, 알고리즘, 전략
//! - [`route`] — 라우팅 엔진
//! - [`rewrite`] — SQL 토큰과 파라미터 재작성
//! - [`keygen`] — 분산 키 생성
//! - [`merge`] — 결과 병합
//! - [`engine`] — 파이프라인 파사드와 병렬 실행

pub mod config;
pub mod engine;
pub mod error;
pub mod keygen;
pub mod merge;
pub mod rewrite;
pub mod route;
pub mod rule;
pub mod sql;
pub mod value;

// Logging utilities
pub mod logging;

// ===== Re-exports =====
pub use engine::{ExecutionContext, ExecutionUnit, ShardingEngine};
pub use error::{ShardxError, ShardxResult};
pub use merge::{MergeEngine, MergedResult, RowStream};
pub use value::{Row, ScalarValue};
