// SQL 모듈 진입점: 바인딩된 문장 모델과 SELECT 컨텍스트
pub mod context;
pub mod statement;

pub use context::{
    AggregationColumn, DerivedProjection, OrderByColumn, Pagination, SelectStatementContext,
};
pub use statement::{BoundStatement, StatementKind, TableSegment};
