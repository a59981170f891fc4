// 런타임 속성 (ConfigurationProperties)
//
// JSON 파일에서 로드하고, 환경 변수 SHARDX_PROPS_<KEY> 로 덮어쓸 수 있습니다.

use crate::error::{ShardxError, ShardxResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Dialect of the physical data sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    MySql,
    PostgreSql,
    OpenGauss,
    H2,
    Sql92,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::MySql => "mysql",
            DatabaseType::PostgreSql => "postgresql",
            DatabaseType::OpenGauss => "opengauss",
            DatabaseType::H2 => "h2",
            DatabaseType::Sql92 => "sql92",
        }
    }

    pub fn parse_type(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Some(DatabaseType::MySql),
            "postgresql" | "postgres" => Some(DatabaseType::PostgreSql),
            "opengauss" => Some(DatabaseType::OpenGauss),
            "h2" => Some(DatabaseType::H2),
            "sql92" => Some(DatabaseType::Sql92),
            _ => None,
        }
    }

    /// Whether NULL sorts as the smallest value when the query gives no
    /// explicit NULLS FIRST/LAST.
    pub fn null_is_smallest(&self) -> bool {
        !matches!(self, DatabaseType::PostgreSql | DatabaseType::OpenGauss)
    }
}

/// 파이프라인 런타임 속성
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationProperties {
    /// Log every rewritten execution unit at info level
    pub sql_show: bool,
    /// Permit cartesian routes across unbound table groups
    pub allow_cartesian_route: bool,
    /// Fail routing when more units than this would be produced
    pub max_route_units: Option<usize>,
    /// Upper bound of concurrent connections one statement may use per data source
    pub max_connections_size_per_query: usize,
    pub database_type: DatabaseType,
}

impl Default for ConfigurationProperties {
    fn default() -> Self {
        Self {
            sql_show: false,
            allow_cartesian_route: false,
            max_route_units: None,
            max_connections_size_per_query: 1,
            database_type: DatabaseType::default(),
        }
    }
}

impl ConfigurationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> ShardxResult<Self> {
        let props: Self = serde_json::from_str(json)?;
        props.validate()?;
        Ok(props)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ShardxResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Environment variable name for a property key.
    pub fn env_var_name(key: &str) -> String {
        format!("SHARDX_PROPS_{}", key.to_uppercase())
    }

    /// Override properties from `SHARDX_PROPS_*` environment variables.
    pub fn load_from_env(&mut self) -> ShardxResult<()> {
        if let Ok(value) = env::var(Self::env_var_name("sql_show")) {
            self.sql_show = parse_bool(&value);
        }
        if let Ok(value) = env::var(Self::env_var_name("allow_cartesian_route")) {
            self.allow_cartesian_route = parse_bool(&value);
        }
        if let Ok(value) = env::var(Self::env_var_name("max_route_units")) {
            self.max_route_units = if value.is_empty() {
                None
            } else {
                Some(parse_usize("max_route_units", &value)?)
            };
        }
        if let Ok(value) = env::var(Self::env_var_name("max_connections_size_per_query")) {
            self.max_connections_size_per_query =
                parse_usize("max_connections_size_per_query", &value)?;
        }
        if let Ok(value) = env::var(Self::env_var_name("database_type")) {
            self.database_type = DatabaseType::parse_type(&value).ok_or_else(|| {
                ShardxError::config(format!("unknown database type '{value}'"))
            })?;
        }
        self.validate()
    }

    fn validate(&self) -> ShardxResult<()> {
        if self.max_connections_size_per_query == 0 {
            return Err(ShardxError::config(
                "max_connections_size_per_query must be greater than 0",
            ));
        }
        if self.max_route_units == Some(0) {
            return Err(ShardxError::config("max_route_units must be greater than 0"));
        }
        Ok(())
    }

    pub fn with_sql_show(mut self, enabled: bool) -> Self {
        self.sql_show = enabled;
        self
    }

    pub fn with_cartesian_route(mut self, allowed: bool) -> Self {
        self.allow_cartesian_route = allowed;
        self
    }

    pub fn with_max_route_units(mut self, limit: usize) -> Self {
        self.max_route_units = Some(limit);
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections_size_per_query = max;
        self
    }

    pub fn with_database_type(mut self, database_type: DatabaseType) -> Self {
        self.database_type = database_type;
        self
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn parse_usize(key: &str, value: &str) -> ShardxResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| ShardxError::config(format!("property '{key}' expects a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let props = ConfigurationProperties::default();
        assert!(!props.sql_show);
        assert!(!props.allow_cartesian_route);
        assert_eq!(props.max_route_units, None);
        assert_eq!(props.max_connections_size_per_query, 1);
        assert_eq!(props.database_type, DatabaseType::MySql);
    }

    #[test]
    fn test_from_json_partial() {
        let props = ConfigurationProperties::from_json(
            r#"{ "sql_show": true, "database_type": "postgresql" }"#,
        )
        .unwrap();
        assert!(props.sql_show);
        assert_eq!(props.database_type, DatabaseType::PostgreSql);
        assert_eq!(props.max_connections_size_per_query, 1);
    }

    #[test]
    fn test_zero_connections_rejected() {
        let err = ConfigurationProperties::from_json(r#"{ "max_connections_size_per_query": 0 }"#)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_env_override() {
        let mut props = ConfigurationProperties::default();

        // 환경 변수 설정 (unsafe)
        unsafe {
            env::set_var("SHARDX_PROPS_ALLOW_CARTESIAN_ROUTE", "1");
            env::set_var("SHARDX_PROPS_MAX_ROUTE_UNITS", "64");
        }

        props.load_from_env().unwrap();
        assert!(props.allow_cartesian_route);
        assert_eq!(props.max_route_units, Some(64));

        // 정리 (unsafe)
        unsafe {
            env::remove_var("SHARDX_PROPS_ALLOW_CARTESIAN_ROUTE");
            env::remove_var("SHARDX_PROPS_MAX_ROUTE_UNITS");
        }
    }

    #[test]
    fn test_null_ordering_by_dialect() {
        assert!(DatabaseType::MySql.null_is_smallest());
        assert!(DatabaseType::H2.null_is_smallest());
        assert!(!DatabaseType::PostgreSql.null_is_smallest());
        assert_eq!(DatabaseType::parse_type("Postgres"), Some(DatabaseType::PostgreSql));
    }
}
