//! `run_sql` tool: request shape, limiting policy and dispatch to the query
//! engine.

mod http;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dataviz_ai_harness::{Tool, ToolError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{EngineError, ToolExecutionError};
use crate::protocol::QueryResult;

pub use http::HttpQueryEngine;

/// Name the model uses to call the SQL tool.
pub const RUN_SQL: &str = "run_sql";
/// Row limit applied when the model does not pass one.
pub const DEFAULT_LIMIT: i64 = 1000;
/// Bound on one query engine round trip.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Duckdb,
}

/// Arguments of a `run_sql` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlToolRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub data_source: DataSource,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl SqlToolRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_LIMIT,
            data_source: DataSource::Duckdb,
        }
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Appends ` LIMIT <limit>` to a `SELECT` that has no `LIMIT` token of its
/// own, dropping one trailing `;` first. Everything else is returned as-is.
pub fn limit_query(query: &str, limit: i64) -> String {
    let trimmed = query.trim();
    let upper = trimmed.to_uppercase();
    if limit > 0 && !has_limit_token(&upper) && upper.starts_with("SELECT") {
        let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        return format!("{statement} LIMIT {limit}");
    }
    query.to_string()
}

fn has_limit_token(upper: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    upper.match_indices("LIMIT").any(|(start, token)| {
        let before = upper[..start].chars().next_back();
        let after = upper[start + token.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Executes SQL against an analytical engine.
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync {
    /// Runs `sql` and returns the engine's raw JSON result.
    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, EngineError>;
}

/// Applies the limiting policy, dispatches to the engine and validates the
/// result.
#[derive(Clone)]
pub struct SqlBridge {
    engine: Arc<dyn QueryEngine>,
    timeout: Duration,
}

impl SqlBridge {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            engine,
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Overrides the round trip bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run_sql(&self, request: &SqlToolRequest) -> Result<QueryResult, ToolExecutionError> {
        if request.query.trim().is_empty() {
            return Err(ToolExecutionError::InvalidArguments(
                "query must not be empty".into(),
            ));
        }
        let sql = limit_query(&request.query, request.limit);
        debug!(
            event = "sql.dispatch",
            data_source = ?request.data_source,
            limit = request.limit,
            sql = %sql
        );

        let started = Instant::now();
        let value = self
            .engine
            .execute(&sql, self.timeout)
            .await
            .map_err(|err| {
                warn!(event = "sql.failed", error = %err, elapsed_ms = started.elapsed().as_millis() as u64);
                ToolExecutionError::from(err)
            })?;
        let result = QueryResult::from_value(value).map_err(|err| {
            warn!(event = "sql.malformed_result", error = %err);
            ToolExecutionError::from(err)
        })?;
        info!(
            event = "sql.completed",
            rows = result.row_count,
            columns = result.columns.len(),
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        Ok(result)
    }
}

/// The bridge exposed to the model as the `run_sql` tool.
pub struct SqlTool {
    bridge: SqlBridge,
}

impl SqlTool {
    pub fn new(bridge: SqlBridge) -> Self {
        Self { bridge }
    }
}

#[async_trait::async_trait]
impl Tool for SqlTool {
    fn name(&self) -> &str {
        RUN_SQL
    }

    fn description(&self) -> &str {
        "Execute a SQL query against the local DuckDB engine. Returns the result as \
         {columns, rows, row_count}. SELECT queries are capped at `limit` rows."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL statement to execute."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum rows returned by a SELECT without its own LIMIT.",
                    "default": DEFAULT_LIMIT
                },
                "data_source": {
                    "type": "string",
                    "enum": ["duckdb"],
                    "default": "duckdb"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: &str) -> Result<serde_json::Value, ToolError> {
        let request: SqlToolRequest = serde_json::from_str(args)
            .map_err(|e| ToolError::invalid_arguments(RUN_SQL, e.to_string()))?;
        let result = self
            .bridge
            .run_sql(&request)
            .await
            .map_err(|e| ToolError::execution(RUN_SQL, e.to_string()))?;
        serde_json::to_value(&result).map_err(|e| ToolError::execution(RUN_SQL, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProtocolViolation;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn bridge_for(server: &MockServer) -> SqlBridge {
        let engine = HttpQueryEngine::new(server.uri()).expect("engine");
        SqlBridge::new(Arc::new(engine))
    }

    #[test]
    fn limit_is_appended_to_plain_select() {
        assert_eq!(
            limit_query("SELECT * FROM t", 1000),
            "SELECT * FROM t LIMIT 1000"
        );
    }

    #[test]
    fn existing_limit_is_left_alone() {
        assert_eq!(
            limit_query("SELECT * FROM t LIMIT 5", 1000),
            "SELECT * FROM t LIMIT 5"
        );
        assert_eq!(
            limit_query("select * from t limit 5", 1000),
            "select * from t limit 5"
        );
    }

    #[test]
    fn non_select_is_forwarded_verbatim() {
        assert_eq!(
            limit_query("CREATE TABLE t(x int)", 1000),
            "CREATE TABLE t(x int)"
        );
        assert_eq!(
            limit_query("  DESCRIBE t  ", 1000),
            "  DESCRIBE t  "
        );
    }

    #[test]
    fn trailing_terminator_is_dropped_before_limit() {
        assert_eq!(
            limit_query("select * from t;", 10),
            "select * from t LIMIT 10"
        );
    }

    #[test]
    fn non_positive_limit_disables_limiting() {
        assert_eq!(limit_query("SELECT 1", 0), "SELECT 1");
        assert_eq!(limit_query("SELECT 1", -5), "SELECT 1");
    }

    #[test]
    fn limit_token_needs_word_boundaries() {
        assert_eq!(
            limit_query("SELECT limited FROM t", 10),
            "SELECT limited FROM t LIMIT 10"
        );
        assert_eq!(
            limit_query("SELECT * FROM t\nLIMIT\n3", 10),
            "SELECT * FROM t\nLIMIT\n3"
        );
    }

    #[test]
    fn request_defaults_apply() {
        let request: SqlToolRequest =
            serde_json::from_str(r#"{"query":"SELECT 1"}"#).expect("request");
        assert_eq!(request, SqlToolRequest::new("SELECT 1"));
        assert_eq!(request.limit, 1000);
        assert_eq!(request.data_source, DataSource::Duckdb);
    }

    #[test]
    fn unknown_data_source_is_rejected() {
        let err = serde_json::from_str::<SqlToolRequest>(
            r#"{"query":"SELECT 1","data_source":"postgres"}"#,
        );
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn run_sql_posts_limited_sql_and_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/local_duckdb"))
            .and(body_json(json!({"sql": "SELECT region FROM sales LIMIT 1000"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"columns":["region"],"rows":[["west"],["east"]],"row_count":2}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let result = bridge_for(&server)
            .await
            .run_sql(&SqlToolRequest::new("SELECT region FROM sales;"))
            .await
            .expect("query");
        assert_eq!(result.columns, vec!["region"]);
        assert_eq!(result.row_count, 2);
    }

    #[tokio::test]
    async fn engine_detail_is_returned_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/local_duckdb"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"detail":"SQL execution error: Parser Error: syntax error at or near \"SELEC\""}),
            ))
            .mount(&server)
            .await;

        let err = bridge_for(&server)
            .await
            .run_sql(&SqlToolRequest::new("SELEC 1"))
            .await
            .expect_err("bad sql");
        assert_eq!(
            err,
            ToolExecutionError::Query(
                "SQL execution error: Parser Error: syntax error at or near \"SELEC\"".into()
            )
        );
    }

    #[tokio::test]
    async fn server_error_without_detail_is_engine_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/local_duckdb"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = bridge_for(&server)
            .await
            .run_sql(&SqlToolRequest::new("SELECT 1"))
            .await
            .expect_err("502");
        assert!(matches!(err, ToolExecutionError::Engine(msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn non_conforming_success_is_protocol_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/local_duckdb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"columns":["a"],"rows":[[1]],"row_count":5}),
            ))
            .mount(&server)
            .await;

        let err = bridge_for(&server)
            .await
            .run_sql(&SqlToolRequest::new("SELECT 1"))
            .await
            .expect_err("mismatch");
        assert!(matches!(err, ToolExecutionError::Protocol(_)));
    }

    #[tokio::test]
    async fn non_json_success_body_is_protocol_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/local_duckdb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let err = bridge_for(&server)
            .await
            .run_sql(&SqlToolRequest::new("SELECT 1"))
            .await
            .expect_err("not json");
        assert!(matches!(
            err,
            ToolExecutionError::Protocol(ProtocolViolation::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn slow_engine_is_reported_as_connect_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/local_duckdb"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(json!({"columns":[],"rows":[],"row_count":0})),
            )
            .mount(&server)
            .await;

        let err = bridge_for(&server)
            .await
            .with_timeout(Duration::from_millis(100))
            .run_sql(&SqlToolRequest::new("SELECT 1"))
            .await
            .expect_err("timeout");
        assert!(
            err.to_string().starts_with("failed to connect to query engine"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn unreachable_engine_is_reported_as_connect_failure() {
        let engine = HttpQueryEngine::new("http://127.0.0.1:1").expect("engine");
        let err = SqlBridge::new(Arc::new(engine))
            .run_sql(&SqlToolRequest::new("SELECT 1"))
            .await
            .expect_err("unreachable");
        assert!(matches!(err, ToolExecutionError::Connect(_)));
    }

    #[tokio::test]
    async fn tool_rejects_invalid_arguments() {
        let engine = HttpQueryEngine::new("http://127.0.0.1:1").expect("engine");
        let tool = SqlTool::new(SqlBridge::new(Arc::new(engine)));
        let err = tool.call(r#"{"limit":5}"#).await.expect_err("missing query");
        assert!(matches!(err, ToolError::InvalidArguments { tool, .. } if tool == RUN_SQL));
    }

    #[tokio::test]
    async fn tool_returns_query_result_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/local_duckdb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"columns":["n"],"rows":[["1"]],"row_count":1}),
            ))
            .mount(&server)
            .await;

        let tool = SqlTool::new(bridge_for(&server).await);
        let value = tool.call(r#"{"query":"SELECT 1 AS n"}"#).await.expect("ok");
        assert_eq!(value, json!({"columns":["n"],"rows":[["1"]],"row_count":1}));
        assert_eq!(tool.parameters()["required"], json!(["query"]));
    }
}
