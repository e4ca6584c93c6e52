use std::time::Duration;

use crate::errors::EngineError;

use super::QueryEngine;

/// [`QueryEngine`] backed by the HTTP query service
/// (`POST {base}/query/local_duckdb` with `{"sql": ...}`).
#[derive(Clone)]
pub struct HttpQueryEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQueryEngine {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            EngineError::Unreachable(format!("failed to build query engine client: {e}"))
        })?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn query_url(&self) -> String {
        format!("{}/query/local_duckdb", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl QueryEngine for HttpQueryEngine {
    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, EngineError> {
        let response = self
            .client
            .post(self.query_url())
            .timeout(timeout)
            .json(&serde_json::json!({ "sql": sql }))
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(describe(&e, timeout)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Unreachable(describe(&e, timeout)))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| EngineError::Decode(e.to_string()));
        }

        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("detail").cloned())
            .map(|detail| match detail {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            });
        Err(match detail {
            Some(detail) => EngineError::Query {
                status: status.as_u16(),
                detail,
            },
            None => EngineError::Http {
                status: status.as_u16(),
                body,
            },
        })
    }
}

fn describe(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("no response within {}s", timeout.as_secs_f32())
    } else {
        err.to_string()
    }
}
