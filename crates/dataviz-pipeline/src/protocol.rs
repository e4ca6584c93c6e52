use serde::{Deserialize, Serialize};

use crate::errors::ProtocolViolation;

/// Stage reported when the generation stream fails after it started.
pub const STAGE_LLM_PROCESSING: &str = "llm_processing";
/// Stage reported when a generation session could not be started.
pub const STAGE_SESSION_START: &str = "session_start";

/// Tabular result returned by the query engine and forwarded as `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

impl QueryResult {
    /// Builds a result whose `row_count` matches `rows`.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    /// Decodes and validates a result from an untyped JSON payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolViolation> {
        let result: Self = serde_json::from_value(value)
            .map_err(|e| ProtocolViolation::Malformed(e.to_string()))?;
        result.validate()?;
        Ok(result)
    }

    /// Checks `row_count == rows.len()` and that every row has one cell per
    /// column.
    pub fn validate(&self) -> Result<(), ProtocolViolation> {
        if self.row_count != self.rows.len() {
            return Err(ProtocolViolation::RowCountMismatch {
                row_count: self.row_count,
                rows: self.rows.len(),
            });
        }
        if let Some((row, cells)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.columns.len())
        {
            return Err(ProtocolViolation::RowArity {
                row,
                cells: cells.len(),
                columns: self.columns.len(),
            });
        }
        Ok(())
    }
}

/// Event sent to the chat client. One variant per event kind; the JSON body
/// of a frame carries the whole event including its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Full text of the current narration segment so far.
    Thought { content: String },
    /// Tool call narration, used instead of a `Thought` when tool calls are
    /// routed to their own event kind.
    ToolCall { tool_name: String, args: String },
    /// One fenced code block from a finished narration segment.
    Code { language: String, content: String },
    /// Rows returned by a `run_sql` call.
    Data(QueryResult),
    /// Terminal failure.
    Error { message: String, stage: String },
}

impl ProtocolEvent {
    pub fn error(message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            stage: stage.into(),
        }
    }

    /// Event name written on the frame's `event:` line.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::Code { .. } => "code",
            Self::Data(_) => "data",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_event_serializes_flat_with_type_tag() {
        let event = ProtocolEvent::Data(QueryResult::new(
            vec!["region".into(), "total".into()],
            vec![vec![json!("west"), json!(10)]],
        ));
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            json!({"type":"data","columns":["region","total"],"rows":[["west",10]],"row_count":1})
        );
        assert_eq!(event.kind(), "data");
    }

    #[test]
    fn error_event_carries_stage() {
        let event = ProtocolEvent::error("boom", STAGE_LLM_PROCESSING);
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            json!({"type":"error","message":"boom","stage":"llm_processing"})
        );
    }

    #[test]
    fn from_value_rejects_row_count_mismatch() {
        let err = QueryResult::from_value(json!({"columns":["a"],"rows":[[1],[2]],"row_count":3}))
            .expect_err("mismatch");
        assert_eq!(
            err,
            ProtocolViolation::RowCountMismatch {
                row_count: 3,
                rows: 2
            }
        );
    }

    #[test]
    fn from_value_rejects_ragged_rows() {
        let err = QueryResult::from_value(json!({"columns":["a","b"],"rows":[[1,2],[3]],"row_count":2}))
            .expect_err("ragged");
        assert!(matches!(err, ProtocolViolation::RowArity { row: 1, cells: 1, columns: 2 }));
    }

    #[test]
    fn from_value_rejects_missing_fields() {
        let err = QueryResult::from_value(json!({"detail":"nope"})).expect_err("malformed");
        assert!(matches!(err, ProtocolViolation::Malformed(_)));
    }

    #[test]
    fn from_value_accepts_null_cells() {
        let result =
            QueryResult::from_value(json!({"columns":["a"],"rows":[[null]],"row_count":1}))
                .expect("valid");
        assert_eq!(result.rows[0][0], serde_json::Value::Null);
    }
}
