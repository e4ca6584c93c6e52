use dataviz_ai_harness::{HarnessError, RunFailure};

/// A payload that does not have the shape the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("query result is malformed: {0}")]
    Malformed(String),
    #[error("query result reports row_count {row_count} but carries {rows} rows")]
    RowCountMismatch { row_count: usize, rows: usize },
    #[error("query result row {row} has {cells} cells for {columns} columns")]
    RowArity {
        row: usize,
        cells: usize,
        columns: usize,
    },
}

/// Failure reported by a [`QueryEngine`](crate::bridge::QueryEngine).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine rejected the query and described why.
    #[error("{detail}")]
    Query { status: u16, detail: String },
    /// The engine could not be reached or did not answer in time.
    #[error("{0}")]
    Unreachable(String),
    /// Non-success status without a usable description.
    #[error("query engine returned status {status}: {body}")]
    Http { status: u16, body: String },
    /// Success status with a body that is not JSON.
    #[error("query engine returned an unreadable body: {0}")]
    Decode(String),
}

/// Failure of one `run_sql` invocation. Returned to the model as the tool's
/// output; it never ends the stream by itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolExecutionError {
    #[error("invalid run_sql arguments: {0}")]
    InvalidArguments(String),
    /// The engine's own description, verbatim.
    #[error("{0}")]
    Query(String),
    #[error("failed to connect to query engine: {0}")]
    Connect(String),
    #[error("query engine error: {0}")]
    Engine(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

impl From<EngineError> for ToolExecutionError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Query { detail, .. } => Self::Query(detail),
            EngineError::Unreachable(message) => Self::Connect(message),
            EngineError::Decode(message) => {
                Self::Protocol(ProtocolViolation::Malformed(message))
            }
            other @ EngineError::Http { .. } => Self::Engine(other.to_string()),
        }
    }
}

/// Failure while starting or iterating a generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Run(#[from] RunFailure),
    #[error(transparent)]
    Harness(#[from] HarnessError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_query_detail_passes_through_verbatim() {
        let err = ToolExecutionError::from(EngineError::Query {
            status: 400,
            detail: "SQL execution error: Catalog Error: Table with name t does not exist!".into(),
        });
        assert_eq!(
            err.to_string(),
            "SQL execution error: Catalog Error: Table with name t does not exist!"
        );
    }

    #[test]
    fn unreachable_engine_is_a_connect_failure() {
        let err = ToolExecutionError::from(EngineError::Unreachable("connection refused".into()));
        assert_eq!(
            err.to_string(),
            "failed to connect to query engine: connection refused"
        );
    }

    #[test]
    fn unreadable_success_body_is_a_protocol_violation() {
        let err = ToolExecutionError::from(EngineError::Decode("expected value at line 1".into()));
        assert_eq!(
            err,
            ToolExecutionError::Protocol(ProtocolViolation::Malformed(
                "expected value at line 1".into()
            ))
        );
    }

    #[test]
    fn run_failure_converts_into_generation_error() {
        let err = GenerationError::from(RunFailure::Cancelled);
        assert_eq!(err.to_string(), "run cancelled");
    }
}
