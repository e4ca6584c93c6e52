use crate::tool::ToolOutcome;
use crate::{RunOutput, errors::RunFailure, model::ProviderId};

/// One output segment of a generation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Part {
    /// Narration text. On `PartStart` this is the initial text (usually empty);
    /// on `PartEnd` it is the complete text of the segment.
    Text { content: String },
    /// A tool invocation. `args` is the raw JSON argument string as produced by
    /// the model; it is only complete on `PartEnd`.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: String,
    },
}

/// Incremental growth of an open part.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PartDelta {
    /// Appended narration text.
    Text { content: String },
    /// Appended fragment of a tool call's JSON arguments.
    ToolCallArgs { args: String },
}

/// Lifecycle events exposed by `RunStream`.
///
/// Part indexes are unique across all provider rounds of one run, so a part
/// started in a later round never aliases one from an earlier round.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    /// First event for every run.
    RunStarted {
        run_id: uuid::Uuid,
        session_id: uuid::Uuid,
        provider: ProviderId,
        model: String,
    },
    /// A new output segment opened.
    PartStart {
        run_id: uuid::Uuid,
        index: usize,
        part: Part,
    },
    /// An open output segment grew.
    PartDelta {
        run_id: uuid::Uuid,
        index: usize,
        delta: PartDelta,
    },
    /// An output segment closed; carries the segment's final content.
    PartEnd {
        run_id: uuid::Uuid,
        index: usize,
        part: Part,
    },
    /// A tool call finished executing and its outcome was returned to the model.
    ToolResult {
        run_id: uuid::Uuid,
        tool_call_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },
    /// Terminal success event with aggregated output.
    Completed {
        run_id: uuid::Uuid,
        output: RunOutput,
    },
    /// Terminal failure event.
    Error {
        run_id: uuid::Uuid,
        error: RunFailure,
    },
}

impl LifecycleEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}
