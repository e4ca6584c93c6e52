//! Common imports for typical harness usage.
pub use crate::{
    AbortHandle, Harness, HarnessBuilder, HarnessError, InputPart, LifecycleEvent, ModelRef,
    OutputPart, Part, PartDelta, ProviderId, RunBuilder, RunFailure, RunOutput, RunStream, Session,
    SessionConfig, Tool, ToolError, ToolOutcome, ToolRegistry,
};
