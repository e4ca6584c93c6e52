use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{HarnessError, ToolError};

/// Provider-neutral description of a tool offered to the model.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments object.
    pub parameters: serde_json::Value,
}

/// Result of one tool invocation as seen on the lifecycle stream.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ToolOutcome {
    /// The tool returned a JSON payload.
    Success(serde_json::Value),
    /// The tool failed; `message` is what the model was told.
    Failure { message: String },
}

impl ToolOutcome {
    /// Text handed back to the model as the tool's output.
    pub fn to_model_output(&self) -> String {
        match self {
            Self::Success(value) => value.to_string(),
            Self::Failure { message } => {
                serde_json::json!({ "error": message }).to_string()
            }
        }
    }
}

impl From<Result<serde_json::Value, ToolError>> for ToolOutcome {
    fn from(value: Result<serde_json::Value, ToolError>) -> Self {
        match value {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure {
                message: err.to_string(),
            },
        }
    }
}

/// A capability the model can invoke mid-generation.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool.
    fn name(&self) -> &str;

    /// Natural-language description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters(&self) -> serde_json::Value;

    /// Executes the tool with the model's raw JSON arguments.
    async fn call(&self, args: &str) -> Result<serde_json::Value, ToolError>;
}

/// Set of tools bound into one run.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Names must be unique within a registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), HarnessError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(HarnessError::Config("tool name must not be empty".into()));
        }
        if self.tools.contains_key(&name) {
            return Err(HarnessError::Config(format!(
                "duplicate tool registration: {name}"
            )));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Result<Self, HarnessError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Invokes the named tool. Unknown names become a `ToolError` rather than
    /// a run failure, so the model can recover.
    pub async fn invoke(&self, name: &str, args: &str) -> Result<serde_json::Value, ToolError> {
        match self.get(name) {
            Some(tool) => tool.call(args).await,
            None => Err(ToolError::UnknownTool {
                tool: name.to_string(),
            }),
        }
    }
}
