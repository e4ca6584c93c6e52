//! One generation session per chat request.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use dataviz_ai_harness::vendors::openai::{
    OpenAiProvider, OpenAiRequestOptions, OpenAiRunBuilderExt,
};
use dataviz_ai_harness::{
    Harness, HarnessError, LifecycleEvent, ModelRef, ProviderAdapter, RunFailure, SessionConfig,
    ToolRegistry,
};
use futures::Stream;
use tracing::{info, warn};

use crate::bridge::{QueryEngine, SqlBridge, SqlTool};
use crate::demux::{NarrationMode, demultiplex};
use crate::emitter::{emit, encode_frame};
use crate::errors::GenerationError;
use crate::prompt::SYSTEM_PROMPT;
use crate::protocol::{ProtocolEvent, STAGE_SESSION_START};

const OPENAI_PROVIDER: &str = "openai";

/// Lifecycle events of one started session.
pub type LifecycleStream =
    Pin<Box<dyn Stream<Item = Result<LifecycleEvent, RunFailure>> + Send + 'static>>;

/// Encoded event-stream frames for one chat response.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send + 'static>>;

/// Builds the provider adapter used by a single session.
pub trait ProviderFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn ProviderAdapter>, HarnessError>;
}

impl<F> ProviderFactory for F
where
    F: Fn() -> Result<Arc<dyn ProviderAdapter>, HarnessError> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn ProviderAdapter>, HarnessError> {
        self()
    }
}

/// Factory that reads OpenAI credentials from the environment every time a
/// session starts.
pub fn openai_from_env() -> Arc<dyn ProviderFactory> {
    Arc::new(|| -> Result<Arc<dyn ProviderAdapter>, HarnessError> {
        Ok(Arc::new(OpenAiProvider::from_env()?))
    })
}

/// Per-session generation settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: ModelRef,
    pub system_prompt: String,
    pub narration: NarrationMode,
    pub max_tool_rounds: usize,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl SessionSettings {
    pub fn new(model: ModelRef) -> Self {
        Self {
            model,
            system_prompt: SYSTEM_PROMPT.to_string(),
            narration: NarrationMode::default(),
            max_tool_rounds: 8,
            temperature: None,
            max_output_tokens: Some(4096),
        }
    }

    pub fn narration(mut self, narration: NarrationMode) -> Self {
        self.narration = narration;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Starts isolated generation sessions. Nothing is shared between sessions
/// except the query engine handle.
pub struct SessionFactory {
    providers: Arc<dyn ProviderFactory>,
    bridge: SqlBridge,
    settings: SessionSettings,
}

impl SessionFactory {
    pub fn new(
        providers: Arc<dyn ProviderFactory>,
        engine: Arc<dyn QueryEngine>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            providers,
            bridge: SqlBridge::new(engine),
            settings,
        }
    }

    /// Replaces the SQL bridge (for a non-default timeout).
    pub fn with_bridge(mut self, bridge: SqlBridge) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Registry holding exactly the `run_sql` tool.
    pub fn tool_registry(&self) -> Result<ToolRegistry, HarnessError> {
        ToolRegistry::new().with(Arc::new(SqlTool::new(self.bridge.clone())))
    }

    /// Starts a session with the configured prompt and the `run_sql` tool.
    pub async fn start_session(&self, user_message: &str) -> Result<LifecycleStream, GenerationError> {
        let tools = self.tool_registry()?;
        self.start_session_with(&self.settings.system_prompt, tools, user_message)
            .await
    }

    /// Starts a session on a freshly created provider and harness.
    pub async fn start_session_with(
        &self,
        system_prompt: &str,
        tools: ToolRegistry,
        user_message: &str,
    ) -> Result<LifecycleStream, GenerationError> {
        let provider = self.providers.create()?;
        let harness = Harness::with_provider(provider);

        let mut run = harness
            .session(SessionConfig::named("chat"))
            .run(self.settings.model.clone())
            .system_prompt(system_prompt)
            .user_text(user_message)
            .tools(tools)
            .max_tool_rounds(self.settings.max_tool_rounds);
        if self.settings.model.provider.as_str() == OPENAI_PROVIDER {
            let mut options = OpenAiRequestOptions::default().store(false);
            if let Some(temperature) = self.settings.temperature {
                options = options.temperature(temperature);
            }
            if let Some(tokens) = self.settings.max_output_tokens {
                options = options.max_output_tokens(tokens);
            }
            run = run.openai_options(options);
        }

        let stream = run.start_stream().await?;
        info!(
            event = "session.started",
            run_id = %stream.run_id(),
            session_id = %stream.session_id(),
            model = %self.settings.model.model
        );
        Ok(Box::pin(stream.into_events()))
    }

    /// Runs one chat turn end to end and returns its frames.
    ///
    /// A session that cannot start still produces a response: a single
    /// `error` frame with stage `session_start`.
    pub async fn respond(&self, user_message: &str) -> FrameStream {
        match self.start_session(user_message).await {
            Ok(events) => Box::pin(emit(demultiplex(events, self.settings.narration))),
            Err(err) => {
                warn!(event = "session.start_failed", error = %err);
                let frame = encode_frame(&ProtocolEvent::error(err.to_string(), STAGE_SESSION_START));
                Box::pin(futures::stream::once(async move { Ok(frame) }))
            }
        }
    }
}
