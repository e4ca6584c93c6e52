use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::content::{InputPart, OutputPart, RunOutput};
use crate::errors::{HarnessError, RunFailure, run_failure_from_provider_error};
use crate::harness::HarnessInner;
use crate::model::{ModelRef, ProviderId, RunOptions};
use crate::provider::{ProviderAdapter, ProviderEvent, ProviderRequest, TranscriptItem};
use crate::stream::{LifecycleEvent, Part, PartDelta};
use crate::tool::{ToolOutcome, ToolRegistry};

/// Handle used to request cancellation of a running stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is best-effort and becomes visible as a terminal
    /// `LifecycleEvent::Error` with `RunFailure::Cancelled`. A tool call that
    /// is already executing runs to completion first.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Builder for configuring and starting a single model run.
///
/// This is the main user-facing API for providing prompts, inputs, tools and
/// runtime options before either streaming events or collecting a final
/// result.
pub struct RunBuilder {
    harness: Arc<HarnessInner>,
    session_id: uuid::Uuid,
    session_name: String,
    model: ModelRef,
    system_prompt: Option<String>,
    input_parts: Vec<InputPart>,
    tools: ToolRegistry,
    options: RunOptions,
    vendor_options: HashMap<ProviderId, serde_json::Value>,
}

impl RunBuilder {
    pub(crate) fn new(
        harness: Arc<HarnessInner>,
        session_id: uuid::Uuid,
        session_name: String,
        model: ModelRef,
    ) -> Self {
        Self {
            harness,
            session_id,
            session_name,
            model,
            system_prompt: None,
            input_parts: Vec::new(),
            tools: ToolRegistry::new(),
            options: RunOptions::default(),
            vendor_options: HashMap::new(),
        }
    }

    /// Sets the system prompt for the run.
    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.system_prompt = Some(text.into());
        self
    }

    /// Appends a plain text user input part.
    pub fn user_text(mut self, text: impl Into<String>) -> Self {
        self.input_parts.push(InputPart::Text(text.into()));
        self
    }

    /// Appends a JSON user input part.
    pub fn user_json(mut self, value: serde_json::Value) -> Result<Self, HarnessError> {
        self.input_parts.push(InputPart::Json(value));
        Ok(self)
    }

    /// Replaces all input parts with the provided list.
    pub fn input_parts(mut self, parts: Vec<InputPart>) -> Result<Self, HarnessError> {
        self.input_parts = parts;
        Ok(self)
    }

    /// Binds the tools the model may call during this run.
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Sets an optional timeout applied to each provider round.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets the bounded stream buffer size used between the runtime task and
    /// the consumer.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_buffer_capacity = capacity;
        self
    }

    /// Caps how many provider rounds may end in tool calls.
    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.options.max_tool_rounds = rounds;
        self
    }

    pub(crate) fn set_vendor_options_json(
        mut self,
        provider: ProviderId,
        value: serde_json::Value,
    ) -> Self {
        self.vendor_options.insert(provider, value);
        self
    }

    #[cfg(test)]
    pub(crate) fn vendor_options_value(&self, provider: &ProviderId) -> Option<&serde_json::Value> {
        self.vendor_options.get(provider)
    }

    /// Validates the builder state and starts a streaming run.
    ///
    /// The returned `RunStream` yields `RunStarted`, the part/tool lifecycle
    /// events, and a terminal `Completed`/`Error` event.
    pub async fn start_stream(self) -> Result<RunStream, HarnessError> {
        let harness = self.harness.clone();
        let session_name = self.session_name.clone();
        let ValidatedRun { request, tools } = self.validate_and_build_request()?;
        let provider = harness
            .provider(&request.model.provider)
            .ok_or_else(|| HarnessError::ProviderNotFound {
                provider: request.model.provider.clone(),
            })?;

        let (tx, rx) = mpsc::channel(request.options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        let abort_handle = AbortHandle { tx: abort_tx };
        let run_id = request.run_id;
        let session_id = request.session_id;
        let model = request.model.clone();
        info!(
            event = "run.started",
            run_id = %run_id,
            session_id = %session_id,
            session = %session_name,
            provider = %model.provider,
            model = %model.model,
            tools = tools.len()
        );
        tokio::spawn(run_task(provider, request, tools, tx, final_tx, abort_rx));

        Ok(RunStream {
            run_id,
            session_id,
            provider: model.provider,
            model: model.model,
            rx,
            final_rx,
            abort_handle,
            saw_terminal: false,
        })
    }

    /// Runs to completion and returns the final aggregated output.
    pub async fn collect_output(self) -> Result<RunOutput, HarnessError> {
        let stream = self.start_stream().await?;
        stream.finish().await
    }

    /// Runs to completion and returns concatenated text output.
    ///
    /// Non-text output parts are ignored.
    pub async fn collect_text(self) -> Result<String, HarnessError> {
        Ok(self.collect_output().await?.text())
    }

    fn validate_and_build_request(self) -> Result<ValidatedRun, HarnessError> {
        if self.model.provider.as_str().trim().is_empty() {
            return Err(HarnessError::Validation(
                "model provider must not be empty".into(),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(HarnessError::Validation("model must not be empty".into()));
        }
        if self.options.stream_buffer_capacity == 0 {
            return Err(HarnessError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.options.max_tool_rounds == 0 {
            return Err(HarnessError::Validation(
                "max_tool_rounds must be greater than 0".into(),
            ));
        }
        if self.input_parts.is_empty() {
            return Err(HarnessError::Validation(
                "at least one input part is required".into(),
            ));
        }
        for part in &self.input_parts {
            if let InputPart::Text(text) = part
                && text.trim().is_empty()
            {
                return Err(HarnessError::Validation(
                    "text input must not be empty".into(),
                ));
            }
        }

        let request = ProviderRequest {
            run_id: uuid::Uuid::new_v4(),
            session_id: self.session_id,
            model: self.model,
            system_prompt: self.system_prompt.filter(|s| !s.trim().is_empty()),
            input_parts: self.input_parts,
            tools: self.tools.definitions(),
            transcript: Vec::new(),
            options: self.options,
            vendor_options: self.vendor_options,
        };
        Ok(ValidatedRun {
            request,
            tools: self.tools,
        })
    }
}

struct ValidatedRun {
    request: ProviderRequest,
    tools: ToolRegistry,
}

/// Streaming handle returned by `RunBuilder::start_stream`.
///
/// Use `next_event()` to consume events as they arrive and `finish()` to obtain
/// the final result after the terminal event. Dropping the handle stops the
/// run: the runtime task notices the closed channel and releases the provider
/// stream without waiting for its next chunk.
pub struct RunStream {
    run_id: uuid::Uuid,
    session_id: uuid::Uuid,
    provider: ProviderId,
    model: String,
    rx: mpsc::Receiver<LifecycleEvent>,
    final_rx: oneshot::Receiver<Result<RunOutput, HarnessError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl RunStream {
    /// Returns the run id for this stream.
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Returns the session id that owns this run.
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next lifecycle event.
    ///
    /// Returns `None` after the stream channel is closed.
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        let event = self.rx.recv().await;
        if let Some(event) = &event
            && event.is_terminal()
        {
            self.saw_terminal = true;
        }
        event
    }

    /// Converts the run into a single-pass event stream.
    ///
    /// A terminal `Error` event is surfaced as `Err` and ends the stream; a
    /// `Completed` event is yielded and ends the stream.
    pub fn into_events(
        self,
    ) -> impl futures::Stream<Item = Result<LifecycleEvent, RunFailure>> + Send + 'static {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.next_event().await {
                Some(LifecycleEvent::Error { error, .. }) => Some((Err(error), None)),
                Some(event) if event.is_terminal() => Some((Ok(event), None)),
                Some(event) => Some((Ok(event), Some(stream))),
                None => Some((
                    Err(RunFailure::Protocol {
                        message: format!(
                            "run stream closed without a terminal event (provider={}, model={})",
                            stream.provider, stream.model
                        ),
                    }),
                    None,
                )),
            }
        })
    }

    /// Drains the stream (if needed) and returns the terminal run result.
    ///
    /// This is safe to call after consuming events manually with `next_event()`.
    pub async fn finish(mut self) -> Result<RunOutput, HarnessError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => {
                    self.saw_terminal = true;
                }
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::protocol_msg(format!(
                "run task ended without final result (provider={}, model={})",
                self.provider, self.model
            ))),
        }
    }
}

/// Why the run loop stopped before producing an output.
enum Exit {
    Failed(RunFailure),
    ReceiverDropped(&'static str),
}

struct PendingCall {
    tool_call_id: String,
    tool_name: String,
    args: String,
}

struct RoundResult {
    text: String,
    calls: Vec<PendingCall>,
    finish_reason: Option<String>,
}

struct RunLoop {
    provider: Arc<dyn ProviderAdapter>,
    tools: ToolRegistry,
    tx: mpsc::Sender<LifecycleEvent>,
    abort_rx: watch::Receiver<bool>,
    abort_live: bool,
    run_id: uuid::Uuid,
    provider_id: ProviderId,
    model_name: String,
    next_index: usize,
    parts: Vec<OutputPart>,
}

async fn run_task(
    provider: Arc<dyn ProviderAdapter>,
    request: ProviderRequest,
    tools: ToolRegistry,
    tx: mpsc::Sender<LifecycleEvent>,
    final_tx: oneshot::Sender<Result<RunOutput, HarnessError>>,
    abort_rx: watch::Receiver<bool>,
) {
    let run_id = request.run_id;
    let session_id = request.session_id;
    let provider_id = request.model.provider.clone();
    let model_name = request.model.model.clone();

    if !send_event(
        &tx,
        LifecycleEvent::RunStarted {
            run_id,
            session_id,
            provider: provider_id.clone(),
            model: model_name.clone(),
        },
    )
    .await
    {
        let _ = final_tx.send(Err(HarnessError::protocol_msg(
            "run stream receiver dropped before RunStarted",
        )));
        return;
    }

    let mut run = RunLoop {
        provider,
        tools,
        tx,
        abort_rx,
        abort_live: true,
        run_id,
        provider_id,
        model_name,
        next_index: 0,
        parts: Vec::new(),
    };

    match run.drive(request).await {
        Ok(output) => {
            info!(event = "run.completed", run_id = %run_id, parts = output.parts.len());
            let sent = send_event(
                &run.tx,
                LifecycleEvent::Completed {
                    run_id,
                    output: output.clone(),
                },
            )
            .await;
            let _ = final_tx.send(if sent {
                Ok(output)
            } else {
                Err(HarnessError::protocol_msg(
                    "run stream receiver dropped before completion",
                ))
            });
        }
        Err(Exit::Failed(failure)) => {
            warn!(event = "run.failed", run_id = %run_id, error = %failure);
            let _ = send_event(
                &run.tx,
                LifecycleEvent::Error {
                    run_id,
                    error: failure.clone(),
                },
            )
            .await;
            let _ = final_tx.send(Err(HarnessError::run_failed(failure)));
        }
        Err(Exit::ReceiverDropped(message)) => {
            debug!(event = "run.abandoned", run_id = %run_id, reason = message);
            let _ = final_tx.send(Err(HarnessError::protocol_msg(message)));
        }
    }
}

impl RunLoop {
    async fn drive(&mut self, mut request: ProviderRequest) -> Result<RunOutput, Exit> {
        let max_rounds = request.options.max_tool_rounds;
        let mut tool_rounds = 0_usize;
        loop {
            let round = self.stream_round(&request).await?;
            if round.calls.is_empty() {
                return Ok(RunOutput {
                    parts: std::mem::take(&mut self.parts),
                    finish_reason: round.finish_reason,
                });
            }

            tool_rounds += 1;
            if tool_rounds > max_rounds {
                return Err(Exit::Failed(RunFailure::Protocol {
                    message: format!("tool round limit of {max_rounds} exceeded"),
                }));
            }

            if !round.text.is_empty() {
                request
                    .transcript
                    .push(TranscriptItem::AssistantText(round.text));
            }
            for call in round.calls {
                self.check_abort()?;
                let outcome = self.execute_tool(&call).await;
                request.transcript.push(TranscriptItem::ToolCall {
                    tool_call_id: call.tool_call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    args: call.args,
                });
                request.transcript.push(TranscriptItem::ToolOutput {
                    tool_call_id: call.tool_call_id.clone(),
                    output: outcome.to_model_output(),
                });
                self.emit(LifecycleEvent::ToolResult {
                    run_id: self.run_id,
                    tool_call_id: call.tool_call_id,
                    tool_name: call.tool_name,
                    outcome,
                })
                .await?;
            }
            self.check_abort()?;
        }
    }

    async fn stream_round(&mut self, request: &ProviderRequest) -> Result<RoundResult, Exit> {
        let mut handle = match self.provider.start_stream(request.clone()).await {
            Ok(handle) => handle,
            Err(err) => return Err(Exit::Failed(run_failure_from_provider_error(&err))),
        };

        let mut indexes: HashMap<usize, usize> = HashMap::new();
        let mut open_text: BTreeMap<usize, String> = BTreeMap::new();
        let mut round_text = String::new();
        let mut saw_text_part = false;
        let mut calls = Vec::new();

        loop {
            tokio::select! {
                changed = self.abort_rx.changed(), if self.abort_live => {
                    match changed {
                        Ok(()) if *self.abort_rx.borrow() => {
                            return Err(Exit::Failed(RunFailure::Cancelled));
                        }
                        Ok(()) => {}
                        Err(_) => self.abort_live = false,
                    }
                }
                _ = self.tx.closed() => {
                    return Err(Exit::ReceiverDropped("run stream receiver dropped during output"));
                }
                next = handle.stream.next() => {
                    match next {
                        Some(Ok(ProviderEvent::PartStarted { index, part })) => {
                            let run_index = self.assign_index(&mut indexes, index);
                            if let Part::Text { content } = &part {
                                open_text.insert(index, content.clone());
                            }
                            self.emit(LifecycleEvent::PartStart { run_id: self.run_id, index: run_index, part }).await?;
                        }
                        Some(Ok(ProviderEvent::PartDelta { index, delta })) => {
                            match &delta {
                                PartDelta::Text { content } => {
                                    if content.is_empty() {
                                        continue;
                                    }
                                    if !indexes.contains_key(&index) {
                                        let run_index = self.assign_index(&mut indexes, index);
                                        open_text.insert(index, String::new());
                                        let part = Part::Text { content: String::new() };
                                        self.emit(LifecycleEvent::PartStart { run_id: self.run_id, index: run_index, part }).await?;
                                    }
                                    if let Some(buffer) = open_text.get_mut(&index) {
                                        buffer.push_str(content);
                                    }
                                }
                                PartDelta::ToolCallArgs { .. } => {
                                    if !indexes.contains_key(&index) {
                                        debug!(run_id = %self.run_id, index, "dropping tool argument delta for unknown part");
                                        continue;
                                    }
                                }
                            }
                            let run_index = self.assign_index(&mut indexes, index);
                            self.emit(LifecycleEvent::PartDelta { run_id: self.run_id, index: run_index, delta }).await?;
                        }
                        Some(Ok(ProviderEvent::PartFinished { index, part })) => {
                            let run_index = self.assign_index(&mut indexes, index);
                            match &part {
                                Part::Text { content } => {
                                    open_text.remove(&index);
                                    saw_text_part = true;
                                    round_text.push_str(content);
                                    self.parts.push(OutputPart::Text(content.clone()));
                                }
                                Part::ToolCall { tool_call_id, tool_name, args } => {
                                    debug!(run_id = %self.run_id, tool = %tool_name, tool_call_id = %tool_call_id, "model requested tool call");
                                    self.parts.push(OutputPart::ToolCall {
                                        tool_call_id: tool_call_id.clone(),
                                        tool_name: tool_name.clone(),
                                        args: args.clone(),
                                    });
                                    calls.push(PendingCall {
                                        tool_call_id: tool_call_id.clone(),
                                        tool_name: tool_name.clone(),
                                        args: args.clone(),
                                    });
                                }
                            }
                            self.emit(LifecycleEvent::PartEnd { run_id: self.run_id, index: run_index, part }).await?;
                        }
                        Some(Ok(ProviderEvent::Completed { output, finish_reason })) => {
                            for (index, content) in std::mem::take(&mut open_text) {
                                let run_index = self.assign_index(&mut indexes, index);
                                saw_text_part = true;
                                round_text.push_str(&content);
                                self.parts.push(OutputPart::Text(content.clone()));
                                self.emit(LifecycleEvent::PartEnd { run_id: self.run_id, index: run_index, part: Part::Text { content } }).await?;
                            }
                            let finish_reason = finish_reason
                                .or_else(|| output.as_ref().and_then(|o| o.finish_reason.clone()));
                            if !saw_text_part
                                && let Some(text) = output.map(|o| o.text()).filter(|t| !t.is_empty())
                            {
                                self.emit_whole_text_part(&text).await?;
                                round_text.push_str(&text);
                            }
                            return Ok(RoundResult { text: round_text, calls, finish_reason });
                        }
                        Some(Err(err)) => {
                            return Err(Exit::Failed(run_failure_from_provider_error(&err)));
                        }
                        None => {
                            return Err(Exit::Failed(RunFailure::Protocol {
                                message: format!("provider stream ended without completion ({})", self.provider_id),
                            }));
                        }
                    }
                }
            }
        }
    }

    /// Surfaces final text reported only on completion as a start/end pair so
    /// consumers see it through the same part lifecycle.
    async fn emit_whole_text_part(&mut self, text: &str) -> Result<(), Exit> {
        let index = self.next_index;
        self.next_index += 1;
        self.parts.push(OutputPart::Text(text.to_string()));
        self.emit(LifecycleEvent::PartStart {
            run_id: self.run_id,
            index,
            part: Part::Text {
                content: text.to_string(),
            },
        })
        .await?;
        self.emit(LifecycleEvent::PartEnd {
            run_id: self.run_id,
            index,
            part: Part::Text {
                content: text.to_string(),
            },
        })
        .await
    }

    async fn execute_tool(&self, call: &PendingCall) -> ToolOutcome {
        info!(
            event = "tool.call_started",
            run_id = %self.run_id,
            model = %self.model_name,
            tool = %call.tool_name,
            tool_call_id = %call.tool_call_id
        );
        let result = self.tools.invoke(&call.tool_name, &call.args).await;
        match &result {
            Ok(_) => info!(
                event = "tool.call_succeeded",
                run_id = %self.run_id,
                tool = %call.tool_name,
                tool_call_id = %call.tool_call_id
            ),
            Err(err) => warn!(
                event = "tool.call_failed",
                run_id = %self.run_id,
                tool = %call.tool_name,
                tool_call_id = %call.tool_call_id,
                error = %err
            ),
        }
        ToolOutcome::from(result)
    }

    fn assign_index(&mut self, indexes: &mut HashMap<usize, usize>, local: usize) -> usize {
        *indexes.entry(local).or_insert_with(|| {
            let index = self.next_index;
            self.next_index += 1;
            index
        })
    }

    fn check_abort(&self) -> Result<(), Exit> {
        if *self.abort_rx.borrow() {
            return Err(Exit::Failed(RunFailure::Cancelled));
        }
        Ok(())
    }

    async fn emit(&self, event: LifecycleEvent) -> Result<(), Exit> {
        if send_event(&self.tx, event).await {
            Ok(())
        } else {
            Err(Exit::ReceiverDropped(
                "run stream receiver dropped during output",
            ))
        }
    }
}

async fn send_event(tx: &mpsc::Sender<LifecycleEvent>, event: LifecycleEvent) -> bool {
    tx.send(event).await.is_ok()
}
