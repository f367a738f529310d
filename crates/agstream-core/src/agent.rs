//! Run driver.
//!
//! An [`Agent`] owns one session (reducer, middleware chain, framer) and
//! drives runs against it. Each inbound payload goes through
//! framer, decoder, event middleware, reducer and mutation commit, strictly
//! in arrival order.
//!
//! Runs can be driven two ways:
//! - synchronously: [`Agent::prepare_request`], [`Agent::begin_run`], then
//!   [`Agent::feed`] per chunk and [`Agent::finish`] or [`Agent::fail`];
//! - asynchronously: [`Agent::run_stream`] over a chunk stream, or
//!   [`Agent::run`] with a [`Transport`].

use crate::config::{AgentConfig, HistoryConfig, MalformedPayloadPolicy};
use crate::error::{AgentError, AgentResult, ConfigError};
use crate::framer::SseFramer;
use crate::id::{IdGenerator, UlidGenerator};
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareContext, MiddlewareId};
use crate::patch::StateStore;
use crate::reducer::SessionReducer;
use crate::subscriber::{Subscriber, SubscriberId};
use agstream_protocol::{Event, Message, RunAgentInput, RunAgentParams, RunAgentResult};
use agstream_util::{IdPrefix, TimingGuard};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default transport timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Byte chunks delivered by a transport.
pub type ByteStream = BoxStream<'static, AgentResult<Vec<u8>>>;

/// Everything a transport needs to open a run.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    /// Serialized `RunAgentInput`.
    pub body: Value,
}

/// Source of the response byte stream (HTTP client, file replay, ...).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: TransportRequest) -> AgentResult<ByteStream>;
}

/// A request that passed the request middleware phase.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: RunAgentInput,
    /// Metadata written by request middleware, carried into the run.
    pub metadata: HashMap<String, String>,
}

/// Bookkeeping for the run in progress.
pub struct ActiveRun {
    input: RunAgentInput,
    /// Message ids present when the run began.
    initial_ids: HashSet<String>,
    metadata: HashMap<String, String>,
    events_processed: usize,
    _timing: TimingGuard,
}

impl ActiveRun {
    pub fn input(&self) -> &RunAgentInput {
        &self.input
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Events that reached the reducer.
    pub fn events_processed(&self) -> usize {
        self.events_processed
    }
}

/// Builder for [`Agent`].
#[derive(Default)]
pub struct AgentBuilder {
    url: String,
    agent_id: Option<String>,
    headers: HashMap<String, String>,
    bearer_token: Option<String>,
    timeout_ms: Option<u64>,
    messages: Vec<Message>,
    state: Option<Value>,
    ids: Option<Arc<dyn IdGenerator>>,
    malformed_payload: MalformedPayloadPolicy,
    state_history: Option<HistoryConfig>,
}

impl AgentBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Seed the builder from a config. Unset fields keep their defaults.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            url: config.url.clone().unwrap_or_default(),
            agent_id: config.agent_id.clone(),
            headers: config.headers.clone().unwrap_or_default(),
            bearer_token: config.bearer_token.clone(),
            timeout_ms: config.timeout_ms,
            malformed_payload: config.malformed_payload.unwrap_or_default(),
            state_history: config.state_history,
            ..Default::default()
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn malformed_payload(mut self, policy: MalformedPayloadPolicy) -> Self {
        self.malformed_payload = policy;
        self
    }

    pub fn state_history(mut self, max_entries: usize) -> Self {
        self.state_history = Some(HistoryConfig {
            enabled: true,
            max_entries,
        });
        self
    }

    pub fn build(self) -> AgentResult<Agent> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl.into());
        }

        let mut headers = HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "text/event-stream".to_string()),
        ]);
        headers.extend(self.headers);
        if let Some(token) = self.bearer_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }

        let mut store = StateStore::new(self.state.unwrap_or_else(|| Value::Object(Default::default())));
        if let Some(history) = self.state_history.filter(|h| h.enabled) {
            store.enable_history(history.max_entries);
        }

        let ids: Arc<dyn IdGenerator> = self.ids.unwrap_or_else(|| Arc::new(UlidGenerator));
        let reducer = SessionReducer::new()
            .with_id_generator(ids.clone())
            .with_messages(self.messages)
            .with_state_store(store);

        Ok(Agent {
            agent_id: self.agent_id,
            url: self.url,
            headers,
            timeout: Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
            policy: self.malformed_payload,
            reducer,
            middleware: MiddlewareChain::new(),
            framer: SseFramer::new(),
            ids,
        })
    }
}

/// Client for one agent endpoint and its session.
pub struct Agent {
    agent_id: Option<String>,
    url: String,
    headers: HashMap<String, String>,
    timeout: Duration,
    policy: MalformedPayloadPolicy,
    reducer: SessionReducer,
    middleware: MiddlewareChain,
    framer: SseFramer,
    ids: Arc<dyn IdGenerator>,
}

impl Agent {
    pub fn builder(url: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(url)
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn messages(&self) -> &[Message] {
        self.reducer.messages()
    }

    pub fn state(&self) -> &Value {
        self.reducer.state()
    }

    /// Result of the last `RUN_FINISHED` event.
    pub fn result(&self) -> Option<&Value> {
        self.reducer.result()
    }

    pub fn add_message(&mut self, message: Message) {
        self.reducer.add_message(message);
    }

    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.reducer.set_messages(messages);
    }

    pub fn set_state(&mut self, state: Value) {
        self.reducer.set_state(state);
    }

    pub fn state_store_mut(&mut self) -> &mut StateStore {
        self.reducer.state_store_mut()
    }

    pub fn reducer(&self) -> &SessionReducer {
        &self.reducer
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.reducer.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.reducer.unsubscribe(id)
    }

    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> MiddlewareId {
        self.middleware.add(middleware)
    }

    pub fn remove_middleware(&mut self, id: MiddlewareId) -> bool {
        self.middleware.remove(id)
    }

    /// Build the run input and pass it through the request middleware.
    ///
    /// `params.messages` are appended to the session and `params.state`
    /// replaces it before the input is assembled. Fails with a cancelled
    /// error if a stage halts the run.
    pub fn prepare_request(&mut self, params: RunAgentParams) -> AgentResult<RunRequest> {
        let RunAgentParams {
            thread_id,
            run_id,
            tools,
            context,
            forwarded_props,
            state,
            messages,
        } = params;

        for message in messages {
            self.reducer.add_message(message);
        }
        if let Some(state) = state {
            self.reducer.set_state(state);
        }

        let mut input = RunAgentInput::new(
            thread_id.unwrap_or_else(|| self.ids.next_id(IdPrefix::Thread)),
            run_id.unwrap_or_else(|| self.ids.next_id(IdPrefix::Run)),
        );
        input.messages = self.reducer.messages().to_vec();
        input.state = self.reducer.state().clone();
        input.tools = tools;
        input.context = context;
        if let Some(props) = forwarded_props {
            input.forwarded_props = props;
        }

        let mut ctx = MiddlewareContext::new(self.reducer.messages(), self.reducer.state());
        let input = self.middleware.process_request(input, &mut ctx);
        if !ctx.should_continue {
            info!(run_id = %input.run_id, "Run halted by request middleware");
            return Err(AgentError::cancelled("request halted by middleware"));
        }

        Ok(RunRequest {
            input,
            metadata: ctx.into_metadata(),
        })
    }

    /// Transport parameters for a prepared input.
    pub fn transport_request(&self, input: &RunAgentInput) -> TransportRequest {
        TransportRequest {
            url: self.url.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout,
            body: input.to_value(),
        }
    }

    /// Start a run. Framing state and open buffers from earlier runs are
    /// discarded.
    pub fn begin_run(&mut self, request: RunRequest) -> ActiveRun {
        let RunRequest { input, metadata } = request;
        self.framer.clear();

        let initial_ids = self.reducer.messages().iter().map(|m| m.id.clone()).collect();
        let timing = TimingGuard::run(input.run_id.clone());
        info!(thread_id = %input.thread_id, run_id = %input.run_id, "Run started");
        self.reducer.begin_run(input.clone());

        ActiveRun {
            input,
            initial_ids,
            metadata,
            events_processed: 0,
            _timing: timing,
        }
    }

    /// Feed one chunk of the response body.
    ///
    /// Every payload the chunk completes is processed before returning.
    pub fn feed(&mut self, run: &mut ActiveRun, chunk: &[u8]) -> AgentResult<()> {
        self.framer.feed(chunk);
        while let Some(payload) = self.framer.next_event() {
            self.process_payload(run, &payload)?;
        }
        Ok(())
    }

    fn process_payload(&mut self, run: &mut ActiveRun, payload: &str) -> AgentResult<()> {
        let event = match decode_payload(payload) {
            Ok(event) => event,
            Err(error) => match self.policy {
                MalformedPayloadPolicy::Skip => {
                    warn!(run_id = %run.input.run_id, error = %error, "Skipping malformed payload");
                    return Ok(());
                }
                MalformedPayloadPolicy::Abort => return Err(error),
            },
        };

        let mut ctx = MiddlewareContext::new(self.reducer.messages(), self.reducer.state())
            .with_input(&run.input)
            .with_metadata(std::mem::take(&mut run.metadata));
        let events = self.middleware.process_event(event, &mut ctx);
        run.metadata = ctx.into_metadata();

        for event in events {
            // A failing event is dropped; the rest of the stream still applies.
            match self.reducer.handle_event(&event) {
                Ok(mutation) => {
                    self.reducer.apply_mutation(mutation);
                    run.events_processed += 1;
                }
                Err(error) => {
                    warn!(
                        run_id = %run.input.run_id,
                        event_type = %event.event_type(),
                        error = %error,
                        "Event handling failed; skipping event"
                    );
                }
            }
        }
        Ok(())
    }

    /// Complete a run once the stream has ended.
    ///
    /// Flushes the framer, assembles the result and runs the response
    /// middleware.
    pub fn finish(&mut self, run: &mut ActiveRun) -> AgentResult<RunAgentResult> {
        self.framer.flush();
        while let Some(payload) = self.framer.next_event() {
            self.process_payload(run, &payload)?;
        }
        if self.reducer.has_open_buffers() {
            debug!(run_id = %run.input.run_id, "Run ended with open buffers");
        }

        let result = RunAgentResult {
            thread_id: run.input.thread_id.clone(),
            run_id: run.input.run_id.clone(),
            result: self.reducer.result().cloned().unwrap_or(Value::Null),
            new_messages: self
                .reducer
                .messages()
                .iter()
                .filter(|m| !run.initial_ids.contains(&m.id))
                .cloned()
                .collect(),
            new_state: self.reducer.state().clone(),
        };

        let mut ctx = MiddlewareContext::new(self.reducer.messages(), self.reducer.state())
            .with_input(&run.input)
            .with_metadata(std::mem::take(&mut run.metadata));
        let result = self.middleware.process_response(result, &mut ctx);
        run.metadata = ctx.into_metadata();

        info!(
            run_id = %result.run_id,
            events = run.events_processed,
            new_messages = result.new_messages.len(),
            "Run finished"
        );
        self.reducer.notify_run_finalized(&result);
        Ok(result)
    }

    /// Route a failure through the error middleware.
    ///
    /// Returns the error that terminates the run, or `None` if a stage
    /// suppressed it. Mutations already committed are kept.
    pub fn fail(&mut self, run: &mut ActiveRun, error: AgentError) -> Option<AgentError> {
        self.framer.clear();

        let mut ctx = MiddlewareContext::new(self.reducer.messages(), self.reducer.state())
            .with_input(&run.input)
            .with_metadata(std::mem::take(&mut run.metadata));
        let error = self.middleware.process_error(error, &mut ctx);
        run.metadata = ctx.into_metadata();

        match error {
            Some(error) => {
                warn!(run_id = %run.input.run_id, error = %error, "Run failed");
                self.reducer.notify_run_failed(&error);
                Some(error)
            }
            None => {
                info!(run_id = %run.input.run_id, "Run failure suppressed by middleware");
                None
            }
        }
    }

    /// Drive a run over a chunk stream supplied by the caller.
    ///
    /// Returns `Ok(None)` when middleware suppressed the failure that ended
    /// the run (a retry stage, for instance).
    pub async fn run_stream<S, B>(
        &mut self,
        params: RunAgentParams,
        chunks: S,
        cancel: CancellationToken,
    ) -> AgentResult<Option<RunAgentResult>>
    where
        S: Stream<Item = AgentResult<B>>,
        B: AsRef<[u8]>,
    {
        let request = self.prepare_request(params)?;
        let mut run = self.begin_run(request);
        self.drive(&mut run, chunks, &cancel).await
    }

    /// Open a stream through `transport` and drive the run over it.
    pub async fn run(
        &mut self,
        params: RunAgentParams,
        transport: &dyn Transport,
        cancel: CancellationToken,
    ) -> AgentResult<Option<RunAgentResult>> {
        let request = self.prepare_request(params)?;
        let transport_request = self.transport_request(&request.input);
        let mut run = self.begin_run(request);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::cancelled("run cancelled")),
            opened = transport.open(transport_request) => opened,
        };

        match opened {
            Ok(chunks) => self.drive(&mut run, chunks, &cancel).await,
            Err(error) => self.fail(&mut run, error).map_or(Ok(None), Err),
        }
    }

    async fn drive<S, B>(
        &mut self,
        run: &mut ActiveRun,
        chunks: S,
        cancel: &CancellationToken,
    ) -> AgentResult<Option<RunAgentResult>>
    where
        S: Stream<Item = AgentResult<B>>,
        B: AsRef<[u8]>,
    {
        let outcome = match self.consume(run, chunks, cancel).await {
            Ok(()) => self.finish(run),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(result) => Ok(Some(result)),
            Err(error) => self.fail(run, error).map_or(Ok(None), Err),
        }
    }

    async fn consume<S, B>(
        &mut self,
        run: &mut ActiveRun,
        chunks: S,
        cancel: &CancellationToken,
    ) -> AgentResult<()>
    where
        S: Stream<Item = AgentResult<B>>,
        B: AsRef<[u8]>,
    {
        futures::pin_mut!(chunks);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AgentError::cancelled("run cancelled"));
                }
                chunk = chunks.next() => match chunk {
                    Some(Ok(bytes)) => self.feed(run, bytes.as_ref())?,
                    Some(Err(error)) => return Err(error),
                    None => return Ok(()),
                },
            }
        }
    }
}

fn decode_payload(payload: &str) -> AgentResult<Event> {
    let doc: Value = serde_json::from_str(payload)
        .map_err(|e| AgentError::parse(format!("invalid JSON payload: {e}")))?;
    Ok(Event::decode(&doc)?)
}
