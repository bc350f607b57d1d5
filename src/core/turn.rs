//! The turn orchestrator.
//!
//! One [`TurnEngine`] owns the conversation store and drives one logical
//! request lifecycle at a time: user message, primary stream, tool
//! execution, optional follow-up stream, final commit. Every asynchronous
//! continuation re-checks the monotonic request id before touching the
//! store, so a superseded turn's late events are discarded rather than
//! overwriting a newer turn's output. That check, not locking, is the whole
//! concurrency story: execution is single-threaded and cooperative, and the
//! hazard is stale-continuation ordering.

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::accumulator::{CompletedToolCall, ToolCallAccumulator};
use super::config::EngineSettings;
use super::conversation::{ChatMode, ConversationStore};
use super::message::{Message, Role};
use crate::api::ApiMessage;
use crate::api::ProviderEvent;
use crate::provider::{ProviderStreamService, StreamEvent, StreamParams};
use crate::tools::ToolRegistry;
use crate::utils::logging::LoggingState;

/// Committed when a turn produces no text anywhere.
pub const NO_RESPONSE_NOTICE: &str = "[no response received]";

/// Interim placeholder content while tools run before any text has arrived.
/// Never committed as a final answer.
const TOOL_WAIT_NOTICE: &str = "Running requested tools...";

const FOLLOW_UP_ACK: &str = "Understood. I called the requested tools and received their results.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Pending,
    PrimaryStream,
    ExecutingTools,
    FollowUpStream,
    Complete,
    Aborted,
    Errored,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnState::Complete | TurnState::Aborted | TurnState::Errored
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Primary,
    FollowUp,
}

/// One executed tool call's outcome, fed into the follow-up round.
#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub name: String,
    pub outcome: serde_json::Value,
}

/// Work the engine wants the runtime to perform. Returned instead of being
/// executed inline so the state machine stays drivable without a network.
pub enum EngineCommand {
    OpenStream(StreamParams),
}

struct TurnSession {
    current_request_id: u64,
    cancel_token: Option<CancellationToken>,
    state: TurnState,
    round: Round,
    /// Text accumulated by the active round; the placeholder is always
    /// overwritten with this whole buffer, never appended to.
    response: String,
    /// Primary-round text, kept as the fallback answer when the follow-up
    /// round yields nothing.
    primary_text: String,
    accumulator: ToolCallAccumulator,
    tool_records: Vec<ToolRecord>,
    base_messages: Vec<ApiMessage>,
}

impl TurnSession {
    fn idle() -> Self {
        Self {
            current_request_id: 0,
            cancel_token: None,
            state: TurnState::Complete,
            round: Round::Primary,
            response: String::new(),
            primary_text: String::new(),
            accumulator: ToolCallAccumulator::new(),
            tool_records: Vec::new(),
            base_messages: Vec::new(),
        }
    }
}

pub struct TurnEngine {
    settings: EngineSettings,
    client: reqwest::Client,
    store: ConversationStore,
    registry: ToolRegistry,
    streams: ProviderStreamService,
    events: mpsc::UnboundedReceiver<(StreamEvent, u64)>,
    logging: LoggingState,
    session: TurnSession,
}

impl TurnEngine {
    pub fn new(settings: EngineSettings, registry: ToolRegistry, logging: LoggingState) -> Self {
        let (streams, events) = ProviderStreamService::new();
        Self {
            settings,
            client: reqwest::Client::new(),
            store: ConversationStore::new(),
            registry,
            streams,
            events,
            logging,
            session: TurnSession::idle(),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn state(&self) -> TurnState {
        self.session.state
    }

    pub fn current_request_id(&self) -> u64 {
        self.session.current_request_id
    }

    pub fn is_current_turn(&self, request_id: u64) -> bool {
        self.session.current_request_id == request_id
    }

    pub fn set_mode(&mut self, mode: ChatMode) {
        self.store.set_mode(mode);
    }

    /// Begin a new turn: invalidate the previous one, append the user
    /// message and a fresh placeholder, and return the command that opens
    /// the primary stream.
    pub fn send_message(&mut self, text: &str) -> EngineCommand {
        let request_id = self.begin_turn(text);
        self.session.state = TurnState::PrimaryStream;
        let params = self.stream_params(
            self.session.base_messages.clone(),
            self.registry.descriptors(),
            request_id,
        );
        EngineCommand::OpenStream(params)
    }

    /// Steps 1–2 of the turn protocol, without opening the stream. The
    /// returned request id is the sole identity allowed to mutate the store
    /// from this point on.
    pub fn begin_turn(&mut self, text: &str) -> u64 {
        // A previous turn loses its mutation authority right here, whether
        // or not its transport has actually stopped.
        if let Some(token) = self.session.cancel_token.take() {
            token.cancel();
        }
        self.store.seal_trailing_placeholder();

        let request_id = self.session.current_request_id + 1;
        self.session = TurnSession {
            current_request_id: request_id,
            cancel_token: Some(CancellationToken::new()),
            state: TurnState::Pending,
            ..TurnSession::idle()
        };
        debug!(request_id, "starting turn");

        if let Err(error) = self.logging.log_message(&format!("user: {text}")) {
            debug!(%error, "failed to log user message");
        }
        self.store.append(Message::user(text));
        self.store.append(Message::assistant_placeholder());
        self.session.base_messages = self.build_history();
        request_id
    }

    /// User-triggered stop: abort the transport, keep whatever partial text
    /// the placeholder holds, show no error.
    pub fn stop_generation(&mut self) {
        if self.session.state.is_terminal() {
            return;
        }
        if let Some(token) = self.session.cancel_token.take() {
            token.cancel();
        }
        self.session.state = TurnState::Aborted;
        debug!(
            request_id = self.session.current_request_id,
            "turn aborted by user"
        );
    }

    pub fn clear_messages(&mut self) {
        self.stop_generation();
        self.store.clear();
    }

    /// Run the command the state machine asked for.
    pub fn dispatch(&self, command: EngineCommand) {
        match command {
            EngineCommand::OpenStream(params) => self.streams.spawn_stream(params),
        }
    }

    pub async fn next_event(&mut self) -> Option<(StreamEvent, u64)> {
        self.events.recv().await
    }

    /// Drive one full turn to a terminal state. This is the cooperative
    /// event loop: every suspension point re-enters through
    /// [`Self::handle_event`] and its staleness gate.
    pub async fn run_turn(&mut self, text: &str) -> TurnState {
        let command = self.send_message(text);
        self.dispatch(command);
        while !self.session.state.is_terminal() {
            let Some((event, request_id)) = self.events.recv().await else {
                break;
            };
            if let Some(command) = self.handle_event(event, request_id).await {
                self.dispatch(command);
            }
        }
        self.session.state
    }

    /// Process one stream event. Events from superseded or finished turns
    /// produce zero observable mutation.
    pub async fn handle_event(
        &mut self,
        event: StreamEvent,
        request_id: u64,
    ) -> Option<EngineCommand> {
        if !self.is_current_turn(request_id) || self.session.state.is_terminal() {
            return None;
        }

        match event {
            StreamEvent::Provider(ProviderEvent::TextDelta(text)) => {
                self.session.response.push_str(&text);
                let full = self.session.response.clone();
                self.store.replace_last_assistant(&full);
                None
            }
            StreamEvent::Provider(ProviderEvent::ToolCall(delta)) => {
                if let Some(call) = self.session.accumulator.push(delta) {
                    self.execute_call(call, request_id).await;
                }
                None
            }
            StreamEvent::Provider(ProviderEvent::End) => self.handle_round_end(request_id).await,
            StreamEvent::Failed(message) => {
                self.store.replace_last_assistant(&message);
                self.store.seal_trailing_placeholder();
                self.session.state = TurnState::Errored;
                self.session.cancel_token = None;
                debug!(request_id, "turn errored");
                None
            }
        }
    }

    async fn execute_call(&mut self, call: CompletedToolCall, request_id: u64) {
        let streaming_state = match self.session.round {
            Round::Primary => TurnState::PrimaryStream,
            Round::FollowUp => TurnState::FollowUpStream,
        };
        self.session.state = TurnState::ExecutingTools;
        debug!(request_id, tool = %call.name, id = %call.id, "tool call finalized");

        let outcome = self.registry.execute(&call.name, &call.arguments).await;

        // The await above is a suspension point; a newer turn may have taken
        // over while the tool ran.
        if !self.is_current_turn(request_id) || self.session.state.is_terminal() {
            return;
        }
        self.session.state = streaming_state;
        self.session.tool_records.push(ToolRecord {
            name: call.name,
            outcome,
        });
    }

    async fn handle_round_end(&mut self, request_id: u64) -> Option<EngineCommand> {
        match self.session.round {
            Round::Primary => {
                if let Some(call) = self.session.accumulator.finish() {
                    self.execute_call(call, request_id).await;
                    if !self.is_current_turn(request_id) || self.session.state.is_terminal() {
                        return None;
                    }
                }

                self.session.primary_text = std::mem::take(&mut self.session.response);
                if self.session.tool_records.is_empty() {
                    self.finalize_turn();
                    return None;
                }

                if self.session.primary_text.is_empty() {
                    self.store.replace_last_assistant(TOOL_WAIT_NOTICE);
                }
                self.session.round = Round::FollowUp;
                self.session.state = TurnState::FollowUpStream;
                debug!(
                    request_id,
                    tools = self.session.tool_records.len(),
                    "opening follow-up round"
                );
                // The follow-up round offers no tool descriptors.
                let params =
                    self.stream_params(self.follow_up_messages(), Vec::new(), request_id);
                Some(EngineCommand::OpenStream(params))
            }
            Round::FollowUp => {
                self.finalize_turn();
                None
            }
        }
    }

    fn finalize_turn(&mut self) {
        if self.session.state.is_terminal() {
            return;
        }

        let text = if !self.session.response.is_empty() {
            self.session.response.as_str()
        } else if !self.session.primary_text.is_empty() {
            self.session.primary_text.as_str()
        } else {
            NO_RESPONSE_NOTICE
        };
        let text = text.to_string();

        self.store.finalize_last_assistant(&text);
        if let Err(error) = self.logging.log_message(&text) {
            debug!(%error, "failed to log assistant message");
        }
        self.session.state = TurnState::Complete;
        self.session.cancel_token = None;
        debug!(request_id = self.session.current_request_id, "turn complete");
    }

    /// History offered to the provider: the optional system prompt plus
    /// every finalized, non-empty user/assistant message in the active mode.
    fn build_history(&self) -> Vec<ApiMessage> {
        let mut messages = Vec::new();
        if let Some(prompt) = &self.settings.system_prompt {
            if !prompt.is_empty() {
                messages.push(ApiMessage::system(prompt.clone()));
            }
        }
        for message in self.store.messages() {
            if !message.finalized || message.content.is_empty() {
                continue;
            }
            match message.role {
                Role::User => messages.push(ApiMessage::user(message.content.clone())),
                Role::Assistant => messages.push(ApiMessage::assistant(message.content.clone())),
                Role::System => {}
            }
        }
        messages
    }

    /// Original history plus the synthetic acknowledgment/result pair the
    /// follow-up round generates from.
    fn follow_up_messages(&self) -> Vec<ApiMessage> {
        let results: Vec<serde_json::Value> = self
            .session
            .tool_records
            .iter()
            .map(|record| json!({ "tool": record.name, "result": record.outcome }))
            .collect();
        let rendered = serde_json::to_string_pretty(&results)
            .unwrap_or_else(|_| "[]".to_string());

        let mut messages = self.session.base_messages.clone();
        messages.push(ApiMessage::assistant(FOLLOW_UP_ACK));
        messages.push(ApiMessage::user(format!(
            "Tool results:\n{rendered}\n\nUse these results to answer my previous message."
        )));
        messages
    }

    fn stream_params(
        &self,
        messages: Vec<ApiMessage>,
        tools: Vec<crate::api::ToolDescriptor>,
        request_id: u64,
    ) -> StreamParams {
        StreamParams {
            client: self.client.clone(),
            provider: self.settings.provider,
            base_url: self.settings.base_url.clone(),
            api_key: self.settings.api_key.clone(),
            model: self.settings.model.clone(),
            messages,
            tools,
            cancel_token: self
                .session
                .cancel_token
                .clone()
                .unwrap_or_default(),
            request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ToolCallDelta;
    use crate::provider::ProviderKind;

    fn test_engine() -> TurnEngine {
        let settings = EngineSettings {
            provider: ProviderKind::OpenAi,
            model: "test-model".to_string(),
            api_key: "test-key".to_string(),
            base_url: "http://localhost:0".to_string(),
            system_prompt: Some("You are a test assistant.".to_string()),
        };
        TurnEngine::new(settings, ToolRegistry::new(), LoggingState::new(None))
    }

    fn text(content: &str) -> StreamEvent {
        StreamEvent::Provider(ProviderEvent::TextDelta(content.to_string()))
    }

    fn tool_delta(id: Option<&str>, name: Option<&str>, arguments: Option<&str>) -> StreamEvent {
        StreamEvent::Provider(ProviderEvent::ToolCall(ToolCallDelta {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: arguments.map(str::to_string),
        }))
    }

    fn end() -> StreamEvent {
        StreamEvent::Provider(ProviderEvent::End)
    }

    fn assistant_contents(engine: &TurnEngine) -> Vec<String> {
        engine
            .store()
            .messages()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn plain_text_turn_finalizes_placeholder() {
        let mut engine = test_engine();
        let _ = engine.send_message("hello");
        let id = engine.current_request_id();
        assert_eq!(engine.state(), TurnState::PrimaryStream);

        engine.handle_event(text("Hi "), id).await;
        engine.handle_event(text("there"), id).await;
        assert_eq!(assistant_contents(&engine), vec!["Hi there"]);

        engine.handle_event(end(), id).await;
        assert_eq!(engine.state(), TurnState::Complete);
        let message = engine.store().messages().last().unwrap();
        assert!(message.finalized);
        assert_eq!(message.content, "Hi there");
    }

    #[tokio::test]
    async fn empty_turn_commits_no_response_notice() {
        let mut engine = test_engine();
        let _ = engine.send_message("hello");
        let id = engine.current_request_id();
        engine.handle_event(end(), id).await;

        assert_eq!(engine.state(), TurnState::Complete);
        assert_eq!(assistant_contents(&engine), vec![NO_RESPONSE_NOTICE]);
    }

    #[tokio::test]
    async fn stale_turn_events_produce_zero_mutation() {
        let mut engine = test_engine();
        let _ = engine.send_message("first");
        let turn_one = engine.current_request_id();
        engine.handle_event(text("one "), turn_one).await;

        // Turn 2 takes over while turn 1's stream is still mid-flight.
        let _ = engine.send_message("second");
        let turn_two = engine.current_request_id();
        assert_ne!(turn_one, turn_two);

        engine.handle_event(text("late delta"), turn_one).await;
        engine.handle_event(end(), turn_one).await;
        engine.handle_event(text("two"), turn_two).await;

        // Turn 1's placeholder was sealed as-is; turn 2's reflects only its
        // own content.
        assert_eq!(assistant_contents(&engine), vec!["one ", "two"]);
        assert_eq!(engine.state(), TurnState::PrimaryStream);
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let mut engine = test_engine();
        let _ = engine.send_message("hello");
        let id = engine.current_request_id();
        engine.handle_event(text("answer"), id).await;
        engine.handle_event(end(), id).await;
        engine.handle_event(end(), id).await;

        assert_eq!(engine.state(), TurnState::Complete);
        assert_eq!(assistant_contents(&engine), vec!["answer"]);
    }

    #[tokio::test]
    async fn cancellation_keeps_partial_text_without_error() {
        let mut engine = test_engine();
        let _ = engine.send_message("hello");
        let id = engine.current_request_id();
        engine.handle_event(text("partial "), id).await;
        engine.handle_event(text("answer"), id).await;

        engine.stop_generation();
        assert_eq!(engine.state(), TurnState::Aborted);

        // Late events from the aborted transport are ignored.
        engine.handle_event(text(" more"), id).await;
        engine.handle_event(end(), id).await;

        assert_eq!(engine.state(), TurnState::Aborted);
        assert_eq!(assistant_contents(&engine), vec!["partial answer"]);
    }

    #[tokio::test]
    async fn transport_failure_replaces_placeholder_with_notice() {
        let mut engine = test_engine();
        let _ = engine.send_message("hello");
        let id = engine.current_request_id();
        engine.handle_event(text("partial"), id).await;
        engine
            .handle_event(StreamEvent::Failed("API Error: boom".to_string()), id)
            .await;

        assert_eq!(engine.state(), TurnState::Errored);
        assert_eq!(assistant_contents(&engine), vec!["API Error: boom"]);
    }

    #[tokio::test]
    async fn tool_failure_still_reaches_complete_with_an_answer() {
        let mut engine = test_engine();
        let _ = engine.send_message("use the tool");
        let id = engine.current_request_id();

        // Registry is empty, so this call resolves to a structured
        // unknown-tool error rather than a fault.
        engine
            .handle_event(tool_delta(Some("call_1"), Some("missing_tool"), Some("{}")), id)
            .await;
        let command = engine.handle_event(end(), id).await;
        assert_eq!(engine.state(), TurnState::FollowUpStream);

        // The follow-up request embeds the structured error for the model.
        let Some(EngineCommand::OpenStream(params)) = command else {
            panic!("expected follow-up stream command");
        };
        assert!(params.tools.is_empty());
        let synthetic_user = params.messages.last().unwrap();
        assert_eq!(synthetic_user.role, "user");
        assert!(synthetic_user.content.contains("unknown tool: missing_tool"));

        engine.handle_event(text("The tool was unavailable."), id).await;
        engine.handle_event(end(), id).await;

        assert_eq!(engine.state(), TurnState::Complete);
        assert_eq!(
            assistant_contents(&engine),
            vec!["The tool was unavailable."]
        );
    }

    #[tokio::test]
    async fn tools_execute_in_first_appearance_order() {
        let mut engine = test_engine();
        let _ = engine.send_message("run tools");
        let id = engine.current_request_id();

        engine
            .handle_event(tool_delta(Some("a"), Some("first"), Some("{\"n\":")), id)
            .await;
        engine.handle_event(tool_delta(None, None, Some("1}")), id).await;
        engine
            .handle_event(tool_delta(Some("b"), Some("second"), Some("{}")), id)
            .await;
        let command = engine.handle_event(end(), id).await;
        assert!(command.is_some());

        assert_eq!(engine.session.tool_records.len(), 2);
        assert_eq!(engine.session.tool_records[0].name, "first");
        assert_eq!(engine.session.tool_records[1].name, "second");
    }

    #[tokio::test]
    async fn empty_follow_up_keeps_primary_text() {
        let mut engine = test_engine();
        let _ = engine.send_message("go");
        let id = engine.current_request_id();

        engine.handle_event(text("primary answer"), id).await;
        engine
            .handle_event(tool_delta(Some("a"), Some("noop"), Some("{}")), id)
            .await;
        engine.handle_event(end(), id).await;
        assert_eq!(engine.state(), TurnState::FollowUpStream);

        engine.handle_event(end(), id).await;
        assert_eq!(engine.state(), TurnState::Complete);
        assert_eq!(assistant_contents(&engine), vec!["primary answer"]);
    }

    #[tokio::test]
    async fn follow_up_text_replaces_interim_notice() {
        let mut engine = test_engine();
        let _ = engine.send_message("go");
        let id = engine.current_request_id();

        engine
            .handle_event(tool_delta(Some("a"), Some("noop"), Some("{}")), id)
            .await;
        engine.handle_event(end(), id).await;
        assert_eq!(assistant_contents(&engine), vec![TOOL_WAIT_NOTICE]);

        engine.handle_event(text("grounded answer"), id).await;
        engine.handle_event(end(), id).await;
        assert_eq!(assistant_contents(&engine), vec!["grounded answer"]);
    }

    #[tokio::test]
    async fn history_includes_prior_turns_and_system_prompt() {
        let mut engine = test_engine();
        let _ = engine.send_message("first question");
        let id = engine.current_request_id();
        engine.handle_event(text("first answer"), id).await;
        engine.handle_event(end(), id).await;

        let EngineCommand::OpenStream(params) = engine.send_message("second question");
        let roles: Vec<_> = params.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(params.messages[2].content, "first answer");
        assert_eq!(params.messages[3].content, "second question");
    }

    #[tokio::test]
    async fn new_turn_cancels_previous_token() {
        let mut engine = test_engine();
        let _ = engine.send_message("first");
        let token = engine.session.cancel_token.clone().unwrap();
        assert!(!token.is_cancelled());

        let _ = engine.send_message("second");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn clear_messages_empties_active_mode_only() {
        let mut engine = test_engine();
        let _ = engine.send_message("general");
        let id = engine.current_request_id();
        engine.handle_event(text("hi"), id).await;
        engine.handle_event(end(), id).await;

        engine.set_mode(ChatMode::Debugging);
        let _ = engine.send_message("debug");
        engine.clear_messages();
        assert!(engine.store().is_empty());

        engine.set_mode(ChatMode::General);
        assert_eq!(engine.store().len(), 2);
    }
}
