//! Chatting with an agent: streamed turns recorded into conversation history.
//!
//! [`AgentChat`] owns one [`ConversationStore`] per agent. A turn appends the
//! user's message, streams the reply, and appends whatever text arrived as a
//! single assistant message once the turn ends, however it ends. A turn that
//! fails or is cancelled halfway keeps its partial reply.
//!
//! # Example
//!
//! ```ignore
//! let mut chat = AgentChat::from_config(&config);
//! chat.restore()?;
//!
//! let request = TurnRequest::new(AgentEndpoint::inspector(), "hello");
//! let summary = chat.run_turn(request, |text| print!("{text}"));
//! println!("\n[{:?}]", summary.outcome);
//! ```

use std::sync::Arc;

use chrono::Utc;

use crate::config::ClientConfig;
use crate::conversation::{
    ConversationStore, HistoryError, HistorySnapshot, HistoryStore, JsonFileHistory, Message,
};
use crate::error::StreamError;
use crate::event_bus::{EventBus, TurnEvent, TurnEventKind};
use crate::paths;
use crate::session::{
    CancelHandle, SessionController, SessionId, SessionState, StreamEvent, StreamHandle,
    TurnRequest,
};
use crate::transport::TransportKind;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(StreamError),
    Cancelled,
}

/// Result of a finished turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    pub session_id: SessionId,
    pub outcome: TurnOutcome,
    /// All payload text, concatenated.
    pub content: String,
}

pub struct AgentChat {
    controller: SessionController,
    conversations: HistorySnapshot,
    history: Option<Box<dyn HistoryStore>>,
    bus: Option<Arc<EventBus>>,
}

impl AgentChat {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller,
            conversations: HistorySnapshot::default(),
            history: None,
            bus: None,
        }
    }

    /// HTTP transports plus a JSON history file at the configured (or default) path.
    pub fn from_config(config: &ClientConfig) -> Self {
        let chat = Self::new(SessionController::new(config));
        match config
            .history_path
            .clone()
            .or_else(paths::default_history_path)
        {
            Some(path) => chat.with_history(Box::new(JsonFileHistory::new(path))),
            None => chat,
        }
    }

    pub fn with_history(mut self, history: Box<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replace in-memory conversations with the saved ones.
    ///
    /// Returns false (and keeps the current state) if nothing was saved yet.
    pub fn restore(&mut self) -> Result<bool, HistoryError> {
        let Some(ref history) = self.history else {
            return Ok(false);
        };
        match history.load()? {
            Some(snapshot) => {
                self.conversations = snapshot;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save all conversations. A no-op without a history store.
    pub fn persist(&mut self) -> Result<(), HistoryError> {
        let Some(ref history) = self.history else {
            return Ok(());
        };
        self.conversations.saved_at = Some(Utc::now());
        history.save(&self.conversations)
    }

    /// Messages of one chat; empty if it doesn't exist.
    pub fn history(&self, agent: &str, chat_id: &SessionId) -> &[Message] {
        match self.conversations.agent(agent) {
            Some(store) => store.messages(chat_id),
            None => &[],
        }
    }

    pub fn conversations(&self, agent: &str) -> Option<&ConversationStore> {
        self.conversations.agent(agent)
    }

    /// Names of agents with at least one saved chat.
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.conversations
            .agents
            .iter()
            .filter(|(_, store)| !store.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Delete a chat and save. Returns whether it existed.
    pub fn delete_chat(&mut self, agent: &str, chat_id: &SessionId) -> bool {
        let removed = self.conversations.agent_mut(agent).delete(chat_id);
        if removed {
            self.persist_or_warn();
        }
        removed
    }

    /// Start a turn.
    ///
    /// A request without a chat id gets a fresh one. The user message is
    /// recorded before anything is sent.
    pub fn begin_turn(&mut self, mut request: TurnRequest) -> ActiveTurn<'_> {
        let session_id = match request.chat_id {
            Some(ref id) => SessionId::from(id.as_str()),
            None => {
                let id = SessionId::new();
                request.chat_id = Some(id.to_string());
                id
            }
        };
        let agent = request.agent.name.clone();

        self.conversations
            .agent_mut(&agent)
            .append_user(&session_id, request.message.clone());
        self.emit(&agent, &session_id, TurnEventKind::Started);

        let handle = self.controller.start(&request);
        ActiveTurn {
            chat: self,
            agent,
            session_id,
            handle,
            buffer: String::new(),
            outcome: None,
        }
    }

    /// Run a turn to its end, calling `on_payload` for each piece of text.
    pub fn run_turn<F>(&mut self, request: TurnRequest, mut on_payload: F) -> TurnSummary
    where
        F: FnMut(&str),
    {
        let mut turn = self.begin_turn(request);
        while let Some(event) = turn.next() {
            if let StreamEvent::Payload(ref text) = event {
                on_payload(text);
            }
        }
        turn.finish()
    }

    fn emit(&self, agent: &str, session_id: &SessionId, kind: TurnEventKind) {
        if let Some(ref bus) = self.bus {
            bus.emit(TurnEvent::new(agent, session_id.clone(), kind));
        }
    }

    fn persist_or_warn(&mut self) {
        if let Err(e) = self.persist() {
            log::warn!("failed to save chat history: {}", e);
        }
    }
}

/// A turn in progress.
///
/// Iterates the same [`StreamEvent`]s as the underlying stream. Dropping it
/// before the end cancels the turn; the partial reply is still recorded.
pub struct ActiveTurn<'a> {
    chat: &'a mut AgentChat,
    agent: String,
    session_id: SessionId,
    handle: StreamHandle,
    buffer: String,
    outcome: Option<TurnOutcome>,
}

impl ActiveTurn<'_> {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn transport(&self) -> TransportKind {
        self.handle.transport()
    }

    /// Reply text received so far.
    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Set once the turn has ended.
    pub fn outcome(&self) -> Option<&TurnOutcome> {
        self.outcome.as_ref()
    }

    pub fn canceller(&self) -> CancelHandle {
        self.handle.canceller()
    }

    /// Cancel the turn. Returns false if it had already ended.
    pub fn cancel(&mut self) -> bool {
        if !self.handle.cancel() {
            return false;
        }
        self.end(TurnOutcome::Cancelled);
        true
    }

    /// Drive the turn to its end and summarize it.
    pub fn finish(mut self) -> TurnSummary {
        while self.next().is_some() {}
        TurnSummary {
            session_id: self.session_id.clone(),
            outcome: self.outcome.clone().unwrap_or(TurnOutcome::Cancelled),
            content: std::mem::take(&mut self.buffer),
        }
    }

    /// Record the outcome and the reply. Only the first call has an effect.
    fn end(&mut self, outcome: TurnOutcome) {
        if self.outcome.is_some() {
            return;
        }
        let kind = match outcome {
            TurnOutcome::Completed => TurnEventKind::Completed,
            TurnOutcome::Failed(ref e) => TurnEventKind::Failed(e.clone()),
            TurnOutcome::Cancelled => TurnEventKind::Cancelled,
        };
        self.outcome = Some(outcome);

        if !self.buffer.is_empty() {
            self.chat
                .conversations
                .agent_mut(&self.agent)
                .append_assistant(&self.session_id, self.buffer.clone());
        }
        self.chat.persist_or_warn();
        self.chat.emit(&self.agent, &self.session_id, kind);
    }
}

impl Iterator for ActiveTurn<'_> {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        let Some(event) = self.handle.next() else {
            // Ended without a terminal event: cancelled, possibly from another thread.
            if self.handle.state() == SessionState::Cancelled {
                self.end(TurnOutcome::Cancelled);
            }
            return None;
        };

        match event {
            StreamEvent::Payload(ref text) => {
                self.buffer.push_str(text);
                self.chat.emit(
                    &self.agent,
                    &self.session_id,
                    TurnEventKind::Payload(text.clone()),
                );
            }
            StreamEvent::Completed => self.end(TurnOutcome::Completed),
            StreamEvent::Failed(ref e) => self.end(TurnOutcome::Failed(e.clone())),
        }
        Some(event)
    }
}

impl Drop for ActiveTurn<'_> {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.handle.cancel();
            self.end(TurnOutcome::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AgentEndpoint, ImageAttachment};
    use crate::transport::{Transport, TransportSink};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Sends its payloads, then the given ending (or nothing, holding the sink open).
    struct Reply {
        payloads: Vec<&'static str>,
        ending: Option<Result<(), StreamError>>,
        held: Mutex<Vec<TransportSink>>,
    }

    impl Reply {
        fn completing(payloads: Vec<&'static str>) -> Arc<Self> {
            Self::with(payloads, Some(Ok(())))
        }

        fn with(
            payloads: Vec<&'static str>,
            ending: Option<Result<(), StreamError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                payloads,
                ending,
                held: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for Reply {
        fn kind(&self) -> TransportKind {
            TransportKind::EventStream
        }

        fn open(&self, _request: &TurnRequest, sink: TransportSink) -> Result<(), StreamError> {
            for payload in &self.payloads {
                sink.payload(*payload);
            }
            match self.ending {
                Some(Ok(())) => sink.complete(),
                Some(Err(ref e)) => sink.fail(e.clone()),
                None => {}
            }
            self.held.lock().unwrap().push(sink);
            Ok(())
        }
    }

    fn chat_with(reply: Arc<Reply>) -> AgentChat {
        AgentChat::new(SessionController::with_transports(reply.clone(), reply))
    }

    fn request(chat_id: &str) -> TurnRequest {
        TurnRequest::new(AgentEndpoint::inspector(), "hi").chat_id(chat_id)
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    mod turns {
        use super::*;
        use crate::conversation::Role;

        #[test]
        fn completed_turn_records_user_and_assistant() {
            let mut chat = chat_with(Reply::completing(vec!["Hel", "lo"]));
            let mut seen = Vec::new();

            let summary = chat.run_turn(request("abc"), |text| seen.push(text.to_string()));

            assert_eq!(seen, vec!["Hel", "lo"]);
            assert_eq!(summary.outcome, TurnOutcome::Completed);
            assert_eq!(summary.content, "Hello");
            assert_eq!(summary.session_id, SessionId::from("abc"));

            let messages = chat.history("inspector", &SessionId::from("abc"));
            assert_eq!(contents(messages), vec!["hi", "Hello"]);
            assert_eq!(messages[0].role, Role::User);
            assert_eq!(messages[1].role, Role::Assistant);
        }

        #[test]
        fn failed_turn_keeps_partial_reply() {
            let reply = Reply::with(
                vec!["partial"],
                Some(Err(StreamError::Read("reset".to_string()))),
            );
            let mut chat = chat_with(reply);

            let summary = chat.run_turn(request("abc"), |_| {});

            assert_eq!(
                summary.outcome,
                TurnOutcome::Failed(StreamError::Read("reset".to_string()))
            );
            assert_eq!(
                contents(chat.history("inspector", &SessionId::from("abc"))),
                vec!["hi", "partial"]
            );
        }

        #[test]
        fn failure_before_any_text_records_only_user_message() {
            let mut chat = chat_with(Reply::with(Vec::new(), Some(Err(StreamError::Status(500)))));
            chat.run_turn(request("abc"), |_| {});
            assert_eq!(
                contents(chat.history("inspector", &SessionId::from("abc"))),
                vec!["hi"]
            );
        }

        #[test]
        fn missing_chat_id_is_generated() {
            let mut chat = chat_with(Reply::completing(vec!["ok"]));
            let summary = chat.run_turn(TurnRequest::new(AgentEndpoint::manus(), "plan"), |_| {});

            assert!(!summary.session_id.as_str().is_empty());
            assert_eq!(chat.history("manus", &summary.session_id).len(), 2);
        }

        #[test]
        fn agents_keep_separate_histories() {
            let mut chat = chat_with(Reply::completing(vec!["ok"]));
            chat.run_turn(request("same"), |_| {});
            chat.run_turn(
                TurnRequest::new(AgentEndpoint::manus(), "other").chat_id("same"),
                |_| {},
            );

            let id = SessionId::from("same");
            assert_eq!(contents(chat.history("inspector", &id)), vec!["hi", "ok"]);
            assert_eq!(contents(chat.history("manus", &id)), vec!["other", "ok"]);
            assert!(chat.history("unknown", &id).is_empty());
            assert_eq!(chat.agents().collect::<Vec<_>>(), vec!["inspector", "manus"]);
        }

        #[test]
        fn image_turns_are_recorded_like_text_turns() {
            let mut chat = chat_with(Reply::completing(vec!["a cat"]));
            let request = request("abc").image(ImageAttachment::new("c.png", "image/png", vec![0]));
            let summary = chat.run_turn(request, |_| {});
            assert_eq!(summary.content, "a cat");
        }
    }

    mod cancellation {
        use super::*;

        #[test]
        fn cancel_mid_turn_keeps_received_text() {
            let mut chat = chat_with(Reply::with(vec!["a", "b"], None));

            let mut turn = chat.begin_turn(request("abc"));
            assert_eq!(turn.next(), Some(StreamEvent::Payload("a".to_string())));
            assert!(turn.cancel());
            assert!(!turn.cancel());
            assert!(turn.next().is_none());
            assert_eq!(turn.outcome(), Some(&TurnOutcome::Cancelled));
            drop(turn);

            assert_eq!(
                contents(chat.history("inspector", &SessionId::from("abc"))),
                vec!["hi", "a"]
            );
        }

        #[test]
        fn cancel_from_another_thread_ends_turn() {
            let mut chat = chat_with(Reply::with(Vec::new(), None));
            let mut turn = chat.begin_turn(request("abc"));
            let canceller = turn.canceller();

            let worker = std::thread::spawn(move || canceller.cancel());
            assert!(turn.next().is_none());
            worker.join().unwrap();

            let summary = turn.finish();
            assert_eq!(summary.outcome, TurnOutcome::Cancelled);
            assert!(summary.content.is_empty());
        }

        #[test]
        fn dropping_turn_records_partial_reply() {
            let mut chat = chat_with(Reply::with(vec!["part"], None));
            {
                let mut turn = chat.begin_turn(request("abc"));
                assert!(turn.next().is_some());
            }
            assert_eq!(
                contents(chat.history("inspector", &SessionId::from("abc"))),
                vec!["hi", "part"]
            );
        }
    }

    mod persistence {
        use super::*;

        #[test]
        fn turns_are_saved_and_restored() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("history.json");

            let mut chat = chat_with(Reply::completing(vec!["Hello"]))
                .with_history(Box::new(JsonFileHistory::new(&path)));
            assert!(!chat.restore().unwrap());
            chat.run_turn(request("abc"), |_| {});

            let mut reopened = chat_with(Reply::completing(Vec::new()))
                .with_history(Box::new(JsonFileHistory::new(&path)));
            assert!(reopened.restore().unwrap());
            assert_eq!(
                contents(reopened.history("inspector", &SessionId::from("abc"))),
                vec!["hi", "Hello"]
            );
        }

        #[test]
        fn delete_chat_is_saved() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("history.json");

            let mut chat = chat_with(Reply::completing(vec!["x"]))
                .with_history(Box::new(JsonFileHistory::new(&path)));
            chat.run_turn(request("abc"), |_| {});
            assert!(chat.delete_chat("inspector", &SessionId::from("abc")));
            assert!(!chat.delete_chat("inspector", &SessionId::from("abc")));

            let snapshot = JsonFileHistory::new(&path).load().unwrap().unwrap();
            assert!(snapshot.agent("inspector").unwrap().is_empty());
        }

        #[test]
        fn without_history_store_persist_is_noop() {
            let mut chat = chat_with(Reply::completing(Vec::new()));
            assert!(chat.persist().is_ok());
            assert!(!chat.restore().unwrap());
        }
    }

    mod events {
        use super::*;

        #[test]
        fn turn_events_are_broadcast() {
            let bus = Arc::new(EventBus::new());
            let mut rx = bus.subscribe();
            let mut chat = chat_with(Reply::completing(vec!["Hi"])).with_event_bus(bus);

            chat.run_turn(request("abc"), |_| {});

            let kinds: Vec<TurnEventKind> =
                std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    TurnEventKind::Started,
                    TurnEventKind::Payload("Hi".to_string()),
                    TurnEventKind::Completed,
                ]
            );
        }
    }
}
