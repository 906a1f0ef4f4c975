//! Chat session: drives one stream per conversation into the store

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::StreamExt;
use parking_lot::Mutex;
use ponder_stream::{
    ChatRequest, ConversationId, Dispatcher, Error as StreamError, FailureKind, Frame,
    FrameStream, decode_frames, parse_frame,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    reducer::{FlushMode, Step, StreamReducer},
    store::{ConversationStore, MessageHandle},
};

/// Session configuration
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// When reducer output is published to the store
    pub flush: FlushMode,
    /// Fail the stream when no data arrives for this long
    pub idle_timeout: Option<Duration>,
}

/// How a dispatched stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The reply completed and the conversation was reconciled
    Completed,
    /// The reply failed; the error was appended to the conversation
    Failed { kind: FailureKind, message: String },
    /// A newer stream or a conversation switch took over
    Superseded,
}

/// A stream in flight, keyed by conversation
struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

/// Sends messages and folds the streamed replies into a [`ConversationStore`].
///
/// Cloning is cheap; clones share the store and the in-flight streams.
#[derive(Clone)]
pub struct ChatSession {
    store: ConversationStore,
    dispatcher: Arc<dyn Dispatcher>,
    config: SessionConfig,
    in_flight: Arc<Mutex<HashMap<ConversationId, InFlight>>>,
}

impl ChatSession {
    pub fn new(store: ConversationStore, dispatcher: Arc<dyn Dispatcher>, config: SessionConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Whether a reply is streaming into the conversation
    pub fn is_busy(&self, conversation_id: &str) -> bool {
        self.store.is_streaming(conversation_id)
    }

    /// Send a message and stream the reply into the store.
    ///
    /// Fails up front with `StreamInProgress` when the conversation already
    /// has a reply streaming. Stream failures are not errors: they end up in
    /// the conversation and in the returned outcome.
    ///
    /// Streams are tied to the active conversation. A reply sent into any
    /// other conversation runs until the next [`ChatSession::switch_to`],
    /// which supersedes it.
    pub async fn send(&self, request: ChatRequest) -> Result<StreamOutcome> {
        let handle = self
            .store
            .begin_turn(&request.conversation_id, request.message.clone())?;

        let cancel = CancellationToken::new();
        let previous = self.in_flight.lock().insert(
            handle.conversation_id.clone(),
            InFlight {
                generation: handle.generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        let outcome = self.drive(&handle, &request, &cancel).await;

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight
                .get(&handle.conversation_id)
                .is_some_and(|f| f.generation == handle.generation)
            {
                in_flight.remove(&handle.conversation_id);
            }
        }

        Ok(outcome)
    }

    /// Cancel the reply streaming into a conversation, if any.
    ///
    /// The connection is dropped and nothing more from that stream reaches
    /// the store.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        if let Some(flight) = self.in_flight.lock().remove(conversation_id) {
            flight.cancel.cancel();
        }
        self.store.invalidate(conversation_id)
    }

    /// Make a conversation active, cancelling every stream on other conversations
    pub fn switch_to(&self, conversation_id: &str) -> Result<()> {
        self.store.set_active(conversation_id)?;
        let others: Vec<ConversationId> = self
            .in_flight
            .lock()
            .keys()
            .filter(|id| id.as_str() != conversation_id)
            .cloned()
            .collect();
        for id in others {
            self.cancel(&id);
        }
        Ok(())
    }

    async fn drive(
        &self,
        handle: &MessageHandle,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let mut reducer = StreamReducer::new(self.config.flush);

        let dispatched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return superseded(handle),
            result = self.dispatcher.dispatch(request) => result,
        };
        let bytes = match dispatched {
            Ok(bytes) => bytes,
            Err(e) => {
                let step = reducer.fail_with(e.failure_kind(), e.to_string());
                return self.settle(handle, &reducer, step);
            }
        };

        let mut frames = decode_frames(bytes);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return superseded(handle),
                next = next_frame(&mut frames, self.config.idle_timeout) => next,
            };

            let step = match next {
                Some(Ok(frame)) => match parse_frame(&frame.payload) {
                    Ok(Some(event)) => reducer.apply(event),
                    Ok(None) => continue,
                    Err(e) => reducer.fail_with(FailureKind::Protocol, e.to_string()),
                },
                Some(Err(e)) => reducer.fail_with(e.failure_kind(), e.to_string()),
                None => reducer.fail_with(
                    FailureKind::Transport,
                    StreamError::transport("stream closed before completion").to_string(),
                ),
            };

            match step {
                Step::Ignored | Step::Buffered => continue,
                Step::Progress => {
                    if !self.store.apply_reducer_update(handle, reducer.message()) {
                        return superseded(handle);
                    }
                }
                terminal => return self.settle(handle, &reducer, terminal),
            }
        }
    }

    /// Write a terminal step to the store
    fn settle(&self, handle: &MessageHandle, reducer: &StreamReducer, step: Step) -> StreamOutcome {
        match step {
            Step::Completed(snapshot) => {
                if !self.store.complete(handle, reducer.message(), snapshot) {
                    return superseded(handle);
                }
                tracing::debug!(
                    "Stream for {} completed ({} chars reasoning, {} chars answer)",
                    handle.conversation_id,
                    reducer.message().reasoning.len(),
                    reducer.message().content.len()
                );
                StreamOutcome::Completed
            }
            Step::Failed { kind, error } => {
                if !self.store.fail(handle, reducer.message(), &error) {
                    return superseded(handle);
                }
                match kind {
                    FailureKind::Transport => {
                        tracing::warn!("Stream for {} failed: {}", handle.conversation_id, error)
                    }
                    FailureKind::Protocol => tracing::error!(
                        "Protocol violation in stream for {}: {}",
                        handle.conversation_id,
                        error
                    ),
                    FailureKind::Application => tracing::info!(
                        "Service reported an error for {}: {}",
                        handle.conversation_id,
                        error
                    ),
                }
                StreamOutcome::Failed {
                    kind,
                    message: error,
                }
            }
            Step::Ignored | Step::Progress | Step::Buffered => StreamOutcome::Superseded,
        }
    }
}

fn superseded(handle: &MessageHandle) -> StreamOutcome {
    tracing::debug!(
        "Stream for {} superseded (generation {})",
        handle.conversation_id,
        handle.generation
    );
    StreamOutcome::Superseded
}

async fn next_frame(
    frames: &mut FrameStream,
    idle_timeout: Option<Duration>,
) -> Option<ponder_stream::Result<Frame>> {
    match idle_timeout {
        None => frames.next().await,
        Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
            Ok(next) => next,
            Err(_) => Some(Err(StreamError::transport(format!(
                "stream stalled: no data for {:?}",
                limit
            )))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use ponder_stream::{ByteStream, Conversation, Message, Phase};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// What a mock dispatch returns
    enum Reply {
        /// Chunks delivered back to back, then the body ends
        Chunks(Vec<&'static str>),
        /// First chunks, then wait for the gate, then the rest
        Gated {
            before: Vec<&'static str>,
            gate: Arc<Notify>,
            after: Vec<&'static str>,
        },
        /// Chunks, then a read error
        Broken(Vec<&'static str>),
        /// Chunks, then nothing ever again
        Stalled(Vec<&'static str>),
        /// Dispatch itself fails
        Refused,
    }

    struct MockDispatcher {
        replies: Mutex<Vec<Reply>>,
        calls: AtomicUsize,
    }

    impl MockDispatcher {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn ok(chunk: &'static str) -> ponder_stream::Result<Bytes> {
        Ok(Bytes::from_static(chunk.as_bytes()))
    }

    #[async_trait]
    impl Dispatcher for MockDispatcher {
        async fn dispatch(&self, _request: &ChatRequest) -> ponder_stream::Result<ByteStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().remove(0);
            let stream: ByteStream = match reply {
                Reply::Chunks(chunks) => Box::pin(futures::stream::iter(chunks.into_iter().map(ok))),
                Reply::Gated {
                    before,
                    gate,
                    after,
                } => Box::pin(async_stream::stream! {
                    for chunk in before {
                        yield ok(chunk);
                    }
                    gate.notified().await;
                    for chunk in after {
                        yield ok(chunk);
                    }
                }),
                Reply::Broken(chunks) => Box::pin(async_stream::stream! {
                    for chunk in chunks {
                        yield ok(chunk);
                    }
                    yield Err(StreamError::transport("connection reset by peer"));
                }),
                Reply::Stalled(chunks) => Box::pin(
                    futures::stream::iter(chunks.into_iter().map(ok))
                        .chain(futures::stream::pending()),
                ),
                Reply::Refused => {
                    return Err(StreamError::Api {
                        status: 503,
                        message: "service unavailable".into(),
                    });
                }
            };
            Ok(stream)
        }
    }

    const DONE_42: &str = concat!(
        "data: {\"type\":\"done\",\"title\":\"Deep thought\",\"messages\":[",
        "{\"content\":\"question\",\"timestamp\":\"2025-03-01 12:00:00\"},",
        "{\"content\":\"42\",\"timestamp\":\"2025-03-01 12:00:05\",\"isUser\":false,\"reasoning\":\"Let me think\"}",
        "]}\n\n"
    );

    fn session(replies: Vec<Reply>, config: SessionConfig) -> (ChatSession, Arc<MockDispatcher>) {
        let store = ConversationStore::new();
        store.replace_all(vec![
            Conversation::new("c1", "New chat"),
            Conversation::new("c2", "Other chat"),
        ]);
        let dispatcher = MockDispatcher::new(replies);
        (ChatSession::new(store, dispatcher.clone(), config), dispatcher)
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new("c1", text, "qwen-plus")
    }

    fn last_message(session: &ChatSession) -> Message {
        session
            .store()
            .list_messages("c1")
            .last()
            .cloned()
            .expect("conversation has messages")
    }

    async fn wait_for_reasoning(session: &ChatSession, handle_index: usize, text: &str) {
        let mut rx = session.store().subscribe();
        loop {
            let messages = session.store().list_messages("c1");
            if messages.get(handle_index).is_some_and(|m| m.reasoning == text) {
                return;
            }
            rx.recv().await.expect("store notification");
        }
    }

    #[tokio::test]
    async fn test_reasoning_answer_done_scenario() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"reasoning\",\"content\":\"Let\"}\n\n",
                "data: {\"type\":\"reasoning\",\"content\":\" me think\"}\n\n",
                "data: {\"type\":\"answer_start\",\"content\":\"\"}\n\n",
                "data: {\"type\":\"answer\",\"content\":\"42\"}\n\n",
                DONE_42,
            ])],
            SessionConfig::default(),
        );

        let outcome = session.send(request("question")).await.unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);

        let msg = last_message(&session);
        assert_eq!(msg.reasoning, "Let me think");
        assert_eq!(msg.content, "42");
        assert_eq!(msg.phase, Phase::Complete);
        assert_eq!(session.store().conversation("c1").unwrap().title, "Deep thought");
        assert!(!session.is_busy("c1"));
    }

    #[tokio::test]
    async fn test_chunk_splits_do_not_change_result() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"reasoning\",\"con",
                "tent\":\"Let\"}\n",
                "\ndata: {\"type\":\"reasoning\",\"content\":\" me think\"}\n\nda",
                "ta: {\"type\":\"answer\",\"content\":\"42\"}\n\n",
                DONE_42,
            ])],
            SessionConfig::default(),
        );

        session.send(request("question")).await.unwrap();
        let msg = last_message(&session);
        assert_eq!(msg.reasoning, "Let me think");
        assert_eq!(msg.content, "42");
    }

    #[tokio::test]
    async fn test_answer_without_start_with_empty_snapshot() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"answer\",\"content\":\"Hi\"}\n\n",
                "data: {\"type\":\"done\",\"messages\":[]}\n\n",
            ])],
            SessionConfig::default(),
        );

        assert_eq!(
            session.send(request("hello")).await.unwrap(),
            StreamOutcome::Completed
        );
        let messages = session.store().list_messages("c1");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Hi");
        assert_eq!(messages[1].phase, Phase::Complete);
        assert!(!messages[1].loading);
    }

    #[tokio::test]
    async fn test_transport_close_mid_reasoning() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"reasoning\",\"content\":\"x\"}\n\n",
            ])],
            SessionConfig::default(),
        );

        let outcome = session.send(request("q")).await.unwrap();
        assert!(matches!(
            outcome,
            StreamOutcome::Failed {
                kind: FailureKind::Transport,
                ..
            }
        ));

        let messages = session.store().list_messages("c1");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].phase, Phase::Errored);
        assert_eq!(messages[1].reasoning, "x");
        assert_eq!(messages[1].content, "");
        assert!(messages[2].is_error);
        assert!(!session.is_busy("c1"));
    }

    #[tokio::test]
    async fn test_unterminated_done_fails_the_turn() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"answer\",\"content\":\"Hi\"}\n\n",
                "data: {\"type\":\"done\",\"messages\":[]}\n",
            ])],
            SessionConfig::default(),
        );

        let outcome = session.send(request("q")).await.unwrap();
        assert!(matches!(
            outcome,
            StreamOutcome::Failed {
                kind: FailureKind::Transport,
                ..
            }
        ));
        let messages = session.store().list_messages("c1");
        assert_eq!(messages[1].content, "Hi");
        assert_eq!(messages[1].phase, Phase::Errored);
    }

    #[tokio::test]
    async fn test_read_error_is_transport_failure() {
        let (session, _) = session(
            vec![Reply::Broken(vec![
                "data: {\"type\":\"answer\",\"content\":\"par\"}\n\n",
            ])],
            SessionConfig::default(),
        );

        let outcome = session.send(request("q")).await.unwrap();
        let StreamOutcome::Failed { kind, message } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::Transport);
        assert!(message.contains("connection reset"));
        assert_eq!(session.store().list_messages("c1")[1].content, "par");
    }

    #[tokio::test]
    async fn test_application_error_is_shown_verbatim() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"reasoning\",\"content\":\"hm\"}\n\n",
                "data: {\"type\":\"error\",\"error\":\"AI service error: quota exceeded\"}\n\n",
            ])],
            SessionConfig::default(),
        );

        let outcome = session.send(request("q")).await.unwrap();
        assert_eq!(
            outcome,
            StreamOutcome::Failed {
                kind: FailureKind::Application,
                message: "AI service error: quota exceeded".into()
            }
        );
        let error = last_message(&session);
        assert!(error.is_error);
        assert_eq!(error.content, "AI service error: quota exceeded");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_protocol_failure() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"answer\",\"content\":\"ok\"}\n\n",
                "data: {not json}\n\n",
                "data: {\"type\":\"answer\",\"content\":\" ignored\"}\n\n",
            ])],
            SessionConfig::default(),
        );

        let outcome = session.send(request("q")).await.unwrap();
        assert!(matches!(
            outcome,
            StreamOutcome::Failed {
                kind: FailureKind::Protocol,
                ..
            }
        ));
        assert_eq!(session.store().list_messages("c1")[1].content, "ok");
    }

    #[tokio::test]
    async fn test_unknown_frame_types_are_skipped() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                ": ping\n\n",
                "data: {\"type\":\"usage\",\"tokens\":3}\n\n",
                "data: {\"type\":\"answer\",\"content\":\"fine\"}\n\n",
                "data: {\"type\":\"done\",\"messages\":[]}\n\n",
            ])],
            SessionConfig::default(),
        );

        assert_eq!(
            session.send(request("q")).await.unwrap(),
            StreamOutcome::Completed
        );
        assert_eq!(last_message(&session).content, "fine");
    }

    #[tokio::test]
    async fn test_refused_dispatch_fails_turn() {
        let (session, _) = session(vec![Reply::Refused], SessionConfig::default());

        let outcome = session.send(request("q")).await.unwrap();
        assert!(matches!(
            outcome,
            StreamOutcome::Failed {
                kind: FailureKind::Transport,
                ..
            }
        ));
        let error = last_message(&session);
        assert!(error.is_error);
        assert!(error.content.contains("service unavailable"));
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let (session, _) = session(
            vec![Reply::Stalled(vec![
                "data: {\"type\":\"reasoning\",\"content\":\"slow\"}\n\n",
            ])],
            SessionConfig {
                idle_timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        );

        let outcome = session.send(request("q")).await.unwrap();
        let StreamOutcome::Failed { kind, message } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::Transport);
        assert!(message.contains("stalled"));
        assert_eq!(session.store().list_messages("c1")[1].reasoning, "slow");
    }

    #[tokio::test]
    async fn test_buffered_mode_publishes_once() {
        let (session, _) = session(
            vec![Reply::Chunks(vec![
                "data: {\"type\":\"reasoning\",\"content\":\"a\"}\n\n",
                "data: {\"type\":\"answer\",\"content\":\"b\"}\n\n",
                "data: {\"type\":\"answer\",\"content\":\"c\"}\n\n",
                "data: {\"type\":\"done\",\"messages\":[]}\n\n",
            ])],
            SessionConfig {
                flush: FlushMode::Buffered,
                ..Default::default()
            },
        );

        let mut rx = session.store().subscribe();
        session.send(request("q")).await.unwrap();

        let mut changes = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, crate::StoreEvent::MessagesChanged { .. }) {
                changes += 1;
            }
        }
        // One for the new turn, one for completion
        assert_eq!(changes, 2);
        let msg = last_message(&session);
        assert_eq!(msg.reasoning, "a");
        assert_eq!(msg.content, "bc");
    }

    #[tokio::test]
    async fn test_dispatch_rejected_while_streaming() {
        let gate = Arc::new(Notify::new());
        let (session, dispatcher) = session(
            vec![Reply::Gated {
                before: vec!["data: {\"type\":\"reasoning\",\"content\":\"x\"}\n\n"],
                gate: gate.clone(),
                after: vec!["data: {\"type\":\"done\",\"messages\":[]}\n\n"],
            }],
            SessionConfig::default(),
        );

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.send(request("first")).await })
        };
        wait_for_reasoning(&session, 1, "x").await;

        assert!(session.is_busy("c1"));
        assert!(matches!(
            session.send(request("second")).await,
            Err(crate::Error::StreamInProgress(_))
        ));
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert_eq!(running.await.unwrap().unwrap(), StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn test_stale_stream_cannot_touch_store() {
        let gate = Arc::new(Notify::new());
        let (session, _) = session(
            vec![Reply::Gated {
                before: vec!["data: {\"type\":\"reasoning\",\"content\":\"x\"}\n\n"],
                gate: gate.clone(),
                after: vec![
                    "data: {\"type\":\"answer\",\"content\":\"late\"}\n\n",
                    DONE_42,
                ],
            }],
            SessionConfig::default(),
        );

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.send(request("first")).await })
        };
        wait_for_reasoning(&session, 1, "x").await;

        // Invalidate without cancelling: the stream keeps delivering
        assert!(session.store().invalidate("c1"));
        let before = session.store().conversation("c1").unwrap();

        gate.notify_one();
        assert_eq!(running.await.unwrap().unwrap(), StreamOutcome::Superseded);
        assert_eq!(session.store().conversation("c1").unwrap(), before);
    }

    #[tokio::test]
    async fn test_switch_cancels_stream_and_new_stream_wins() {
        let gate = Arc::new(Notify::new());
        let (session, _) = session(
            vec![
                Reply::Gated {
                    before: vec!["data: {\"type\":\"reasoning\",\"content\":\"x\"}\n\n"],
                    gate: gate.clone(),
                    after: vec![
                        "data: {\"type\":\"done\",\"title\":\"Stale\",\"messages\":[]}\n\n",
                    ],
                },
                Reply::Chunks(vec![
                    "data: {\"type\":\"answer\",\"content\":\"42\"}\n\n",
                    "data: {\"type\":\"done\",\"title\":\"Fresh\",\"messages\":[]}\n\n",
                ]),
            ],
            SessionConfig::default(),
        );
        session.switch_to("c1").unwrap();

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.send(request("first")).await })
        };
        wait_for_reasoning(&session, 1, "x").await;

        session.switch_to("c2").unwrap();
        assert!(!session.is_busy("c1"));
        assert_eq!(first.await.unwrap().unwrap(), StreamOutcome::Superseded);

        session.switch_to("c1").unwrap();
        assert_eq!(
            session.send(request("second")).await.unwrap(),
            StreamOutcome::Completed
        );
        gate.notify_one();

        let conv = session.store().conversation("c1").unwrap();
        assert_eq!(conv.title, "Fresh");
        assert_eq!(conv.messages.len(), 4);
        assert_eq!(conv.messages[1].reasoning, "x");
        assert_eq!(conv.messages[1].phase, Phase::Errored);
        assert!(!conv.messages[1].loading);
        assert!(!conv.messages[1].is_error);
        assert_eq!(conv.messages[3].content, "42");
        assert_eq!(conv.messages[3].phase, Phase::Complete);
    }

    #[tokio::test]
    async fn test_switch_supersedes_stream_on_inactive_conversation() {
        let gate = Arc::new(Notify::new());
        let (session, _) = session(
            vec![Reply::Gated {
                before: vec!["data: {\"type\":\"reasoning\",\"content\":\"x\"}\n\n"],
                gate: gate.clone(),
                after: vec![DONE_42],
            }],
            SessionConfig::default(),
        );
        session.switch_to("c2").unwrap();

        // c1 is not active while its reply streams
        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.send(request("first")).await })
        };
        wait_for_reasoning(&session, 1, "x").await;

        // Re-selecting c2 is not a switch, but still leaves c1 without a stream
        session.switch_to("c2").unwrap();
        assert!(!session.is_busy("c1"));
        assert_eq!(running.await.unwrap().unwrap(), StreamOutcome::Superseded);
        gate.notify_one();

        let orphan = last_message(&session);
        assert_eq!(orphan.reasoning, "x");
        assert_eq!(orphan.phase, Phase::Errored);
        assert!(!orphan.loading);
        assert_eq!(session.store().list_messages("c1").len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_without_stream_is_noop() {
        let (session, _) = session(vec![], SessionConfig::default());
        assert!(!session.cancel("c1"));
        assert!(matches!(
            session.switch_to("missing"),
            Err(crate::Error::ConversationNotFound(_))
        ));
    }
}
