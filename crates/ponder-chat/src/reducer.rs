//! Stream reducer: folds stream events into one evolving message
//!
//! Phases move `Reasoning -> Answering -> Complete`, with `Errored` reachable
//! from either streaming phase. Nothing moves backward and a terminal message
//! is never touched again.

use ponder_stream::{ConversationSnapshot, FailureKind, Message, Phase, StreamEvent};

/// When accepted deltas become visible to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Publish after every accepted delta
    #[default]
    Incremental,
    /// Hold deltas and publish only the terminal state
    Buffered,
}

/// Outcome of applying one event
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Event had no effect on the message
    Ignored,
    /// Message changed and should be published now
    Progress,
    /// Message changed but publication is deferred
    Buffered,
    /// Message is complete; reconcile with the snapshot
    Completed(ConversationSnapshot),
    /// Message failed
    Failed { kind: FailureKind, error: String },
}

/// Builds an assistant message from stream events
#[derive(Debug, Clone)]
pub struct StreamReducer {
    message: Message,
    flush: FlushMode,
}

impl StreamReducer {
    /// Start from a fresh placeholder
    pub fn new(flush: FlushMode) -> Self {
        Self::with_message(Message::placeholder(), flush)
    }

    /// Start from an existing placeholder
    pub fn with_message(message: Message, flush: FlushMode) -> Self {
        Self { message, flush }
    }

    /// The message as built so far
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn phase(&self) -> Phase {
        self.message.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.message.phase.is_terminal()
    }

    /// Apply one event in arrival order
    pub fn apply(&mut self, event: StreamEvent) -> Step {
        if self.is_terminal() {
            tracing::debug!(
                "Ignoring {} after terminal phase {:?}",
                event.kind(),
                self.message.phase
            );
            return Step::Ignored;
        }

        match event {
            StreamEvent::ReasoningDelta { text } => {
                if self.message.phase != Phase::Reasoning {
                    tracing::debug!("Ignoring reasoning delta during {:?}", self.message.phase);
                    return Step::Ignored;
                }
                self.message.reasoning.push_str(&text);
                self.changed()
            }
            StreamEvent::AnswerStart => {
                if self.message.phase == Phase::Answering {
                    return Step::Ignored;
                }
                self.message.phase = Phase::Answering;
                self.changed()
            }
            StreamEvent::AnswerDelta { text } => {
                // The marker may be omitted, so a delta opens the answer channel itself.
                self.message.phase = Phase::Answering;
                self.message.content.push_str(&text);
                if !self.message.content.is_empty() {
                    self.message.loading = false;
                }
                self.changed()
            }
            StreamEvent::Completed { snapshot } => {
                self.message.phase = Phase::Complete;
                self.message.loading = false;
                Step::Completed(snapshot)
            }
            StreamEvent::Failed { error } => self.fail_with(FailureKind::Application, error),
        }
    }

    /// Fail the message, keeping whatever text accumulated so far
    pub fn fail_with(&mut self, kind: FailureKind, error: impl Into<String>) -> Step {
        if self.is_terminal() {
            return Step::Ignored;
        }
        self.message.phase = Phase::Errored;
        self.message.loading = false;
        Step::Failed {
            kind,
            error: error.into(),
        }
    }

    fn changed(&self) -> Step {
        match self.flush {
            FlushMode::Incremental => Step::Progress,
            FlushMode::Buffered => Step::Buffered,
        }
    }
}
