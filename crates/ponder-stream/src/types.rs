//! Core types for chat conversations

use serde::{Deserialize, Serialize};

/// Backend-assigned conversation identifier
pub type ConversationId = String;

/// Timestamp format used by the backend for persisted messages
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Streaming phase of a message.
///
/// Governs which channel accepts further deltas. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Message at rest (user input or loaded history)
    #[default]
    NotStreaming,
    /// Accumulating intermediate-thought text
    Reasoning,
    /// Accumulating final-answer text
    Answering,
    /// Stream finished normally
    Complete,
    /// Stream failed
    Errored,
}

impl Phase {
    /// Whether the message can no longer be mutated
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Errored)
    }

    /// Whether a stream is still writing into the message
    pub fn is_streaming(&self) -> bool {
        matches!(self, Phase::Reasoning | Phase::Answering)
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Final-answer text
    #[serde(default)]
    pub content: String,
    /// Intermediate-thought text (may be empty)
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub phase: Phase,
    /// Creation time in unix milliseconds
    #[serde(default)]
    pub timestamp: i64,
    /// Set while waiting for the first answer text
    #[serde(default)]
    pub loading: bool,
    /// Synthetic error message, not assistant content
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, content: String, phase: Phase) -> Self {
        Self {
            role,
            content,
            reasoning: String::new(),
            phase,
            timestamp: chrono::Utc::now().timestamp_millis(),
            loading: false,
            is_error: false,
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), Phase::NotStreaming)
    }

    /// Create an empty assistant message awaiting stream output
    pub fn placeholder() -> Self {
        Self {
            loading: true,
            ..Self::new(Role::Assistant, String::new(), Phase::Reasoning)
        }
    }

    /// Create a synthetic assistant-role error message
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(Role::Assistant, text.into(), Phase::Errored)
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Whether neither channel has received any text
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning.is_empty()
    }
}

/// Message as persisted and returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default = "default_is_user")]
    pub is_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

fn default_is_user() -> bool {
    true
}

impl From<PersistedMessage> for Message {
    fn from(msg: PersistedMessage) -> Self {
        let timestamp = chrono::NaiveDateTime::parse_from_str(&msg.timestamp, TIMESTAMP_FORMAT)
            .map(|t| t.and_utc().timestamp_millis())
            .unwrap_or_default();

        let (role, phase) = match (msg.is_user, msg.is_error) {
            (true, _) => (Role::User, Phase::NotStreaming),
            (false, true) => (Role::Assistant, Phase::Errored),
            (false, false) => (Role::Assistant, Phase::Complete),
        };

        Message {
            role,
            content: msg.content,
            reasoning: msg.reasoning.unwrap_or_default(),
            phase,
            timestamp,
            loading: false,
            is_error: msg.is_error,
        }
    }
}

/// Authoritative conversation state sent with the `done` event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    /// Regenerated title, if the backend produced one
    pub title: Option<String>,
}

/// An ordered sequence of messages with an identifier and a title
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<ConversationId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
        }
    }
}

/// Conversation as returned by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<PersistedMessage>,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Conversation {
            id: record.id,
            title: record.title,
            messages: record.messages.into_iter().map(Message::from).collect(),
        }
    }
}

/// Body of a chat dispatch
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: ConversationId,
    pub model_name: String,
    /// Ask thinking models to stream their reasoning
    pub deep_thinking: bool,
    pub web_search: bool,
}

impl ChatRequest {
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        message: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            conversation_id: conversation_id.into(),
            model_name: model_name.into(),
            deep_thinking: true,
            web_search: false,
        }
    }
}
