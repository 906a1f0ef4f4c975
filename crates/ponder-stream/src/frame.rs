//! Typed stream events and the frame payload parser

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    types::{ConversationSnapshot, Message, PersistedMessage},
};

/// Events delivered by a chat stream, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Intermediate-thought text fragment
    ReasoningDelta { text: String },
    /// The answer channel opened
    AnswerStart,
    /// Final-answer text fragment
    AnswerDelta { text: String },
    /// Stream finished; carries the persisted conversation
    Completed { snapshot: ConversationSnapshot },
    /// The service reported an error
    Failed { error: String },
}

impl StreamEvent {
    /// Check if this is a terminal event (Completed or Failed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Completed { .. } | StreamEvent::Failed { .. }
        )
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::ReasoningDelta { .. } => "reasoning-delta",
            StreamEvent::AnswerStart => "answer-start",
            StreamEvent::AnswerDelta { .. } => "answer-delta",
            StreamEvent::Completed { .. } => "completed",
            StreamEvent::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TextPayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct DonePayload {
    messages: Vec<PersistedMessage>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

/// Parse one frame payload into a stream event.
///
/// Unknown `type` values yield `Ok(None)`. Anything structurally invalid,
/// including a known type with a missing payload field, is a protocol error.
pub fn parse_frame(payload: &str) -> Result<Option<StreamEvent>> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| Error::protocol(format!("invalid frame JSON: {}", e)))?;

    let kind = match value.get("type") {
        Some(serde_json::Value::String(kind)) => kind.clone(),
        Some(_) => return Err(Error::protocol("frame `type` is not a string")),
        None if value.is_object() => return Err(Error::protocol("frame has no `type` field")),
        None => return Err(Error::protocol("frame payload is not an object")),
    };

    let event = match kind.as_str() {
        "reasoning" => StreamEvent::ReasoningDelta {
            text: payload_field::<TextPayload>(value, &kind)?.content,
        },
        "answer_start" => StreamEvent::AnswerStart,
        "answer" => StreamEvent::AnswerDelta {
            text: payload_field::<TextPayload>(value, &kind)?.content,
        },
        "done" => {
            let done = payload_field::<DonePayload>(value, &kind)?;
            StreamEvent::Completed {
                snapshot: ConversationSnapshot {
                    messages: done.messages.into_iter().map(Message::from).collect(),
                    title: done.title.filter(|t| !t.is_empty()),
                },
            }
        }
        "error" => StreamEvent::Failed {
            error: payload_field::<ErrorPayload>(value, &kind)?.error,
        },
        other => {
            tracing::debug!("Ignoring frame with unknown type: {}", other);
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn payload_field<T: serde::de::DeserializeOwned>(value: serde_json::Value, kind: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::protocol(format!("malformed `{}` frame: {}", kind, e)))
}
