//! Error types for ponder-chat

use ponder_stream::ConversationId;
use thiserror::Error;

/// Result type alias using ponder-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a conversation
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Stream(#[from] ponder_stream::Error),

    /// The conversation is not in the store
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// A reply is still streaming into the conversation
    #[error("A response is already streaming in conversation {0}")]
    StreamInProgress(ConversationId),
}
