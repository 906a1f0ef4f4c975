//! Store change notifications

use ponder_stream::ConversationId;

/// Emitted by the conversation store after every successful mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A conversation's message list changed
    MessagesChanged { conversation_id: ConversationId },
    /// Conversations were added, removed or retitled
    ConversationsChanged,
    /// The active conversation changed
    ActiveChanged {
        conversation_id: Option<ConversationId>,
    },
}
