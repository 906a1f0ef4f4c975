//! Conversation selection for /switch and /delete

use ponder_stream::{Conversation, ConversationId};

/// Resolve a 1-based list index, an exact id, or a unique id prefix
pub fn resolve_conversation(arg: &str, conversations: &[Conversation]) -> Option<ConversationId> {
    if let Ok(index) = arg.parse::<usize>() {
        if let Some(conv) = index.checked_sub(1).and_then(|i| conversations.get(i)) {
            return Some(conv.id.clone());
        }
    }

    if let Some(conv) = conversations.iter().find(|c| c.id == arg) {
        return Some(conv.id.clone());
    }

    let mut matches = conversations.iter().filter(|c| c.id.starts_with(arg));
    match (matches.next(), matches.next()) {
        (Some(conv), None) => Some(conv.id.clone()),
        _ => None,
    }
}
