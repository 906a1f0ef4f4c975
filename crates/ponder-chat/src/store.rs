//! Conversation store: ordered message lists with generation-guarded updates
//!
//! Every stream writing into a conversation holds a [`MessageHandle`] carrying
//! the generation it was opened under. Opening a new stream or invalidating
//! the conversation moves the generation forward, after which updates through
//! older handles are silently dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use ponder_stream::{Conversation, ConversationId, ConversationSnapshot, Message, Phase};
use tokio::sync::broadcast;

use crate::{
    error::{Error, Result},
    events::StoreEvent,
};

/// Identifies the message an in-flight stream may write to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub conversation_id: ConversationId,
    /// Position of the message in the conversation
    pub index: usize,
    /// Generation the stream was opened under
    pub generation: u64,
}

#[derive(Debug)]
struct Entry {
    conversation: Conversation,
    generation: u64,
    /// Index of the message an open stream is writing to
    open_stream: Option<usize>,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: Vec<Entry>,
    active: Option<ConversationId>,
    /// Last generation handed out, shared by all conversations
    generation: u64,
}

impl StoreState {
    fn entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.conversation.id == id)
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.conversation.id == id)
            .ok_or_else(|| Error::ConversationNotFound(id.to_string()))
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// The entry a handle may write to, or `None` when the handle is stale
    fn current_entry(&mut self, handle: &MessageHandle) -> Option<&mut Entry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.conversation.id == handle.conversation_id)?;
        let current = entry.generation == handle.generation
            && entry.open_stream == Some(handle.index)
            && handle.index < entry.conversation.messages.len();
        if current {
            Some(entry)
        } else {
            tracing::debug!(
                "Dropping stale update for {} (handle generation {}, current {})",
                handle.conversation_id,
                handle.generation,
                entry.generation
            );
            None
        }
    }

    fn open_placeholder(&mut self, id: &str) -> Result<MessageHandle> {
        let generation = self.next_generation();
        let entry = self.entry_mut(id)?;
        entry.conversation.messages.push(Message::placeholder());
        let index = entry.conversation.messages.len() - 1;
        entry.generation = generation;
        entry.open_stream = Some(index);
        Ok(MessageHandle {
            conversation_id: id.to_string(),
            index,
            generation,
        })
    }

    fn ensure_idle(&self, id: &str) -> Result<()> {
        match self.entry(id) {
            None => Err(Error::ConversationNotFound(id.to_string())),
            Some(entry) if entry.open_stream.is_some() => {
                Err(Error::StreamInProgress(id.to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Close the open stream, freezing its message as `Errored` with the
    /// text it had so far
    fn invalidate(&mut self, id: &str) -> bool {
        let generation = self.next_generation();
        let Some(entry) = self.entries.iter_mut().find(|e| e.conversation.id == id) else {
            return false;
        };
        let Some(index) = entry.open_stream.take() else {
            return false;
        };
        entry.generation = generation;
        if let Some(message) = entry.conversation.messages.get_mut(index) {
            message.loading = false;
            if !message.phase.is_terminal() {
                message.phase = Phase::Errored;
            }
        }
        true
    }

    /// Close every open stream except the one on `keep`
    fn invalidate_others(&mut self, keep: &str) -> Vec<ConversationId> {
        let open: Vec<ConversationId> = self
            .entries
            .iter()
            .filter(|e| e.open_stream.is_some() && e.conversation.id != keep)
            .map(|e| e.conversation.id.clone())
            .collect();
        for id in &open {
            self.invalidate(id);
        }
        open
    }
}

/// Shared conversation state.
///
/// Cloning is cheap; all clones see the same state. Observers subscribe to
/// [`StoreEvent`]s; the store itself never renders.
#[derive(Clone)]
pub struct ConversationStore {
    state: Arc<Mutex<StoreState>>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            event_tx,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    fn messages_changed(&self, id: &str) {
        self.notify(StoreEvent::MessagesChanged {
            conversation_id: id.to_string(),
        });
    }

    // --- Conversations ---

    /// Insert a conversation or refresh an existing one.
    ///
    /// While a stream is open on the conversation only its title is taken,
    /// so the open handle keeps pointing at the right message.
    pub fn upsert_conversation(&self, conversation: Conversation) {
        let id = conversation.id.clone();
        {
            let mut state = self.state.lock();
            match state.entries.iter().position(|e| e.conversation.id == id) {
                Some(pos) => {
                    let entry = &mut state.entries[pos];
                    if entry.open_stream.is_some() {
                        entry.conversation.title = conversation.title;
                    } else {
                        entry.conversation = conversation;
                    }
                }
                None => state.entries.push(Entry {
                    conversation,
                    generation: 0,
                    open_stream: None,
                }),
            }
        }
        self.notify(StoreEvent::ConversationsChanged);
        self.messages_changed(&id);
    }

    /// Replace the conversation list with the backend's, keeping order
    pub fn replace_all(&self, conversations: Vec<Conversation>) {
        let cleared_active = {
            let mut state = self.state.lock();
            let mut entries = Vec::with_capacity(conversations.len());
            for conversation in conversations {
                match state
                    .entries
                    .iter()
                    .position(|e| e.conversation.id == conversation.id)
                {
                    Some(pos) => {
                        let mut entry = state.entries.swap_remove(pos);
                        if entry.open_stream.is_some() {
                            entry.conversation.title = conversation.title;
                        } else {
                            entry.conversation = conversation;
                        }
                        entries.push(entry);
                    }
                    None => entries.push(Entry {
                        conversation,
                        generation: 0,
                        open_stream: None,
                    }),
                }
            }
            state.entries = entries;

            let active_gone = state
                .active
                .as_deref()
                .is_some_and(|id| state.entry(id).is_none());
            if active_gone {
                state.active = None;
            }
            active_gone
        };

        self.notify(StoreEvent::ConversationsChanged);
        if cleared_active {
            self.notify(StoreEvent::ActiveChanged {
                conversation_id: None,
            });
        }
    }

    /// Remove a conversation; returns whether it existed
    pub fn remove_conversation(&self, id: &str) -> bool {
        let (removed, was_active) = {
            let mut state = self.state.lock();
            let before = state.entries.len();
            state.entries.retain(|e| e.conversation.id != id);
            let removed = state.entries.len() != before;
            let was_active = state.active.as_deref() == Some(id);
            if was_active {
                state.active = None;
            }
            (removed, was_active)
        };

        if removed {
            self.notify(StoreEvent::ConversationsChanged);
        }
        if was_active {
            self.notify(StoreEvent::ActiveChanged {
                conversation_id: None,
            });
        }
        removed
    }

    /// All conversations in display order
    pub fn conversations(&self) -> Vec<Conversation> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|e| e.conversation.clone())
            .collect()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.state.lock().entry(id).map(|e| e.conversation.clone())
    }

    // --- Active conversation ---

    pub fn active(&self) -> Option<ConversationId> {
        self.state.lock().active.clone()
    }

    /// Make `id` the active conversation.
    ///
    /// Streams belong to the active conversation: on a switch every stream
    /// open elsewhere is invalidated, its message frozen as `Errored`, and
    /// its late events become no-ops.
    pub fn set_active(&self, id: &str) -> Result<()> {
        let (changed, frozen) = {
            let mut state = self.state.lock();
            if state.entry(id).is_none() {
                return Err(Error::ConversationNotFound(id.to_string()));
            }
            if state.active.as_deref() == Some(id) {
                (false, Vec::new())
            } else {
                let frozen = state.invalidate_others(id);
                state.active = Some(id.to_string());
                (true, frozen)
            }
        };

        for previous in &frozen {
            tracing::debug!("Invalidated stream on {} after switch", previous);
            self.messages_changed(previous);
        }
        if changed {
            self.notify(StoreEvent::ActiveChanged {
                conversation_id: Some(id.to_string()),
            });
        }
        Ok(())
    }

    // --- Messages ---

    /// Ordered messages of a conversation (empty when unknown)
    pub fn list_messages(&self, id: &str) -> Vec<Message> {
        self.state
            .lock()
            .entry(id)
            .map(|e| e.conversation.messages.clone())
            .unwrap_or_default()
    }

    /// The message a handle points at, whether or not it is still current
    pub fn message(&self, handle: &MessageHandle) -> Option<Message> {
        self.state
            .lock()
            .entry(&handle.conversation_id)
            .and_then(|e| e.conversation.messages.get(handle.index).cloned())
    }

    /// Append a user message; rejected while a stream is open
    pub fn append_user_message(&self, id: &str, text: impl Into<String>) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.ensure_idle(id)?;
            state.entry_mut(id)?.conversation.messages.push(Message::user(text));
        }
        self.messages_changed(id);
        Ok(())
    }

    /// Append an assistant placeholder and open a stream on it
    pub fn append_placeholder_message(&self, id: &str) -> Result<MessageHandle> {
        let handle = {
            let mut state = self.state.lock();
            state.ensure_idle(id)?;
            state.open_placeholder(id)?
        };
        self.messages_changed(id);
        Ok(handle)
    }

    /// Append the user's message and a placeholder for the reply in one step
    pub fn begin_turn(&self, id: &str, text: impl Into<String>) -> Result<MessageHandle> {
        let handle = {
            let mut state = self.state.lock();
            state.ensure_idle(id)?;
            state.entry_mut(id)?.conversation.messages.push(Message::user(text));
            state.open_placeholder(id)?
        };
        self.messages_changed(id);
        Ok(handle)
    }

    /// Replace the streaming message with the reducer's current state.
    ///
    /// Returns `false` without touching anything when the handle is stale.
    pub fn apply_reducer_update(&self, handle: &MessageHandle, message: &Message) -> bool {
        {
            let mut state = self.state.lock();
            let Some(entry) = state.current_entry(handle) else {
                return false;
            };
            entry.conversation.messages[handle.index] = message.clone();
        }
        self.messages_changed(&handle.conversation_id);
        true
    }

    /// Close the stream with its final message and reconcile with the
    /// backend's snapshot. An empty snapshot keeps the local messages.
    pub fn complete(
        &self,
        handle: &MessageHandle,
        message: &Message,
        snapshot: ConversationSnapshot,
    ) -> bool {
        let retitled = {
            let mut state = self.state.lock();
            let Some(entry) = state.current_entry(handle) else {
                return false;
            };
            entry.open_stream = None;
            if snapshot.messages.is_empty() {
                entry.conversation.messages[handle.index] = message.clone();
            } else {
                entry.conversation.messages = snapshot.messages;
            }
            match snapshot.title {
                Some(title) if title != entry.conversation.title => {
                    entry.conversation.title = title;
                    true
                }
                _ => false,
            }
        };

        self.messages_changed(&handle.conversation_id);
        if retitled {
            self.notify(StoreEvent::ConversationsChanged);
        }
        true
    }

    /// Close the stream as failed: keep the partial message and append a
    /// synthetic error message after it.
    pub fn fail(&self, handle: &MessageHandle, message: &Message, error: &str) -> bool {
        {
            let mut state = self.state.lock();
            let Some(entry) = state.current_entry(handle) else {
                return false;
            };
            entry.open_stream = None;
            entry.conversation.messages[handle.index] = message.clone();
            entry.conversation.messages.push(Message::error(error));
        }
        self.messages_changed(&handle.conversation_id);
        true
    }

    /// Supersede any open stream on the conversation, freezing its message.
    ///
    /// Returns whether a stream was open.
    pub fn invalidate(&self, id: &str) -> bool {
        let invalidated = self.state.lock().invalidate(id);
        if invalidated {
            self.messages_changed(id);
        }
        invalidated
    }

    /// Current generation of a conversation
    pub fn generation(&self, id: &str) -> Option<u64> {
        self.state.lock().entry(id).map(|e| e.generation)
    }

    /// Whether a stream is open on the conversation
    pub fn is_streaming(&self, id: &str) -> bool {
        self.state
            .lock()
            .entry(id)
            .is_some_and(|e| e.open_stream.is_some())
    }

    /// Whether a handle may still write
    pub fn is_current(&self, handle: &MessageHandle) -> bool {
        self.state
            .lock()
            .entry(&handle.conversation_id)
            .is_some_and(|e| {
                e.generation == handle.generation && e.open_stream == Some(handle.index)
            })
    }
}
