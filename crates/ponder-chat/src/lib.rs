//! ponder-chat: streaming conversation state for the ponder chat client
//!
//! Folds the backend's event stream into conversation messages: the reducer
//! builds one assistant message, the store holds every conversation and
//! guards writes with generation tokens, and the session ties a dispatch to
//! both.

pub mod error;
pub mod events;
pub mod reducer;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use events::StoreEvent;
pub use reducer::{FlushMode, Step, StreamReducer};
pub use session::{ChatSession, SessionConfig, StreamOutcome};
pub use store::{ConversationStore, MessageHandle};
