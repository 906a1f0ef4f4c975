//! ponder-stream: wire layer for the ponder chat client
//!
//! Decodes the backend's event stream into frames, parses frames into typed
//! events, and talks to the backend over HTTP.

pub mod client;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod types;

pub use client::{BackendClient, ByteStream, Dispatcher};
pub use decoder::{Frame, FrameDecoder, FrameStream, decode_frames};
pub use error::{Error, FailureKind, Result};
pub use frame::{StreamEvent, parse_frame};
pub use types::*;
