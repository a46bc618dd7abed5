//! WebSocket Conversations
//!
//! One connection is one conversation with the assistant, driven server-side
//! by the core orchestrator:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `turn`: Runs student turns and evaluations against the connection's conversation.

pub mod protocol;
pub mod session;
mod turn;

pub use session::ws_handler;
