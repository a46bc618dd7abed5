//! Tutor API Library Crate
//!
//! HTTP and WebSocket front-end of the reading-discussion tutor: the action
//! proxy onto the hosted assistant, the evaluation endpoint, and a WebSocket
//! surface that runs whole conversation turns server-side. The `api` binary
//! is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
