//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the service clients
//! shared by every request and WebSocket connection.

use crate::config::Config;
use std::sync::Arc;
use tutor_core::{evaluator::EvaluationService, gateway::AssistantGateway};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn AssistantGateway>,
    pub evaluator: Arc<dyn EvaluationService>,
    pub config: Arc<Config>,
}
