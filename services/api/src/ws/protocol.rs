//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};
use tutor_core::{ConversationState, EvaluationRecord, Transcript, Turn};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A student message that starts a new turn.
    UserMessage { text: String },
    /// Requests an evaluation of the conversation so far.
    Evaluate,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once the upstream thread exists. The transcript holds the greeting.
    Initialized {
        thread_id: String,
        transcript: Transcript,
    },
    /// The orchestrator moved to a new state.
    State { state: ConversationState },
    /// The currently displayed prefix of the assistant's reply.
    Typing { text: String, complete: bool },
    /// The assistant's reply was committed to the transcript.
    TurnCommitted { turn: Turn },
    Error { message: String },
    Evaluation {
        evaluation: String,
        report: EvaluationRecord,
    },
}
