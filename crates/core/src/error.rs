//! Error taxonomy for the tutoring core.

use crate::gateway::RunStatus;
use crate::orchestrator::ConversationState;

/// Failures surfaced by the Run Poller and the Conversation Orchestrator.
///
/// Partial-snapshot fetch failures never appear here: they are logged and
/// swallowed where they happen.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// A call to the assistant service (or the evaluation model) failed.
    #[error("Upstream call failed: {0}")]
    Upstream(#[from] anyhow::Error),

    /// The upstream run reached a terminal status other than `completed`.
    #[error("Run {run_id} finished with status '{status}'")]
    RunExecutionFailed { run_id: String, status: RunStatus },

    /// The run did not reach a terminal status within the polling budget.
    #[error("Run {run_id} still not finished after {attempts} status checks")]
    PollTimeout { run_id: String, attempts: u32 },

    /// An identifier the upstream should have returned was empty.
    #[error("Upstream response is missing the {0}")]
    MissingIdentifier(&'static str),

    /// The run completed but the newest thread message is not an assistant reply.
    #[error("Run completed without an assistant reply on thread {thread_id}")]
    MissingReply { thread_id: String },

    /// A turn is already in flight for this session.
    #[error("A reply is still in progress for this conversation")]
    Busy,

    #[error("Illegal conversation transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ConversationState,
        to: ConversationState,
    },
}
