use crate::{
    error::TutorError,
    gateway::AssistantGateway,
    transcript::{Transcript, Turn},
};
use tracing::info;

/// Client-side state of one conversation with the assistant.
///
/// A session lives for one client connection and is never persisted. It is
/// handed to the poller and the orchestrator by reference; nothing else
/// mutates it.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    thread_id: String,
    transcript: Transcript,
    first_turn_sent: bool,
    active_run: Option<String>,
}

impl ConversationSession {
    /// Wraps an existing upstream thread.
    pub fn new(thread_id: impl Into<String>, opening_line: &str) -> Self {
        Self {
            thread_id: thread_id.into(),
            transcript: Transcript::with_greeting(opening_line),
            first_turn_sent: false,
            active_run: None,
        }
    }

    /// Creates a fresh upstream thread and a session around it.
    pub async fn open(
        gateway: &dyn AssistantGateway,
        opening_line: &str,
    ) -> Result<Self, TutorError> {
        let thread_id = gateway.create_thread().await?;
        if thread_id.is_empty() {
            return Err(TutorError::MissingIdentifier("thread id"));
        }
        info!(%thread_id, "Conversation thread created");
        Ok(Self::new(thread_id, opening_line))
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn first_turn_sent(&self) -> bool {
        self.first_turn_sent
    }

    /// Id of the run currently executing for this session, if any.
    pub fn active_run(&self) -> Option<&str> {
        self.active_run.as_deref()
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub(crate) fn mark_first_turn_sent(&mut self) {
        self.first_turn_sent = true;
    }

    pub(crate) fn set_active_run(&mut self, run_id: String) {
        self.active_run = Some(run_id);
    }

    pub(crate) fn clear_active_run(&mut self) {
        self.active_run = None;
    }
}
