//! Run Poller
//!
//! Drives a single upstream assistant run to a terminal status. The upstream
//! exposes no token stream, only a coarse status and the thread's latest
//! messages, so every non-terminal check also reads the newest assistant
//! message as a best-effort partial snapshot.

use crate::{
    error::TutorError,
    gateway::{AssistantGateway, RunStatus, latest_assistant_text},
    session::ConversationSession,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Scripted greeting that opens every conversation.
pub const OPENING_LINE: &str = "안녕하세요, 개구리 왕자에 대한 토론을 시작해 볼까요?";

/// Joins the opening line and the student's first message upstream.
pub const FIRST_TURN_SEPARATOR: &str = "\n\n사용자: ";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_POLLS: u32 = 120;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub assistant_id: String,
    pub opening_line: String,
    /// Fixed delay between status checks. No backoff, no jitter.
    pub interval: Duration,
    /// Upper bound on status checks before the run is abandoned.
    pub max_polls: u32,
}

impl PollerConfig {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            opening_line: OPENING_LINE.to_string(),
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

/// An upstream run that was started by `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: String,
    pub status: RunStatus,
    attempts: u32,
}

impl RunHandle {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            status: RunStatus::Queued,
            attempts: 0,
        }
    }

    /// Number of status checks issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Result of one successful status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollUpdate {
    pub status: RunStatus,
    /// Newest assistant text on the thread. Only read while the run is not
    /// terminal, and not guaranteed to grow between checks.
    pub partial_text: Option<String>,
}

pub struct RunPoller {
    gateway: Arc<dyn AssistantGateway>,
    config: PollerConfig,
}

impl RunPoller {
    pub fn new(gateway: Arc<dyn AssistantGateway>, config: PollerConfig) -> Self {
        Self { gateway, config }
    }

    /// The content actually sent upstream for a student message.
    ///
    /// The first message of a session carries the scripted opening line so the
    /// assistant sees the same greeting the student saw.
    pub fn upstream_content(&self, session: &ConversationSession, user_text: &str) -> String {
        if session.first_turn_sent() {
            user_text.to_string()
        } else {
            format!(
                "{}{}{}",
                self.config.opening_line, FIRST_TURN_SEPARATOR, user_text
            )
        }
    }

    /// Appends the student's message and starts exactly one run for it.
    pub async fn submit(
        &self,
        session: &mut ConversationSession,
        user_text: &str,
    ) -> Result<RunHandle, TutorError> {
        if let Some(run_id) = session.active_run() {
            warn!(%run_id, "Rejecting submit while a run is outstanding");
            return Err(TutorError::Busy);
        }

        let content = self.upstream_content(session, user_text);
        self.gateway
            .append_message(session.thread_id(), &content)
            .await?;
        // The upstream thread now holds the greeting, whatever happens to the run.
        session.mark_first_turn_sent();

        let run_id = self
            .gateway
            .start_run(session.thread_id(), &self.config.assistant_id)
            .await?;
        if run_id.is_empty() {
            return Err(TutorError::MissingIdentifier("run id"));
        }

        info!(thread_id = %session.thread_id(), %run_id, "Run started");
        session.set_active_run(run_id.clone());
        Ok(RunHandle::new(run_id))
    }

    /// Issues one status check for `handle`.
    ///
    /// Returns `Ok` for non-terminal statuses and for `completed`; any other
    /// terminal status fails with `RunExecutionFailed`. Either way a terminal
    /// status releases the session's outstanding run.
    pub async fn poll(
        &self,
        session: &mut ConversationSession,
        handle: &mut RunHandle,
    ) -> Result<PollUpdate, TutorError> {
        if handle.attempts >= self.config.max_polls {
            return Err(TutorError::PollTimeout {
                run_id: handle.run_id.clone(),
                attempts: handle.attempts,
            });
        }
        handle.attempts += 1;

        let status = self
            .gateway
            .run_status(session.thread_id(), &handle.run_id)
            .await?;
        handle.status = status;
        debug!(run_id = %handle.run_id, %status, attempt = handle.attempts, "Run status checked");

        if status.is_completed() {
            session.clear_active_run();
            return Ok(PollUpdate {
                status,
                partial_text: None,
            });
        }
        if status.is_terminal() {
            session.clear_active_run();
            return Err(TutorError::RunExecutionFailed {
                run_id: handle.run_id.clone(),
                status,
            });
        }

        let partial_text = self.partial_snapshot(session.thread_id()).await;
        Ok(PollUpdate {
            status,
            partial_text,
        })
    }

    /// Best-effort read of the assistant text currently on the thread.
    ///
    /// Failures only cost the live-typing effect, so they are logged and
    /// dropped.
    pub async fn partial_snapshot(&self, thread_id: &str) -> Option<String> {
        match self.gateway.list_messages(thread_id).await {
            Ok(messages) => latest_assistant_text(&messages)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            Err(e) => {
                warn!(%thread_id, error = ?e, "Partial snapshot fetch failed");
                None
            }
        }
    }

    /// Fetches the assistant's finished reply after a run completed.
    pub async fn final_reply(&self, session: &ConversationSession) -> Result<String, TutorError> {
        let messages = self.gateway.list_messages(session.thread_id()).await?;
        latest_assistant_text(&messages)
            .map(str::to_string)
            .ok_or_else(|| TutorError::MissingReply {
                thread_id: session.thread_id().to_string(),
            })
    }

    /// Sleeps for one polling interval.
    pub async fn wait(&self) {
        tokio::time::sleep(self.config.interval).await;
    }
}
