//! Conversation Orchestrator
//!
//! Ties the Run Poller and the Typing Animator together for one student turn:
//!
//! `Idle → Sending → AwaitingRun → Streaming → Committing → Idle`
//!
//! with `Error` reachable from `Sending`, `AwaitingRun` and `Streaming`, and
//! always leading straight back to `Idle`. The assistant's reply is only
//! appended to the transcript once the run completed *and* the animator has
//! typed out the authoritative final text.

use crate::{
    error::TutorError,
    poller::RunPoller,
    session::ConversationSession,
    transcript::Turn,
    typing::{AnimationState, TypingAnimator},
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Sending,
    AwaitingRun,
    Streaming,
    Committing,
    Error,
}

impl ConversationState {
    pub fn can_transition_to(self, next: ConversationState) -> bool {
        use ConversationState::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, AwaitingRun)
                | (AwaitingRun, Streaming)
                | (Streaming, Committing)
                | (Committing, Idle)
                | (Sending | AwaitingRun | Streaming, Error)
                | (Error, Idle)
        )
    }
}

pub struct Orchestrator {
    poller: RunPoller,
    animator: TypingAnimator,
    state: ConversationState,
    state_tx: watch::Sender<ConversationState>,
    last_snapshot: Option<String>,
    last_error: Option<String>,
}

impl Orchestrator {
    pub fn new(poller: RunPoller, typing_tick: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConversationState::Idle);
        Self {
            poller,
            animator: TypingAnimator::new(typing_tick),
            state: ConversationState::Idle,
            state_tx,
            last_snapshot: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Message of the most recent failed turn, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Typing frames of the reply currently in flight.
    pub fn animation(&self) -> watch::Receiver<AnimationState> {
        self.animator.subscribe()
    }

    /// Conversation state changes, for front-ends that show progress.
    pub fn states(&self) -> watch::Receiver<ConversationState> {
        self.state_tx.subscribe()
    }

    /// Runs one full student turn and returns the committed assistant reply.
    ///
    /// Rejected with `Busy` unless the orchestrator is `Idle`. On failure the
    /// student's turn stays in the transcript, nothing partial is committed,
    /// and the orchestrator is `Idle` again.
    pub async fn send(
        &mut self,
        session: &mut ConversationSession,
        user_text: &str,
    ) -> Result<Turn, TutorError> {
        if self.state != ConversationState::Idle {
            return Err(TutorError::Busy);
        }
        if session.active_run().is_some() {
            return Err(TutorError::Busy);
        }
        self.transition(ConversationState::Sending)?;
        session.push_turn(Turn::user(user_text));

        match self.drive(session, user_text).await {
            Ok(turn) => Ok(turn),
            Err(e) => {
                self.fail(session, &e);
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        session: &mut ConversationSession,
        user_text: &str,
    ) -> Result<Turn, TutorError> {
        let mut run = self.poller.submit(session, user_text).await?;
        self.transition(ConversationState::AwaitingRun)?;

        loop {
            let update = self.poller.poll(session, &mut run).await?;
            if update.status.is_completed() {
                break;
            }
            if let Some(snapshot) = update.partial_text
                && self.last_snapshot.as_deref() != Some(snapshot.as_str())
            {
                self.animator.set_source(&snapshot);
                self.last_snapshot = Some(snapshot);
            }
            self.poller.wait().await;
        }

        let final_text = self.poller.final_reply(session).await?;
        self.transition(ConversationState::Streaming)?;
        if self.last_snapshot.as_deref() != Some(final_text.as_str()) {
            self.animator.set_source(&final_text);
        }
        self.animator.wait_until_caught_up(&final_text).await;

        self.transition(ConversationState::Committing)?;
        let turn = Turn::assistant(final_text);
        session.push_turn(turn.clone());
        self.animator.clear();
        self.last_snapshot = None;
        self.transition(ConversationState::Idle)?;
        info!(
            thread_id = %session.thread_id(),
            run_id = %run.run_id,
            polls = run.attempts(),
            "Assistant turn committed"
        );
        Ok(turn)
    }

    fn fail(&mut self, session: &mut ConversationSession, err: &TutorError) {
        error!(thread_id = %session.thread_id(), error = %err, "Conversation turn failed");
        self.last_error = Some(err.to_string());
        session.clear_active_run();
        self.animator.clear();
        self.last_snapshot = None;
        // Error is reachable from every in-flight state; a failed transition
        // here would mean the turn never left Idle.
        if self.transition(ConversationState::Error).is_ok() {
            let _ = self.transition(ConversationState::Idle);
        }
    }

    fn transition(&mut self, next: ConversationState) -> Result<(), TutorError> {
        if !self.state.can_transition_to(next) {
            return Err(TutorError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!(from = ?self.state, to = ?next, "Conversation state changed");
        self.state = next;
        self.state_tx.send_replace(next);
        Ok(())
    }
}
