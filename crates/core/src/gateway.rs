//! Assistant Gateway
//!
//! A thin pass-through to the hosted assistant service. The rest of the core
//! only sees the `AssistantGateway` trait, so the polling and orchestration
//! logic can be exercised against scripted gateways in tests.

use crate::transcript::Role;
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        CreateMessageRequestArgs, CreateRunRequestArgs, CreateThreadRequestArgs, MessageContent,
        MessageObject, MessageRole, RunStatus as OAIRunStatus,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many messages are requested when reading a thread back.
const MESSAGE_PAGE_SIZE: &str = "20";

/// Lifecycle of one assistant run as reported by the upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// A terminal run will never change status again.
    ///
    /// `RequiresAction` counts as terminal here: no tool outputs are ever
    /// submitted from this front-end, so such a run cannot finish.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl From<OAIRunStatus> for RunStatus {
    fn from(status: OAIRunStatus) -> Self {
        match status {
            OAIRunStatus::Queued => RunStatus::Queued,
            OAIRunStatus::InProgress => RunStatus::InProgress,
            OAIRunStatus::RequiresAction => RunStatus::RequiresAction,
            OAIRunStatus::Cancelling => RunStatus::Cancelling,
            OAIRunStatus::Cancelled => RunStatus::Cancelled,
            OAIRunStatus::Failed => RunStatus::Failed,
            OAIRunStatus::Completed => RunStatus::Completed,
            OAIRunStatus::Incomplete => RunStatus::Incomplete,
            OAIRunStatus::Expired => RunStatus::Expired,
        }
    }
}

/// A message as read back from an upstream thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    pub role: Role,
    /// Text of the first text part of the message; empty if it had none.
    pub content: String,
    /// Unix timestamp in seconds.
    pub created_at: i64,
}

impl From<MessageObject> for ThreadMessage {
    fn from(message: MessageObject) -> Self {
        let role = match message.role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
        };
        let content = message
            .content
            .into_iter()
            .find_map(|part| match part {
                MessageContent::Text(text) => Some(text.text.value),
                _ => None,
            })
            .unwrap_or_default();
        Self {
            id: message.id,
            role,
            content,
            created_at: i64::from(message.created_at),
        }
    }
}

/// Returns the text of the newest message iff the assistant wrote it.
///
/// `messages` must be ordered most recent first, as `list_messages` returns
/// them. An older assistant message is never returned: while a run is still
/// executing it belongs to the previous turn.
pub fn latest_assistant_text(messages: &[ThreadMessage]) -> Option<&str> {
    messages
        .first()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
}

/// The operations the core consumes from the hosted assistant service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Creates a new upstream conversation thread and returns its id.
    async fn create_thread(&self) -> Result<String>;

    /// Appends a user message to a thread and returns the message id.
    async fn append_message(&self, thread_id: &str, content: &str) -> Result<String>;

    /// Starts an assistant run on a thread and returns the run id.
    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<String>;

    /// Reads the current status of a run.
    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus>;

    /// Lists a thread's messages, most recent first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;
}

/// `AssistantGateway` backed by the OpenAI Assistants API.
pub struct OpenAIAssistantGateway {
    client: Client<OpenAIConfig>,
}

impl OpenAIAssistantGateway {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl AssistantGateway for OpenAIAssistantGateway {
    async fn create_thread(&self) -> Result<String> {
        let request = CreateThreadRequestArgs::default().build()?;
        let thread = self
            .client
            .threads()
            .create(request)
            .await
            .context("Failed to create thread")?;
        Ok(thread.id)
    }

    async fn append_message(&self, thread_id: &str, content: &str) -> Result<String> {
        let request = CreateMessageRequestArgs::default()
            .role(MessageRole::User)
            .content(content.to_string())
            .build()?;
        let message = self
            .client
            .threads()
            .messages(thread_id)
            .create(request)
            .await
            .with_context(|| format!("Failed to append message to thread {thread_id}"))?;
        Ok(message.id)
    }

    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<String> {
        let request = CreateRunRequestArgs::default()
            .assistant_id(assistant_id)
            .build()?;
        let run = self
            .client
            .threads()
            .runs(thread_id)
            .create(request)
            .await
            .with_context(|| format!("Failed to start run on thread {thread_id}"))?;
        Ok(run.id)
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus> {
        let run = self
            .client
            .threads()
            .runs(thread_id)
            .retrieve(run_id)
            .await
            .with_context(|| format!("Failed to retrieve run {run_id}"))?;
        Ok(run.status.into())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let response = self
            .client
            .threads()
            .messages(thread_id)
            .list(&[("limit", MESSAGE_PAGE_SIZE), ("order", "desc")])
            .await
            .with_context(|| format!("Failed to list messages on thread {thread_id}"))?;
        Ok(response.data.into_iter().map(ThreadMessage::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: Role, content: &str) -> ThreadMessage {
        ThreadMessage {
            id: format!("msg_{content}"),
            role,
            content: content.to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(RunStatus::RequiresAction.is_terminal());
        assert!(RunStatus::Completed.is_completed());
        assert!(!RunStatus::Failed.is_completed());
    }

    #[test]
    fn test_run_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&RunStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(RunStatus::InProgress.to_string(), "in_progress");
        let parsed: RunStatus = serde_json::from_str("\"requires_action\"").unwrap();
        assert_eq!(parsed, RunStatus::RequiresAction);
    }

    #[test]
    fn test_latest_assistant_text_only_reads_newest_message() {
        let messages = vec![
            message(Role::Assistant, "new reply"),
            message(Role::User, "question"),
        ];
        assert_eq!(latest_assistant_text(&messages), Some("new reply"));

        // The newest message is the student's own; the older reply is stale.
        let messages = vec![
            message(Role::User, "question"),
            message(Role::Assistant, "old reply"),
        ];
        assert_eq!(latest_assistant_text(&messages), None);
        assert_eq!(latest_assistant_text(&[]), None);
    }
}
