//! API Models
//!
//! Request and response bodies of the REST surface, annotated with `utoipa`
//! for the generated OpenAPI document. Core types that cross the wire are
//! documented as opaque objects.

use serde::{Deserialize, Serialize};
use tutor_core::{EvaluationRecord, Turn, gateway::RunStatus, gateway::ThreadMessage};
use utoipa::ToSchema;

/// Body of `POST /api/chat`. Which fields are required depends on `action`.
///
/// A body without `action` is read as an empty, unsupported action.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    #[schema(example = "sendMessage")]
    pub action: String,
    pub thread_id: Option<String>,
    pub content: Option<String>,
    pub run_id: Option<String>,
}

/// Returns the field's value unless it is absent or empty.
pub(crate) fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadResponse {
    #[schema(example = "thread_abc123")]
    pub thread_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    #[schema(example = "run_abc123")]
    pub run_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RunStatusResponse {
    #[schema(value_type = String, example = "in_progress")]
    pub status: RunStatus,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MessagesResponse {
    /// Most recent first.
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<ThreadMessage>,
}

/// Snapshot of the assistant's in-progress reply.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PartialResponse {
    pub content: String,
    /// Server time of the snapshot in milliseconds since the epoch.
    pub timestamp: i64,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct EvaluateRequest {
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<Turn>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct EvaluateResponse {
    /// The report as the model wrote it.
    pub evaluation: String,
    #[schema(value_type = Object)]
    pub report: EvaluationRecord,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tutor_core::Role;

    #[test]
    fn test_chat_request_uses_camel_case_fields() {
        let request: ChatRequest = serde_json::from_value(json!({
            "action": "checkStatus",
            "threadId": "thread_1",
            "runId": "run_1"
        }))
        .unwrap();

        assert_eq!(request.action, "checkStatus");
        assert_eq!(request.thread_id.as_deref(), Some("thread_1"));
        assert_eq!(request.run_id.as_deref(), Some("run_1"));
        assert!(request.content.is_none());
    }

    #[test]
    fn test_required_treats_empty_as_missing() {
        assert_eq!(required(&Some("x".to_string())), Some("x"));
        assert_eq!(required(&Some(String::new())), None);
        assert_eq!(required(&None), None);
    }

    #[test]
    fn test_response_serialization() {
        let thread = serde_json::to_value(CreateThreadResponse {
            thread_id: "thread_1".to_string(),
        })
        .unwrap();
        assert_eq!(thread, json!({ "threadId": "thread_1" }));

        let run = serde_json::to_value(SendMessageResponse {
            run_id: "run_1".to_string(),
        })
        .unwrap();
        assert_eq!(run, json!({ "runId": "run_1" }));

        let status = serde_json::to_value(RunStatusResponse {
            status: RunStatus::InProgress,
        })
        .unwrap();
        assert_eq!(status, json!({ "status": "in_progress" }));
    }

    #[test]
    fn test_evaluate_request_deserialization() {
        let request: EvaluateRequest = serde_json::from_value(json!({
            "messages": [
                { "role": "assistant", "content": "안녕하세요" },
                { "role": "user", "content": "네" }
            ]
        }))
        .unwrap();

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::Assistant);
        assert_eq!(request.messages[1].content, "네");
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Something went wrong".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"message\":\"Something went wrong\""));
    }
}
