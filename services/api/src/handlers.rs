//! Axum Handlers for the REST API
//!
//! `POST /api/chat` is a thin proxy onto the hosted assistant, dispatched on
//! the `action` field of the body. `POST /api/evaluate` produces and parses an
//! evaluation report for a finished conversation.

use anyhow::anyhow;
use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use tutor_core::{evaluator::run_evaluation, gateway::latest_assistant_text};

use crate::{
    models::{
        ChatRequest, CreateThreadResponse, ErrorResponse, EvaluateRequest, EvaluateResponse,
        MessagesResponse, PartialResponse, RunStatusResponse, SendMessageResponse, required,
    },
    state::AppState,
};

pub const MISSING_PARAMETERS: &str = "필수 파라미터가 누락되었습니다.";
pub const UNSUPPORTED_ACTION: &str = "지원하지 않는 액션입니다.";
pub const SERVER_ERROR: &str = "서버 에러가 발생했습니다.";
pub const EVALUATION_ERROR: &str = "평가 중 오류가 발생했습니다.";

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
    EvaluationFailed(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                internal_error(SERVER_ERROR)
            }
            ApiError::EvaluationFailed(err) => {
                error!("Evaluation failed: {:?}", err);
                internal_error(EVALUATION_ERROR)
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Proxy one operation onto the hosted assistant.
///
/// | action | required fields | response |
/// |---|---|---|
/// | `createThread` | | `{threadId}` |
/// | `sendMessage` | `threadId`, `content` | `{runId}` |
/// | `checkStatus` | `threadId`, `runId` | `{status}` |
/// | `getMessages` | `threadId` | `{messages}` |
/// | `getPartialResponse` | `threadId` | `{content, timestamp}` |
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Action-specific payload"),
        (status = 400, description = "Missing parameter or unknown action", body = ErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    // An unreadable body is reported like any other server failure.
    let Json(request) = payload
        .map_err(|rejection| ApiError::InternalServerError(anyhow!(rejection.body_text())))?;
    match request.action.as_str() {
        "createThread" => {
            let thread_id = state.gateway.create_thread().await?;
            info!(%thread_id, "Thread created");
            Ok(Json(CreateThreadResponse { thread_id }).into_response())
        }
        "sendMessage" => {
            let (Some(thread_id), Some(content)) =
                (required(&request.thread_id), required(&request.content))
            else {
                return Err(missing_parameters());
            };
            state.gateway.append_message(thread_id, content).await?;
            let run_id = state
                .gateway
                .start_run(thread_id, &state.config.assistant_id)
                .await?;
            info!(%thread_id, %run_id, "Run started");
            Ok(Json(SendMessageResponse { run_id }).into_response())
        }
        "checkStatus" => {
            let (Some(thread_id), Some(run_id)) =
                (required(&request.thread_id), required(&request.run_id))
            else {
                return Err(missing_parameters());
            };
            let status = state.gateway.run_status(thread_id, run_id).await?;
            Ok(Json(RunStatusResponse { status }).into_response())
        }
        "getMessages" => {
            let Some(thread_id) = required(&request.thread_id) else {
                return Err(missing_parameters());
            };
            let messages = state.gateway.list_messages(thread_id).await?;
            Ok(Json(MessagesResponse { messages }).into_response())
        }
        "getPartialResponse" => {
            // Partial reads are best-effort and never fail the request.
            let content = match required(&request.thread_id) {
                Some(thread_id) => match state.gateway.list_messages(thread_id).await {
                    Ok(messages) => latest_assistant_text(&messages)
                        .unwrap_or_default()
                        .to_string(),
                    Err(e) => {
                        warn!(error = ?e, %thread_id, "Partial response unavailable");
                        String::new()
                    }
                },
                None => String::new(),
            };
            Ok(Json(PartialResponse {
                content,
                timestamp: Utc::now().timestamp_millis(),
            })
            .into_response())
        }
        other => {
            warn!(action = %other, "Unsupported chat action");
            Err(ApiError::BadRequest(UNSUPPORTED_ACTION.to_string()))
        }
    }
}

fn missing_parameters() -> ApiError {
    ApiError::BadRequest(MISSING_PARAMETERS.to_string())
}

/// Evaluate a finished conversation.
#[utoipa::path(
    post,
    path = "/api/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Raw and parsed evaluation report", body = EvaluateResponse),
        (status = 500, description = "Evaluation failed", body = ErrorResponse)
    )
)]
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let Json(payload) = payload
        .map_err(|rejection| ApiError::EvaluationFailed(anyhow!(rejection.body_text())))?;
    let evaluation = run_evaluation(state.evaluator.as_ref(), &payload.messages)
        .await
        .map_err(ApiError::EvaluationFailed)?;
    Ok(Json(EvaluateResponse {
        evaluation: evaluation.raw,
        report: evaluation.record,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        extract::FromRequest,
        http::{Request, header::CONTENT_TYPE},
    };
    use serde_json::{Value, json};
    use std::{path::PathBuf, sync::Mutex, time::Duration};
    use tutor_core::{
        Role, Turn,
        evaluator::{EvaluationService, StaticEvaluationService},
        gateway::{AssistantGateway, RunStatus, ThreadMessage},
        poller::OPENING_LINE,
    };

    /// In-memory assistant that completes every run with a fixed reply.
    #[derive(Default)]
    pub(crate) struct FakeGateway {
        pub messages: Mutex<Vec<ThreadMessage>>,
        pub reply: String,
        pub fail: bool,
    }

    impl FakeGateway {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                ..Default::default()
            }
        }

        fn push(&self, role: Role, content: &str) {
            let mut messages = self.messages.lock().unwrap();
            let id = format!("msg_{}", messages.len());
            messages.insert(
                0,
                ThreadMessage {
                    id,
                    role,
                    content: content.to_string(),
                    created_at: 0,
                },
            );
        }
    }

    #[async_trait]
    impl AssistantGateway for FakeGateway {
        async fn create_thread(&self) -> Result<String> {
            if self.fail {
                return Err(anyhow!("upstream down"));
            }
            Ok("thread_1".to_string())
        }

        async fn append_message(&self, _thread_id: &str, content: &str) -> Result<String> {
            if self.fail {
                return Err(anyhow!("upstream down"));
            }
            self.push(Role::User, content);
            Ok("msg".to_string())
        }

        async fn start_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<String> {
            self.push(Role::Assistant, &self.reply);
            Ok("run_1".to_string())
        }

        async fn run_status(&self, _thread_id: &str, _run_id: &str) -> Result<RunStatus> {
            Ok(RunStatus::Completed)
        }

        async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>> {
            if self.fail {
                return Err(anyhow!("upstream down"));
            }
            Ok(self.messages.lock().unwrap().clone())
        }
    }

    struct FailingEvaluator;

    #[async_trait]
    impl EvaluationService for FailingEvaluator {
        async fn evaluate(&self, _turns: &[Turn]) -> Result<String> {
            Err(anyhow!("model unavailable"))
        }
    }

    pub(crate) fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            openai_api_key: "test".to_string(),
            openai_api_base: "http://localhost".to_string(),
            assistant_id: "asst_test".to_string(),
            chat_model: "gpt-4o".to_string(),
            log_level: tracing::Level::INFO,
            prompts_path: PathBuf::from("./prompts"),
            poll_interval: Duration::from_millis(1),
            max_polls: 5,
            typing_tick: Duration::from_millis(1),
            opening_line: OPENING_LINE.to_string(),
        }
    }

    pub(crate) fn test_state(gateway: FakeGateway) -> Arc<AppState> {
        Arc::new(AppState {
            gateway: Arc::new(gateway),
            evaluator: Arc::new(StaticEvaluationService),
            config: Arc::new(test_config()),
        })
    }

    fn request(body: Value) -> Result<Json<ChatRequest>, JsonRejection> {
        Ok(Json(serde_json::from_value(body).unwrap()))
    }

    /// Runs the JSON extractor over a raw request body.
    async fn extract<T>(raw: &'static str) -> Result<Json<T>, JsonRejection>
    where
        T: serde::de::DeserializeOwned,
    {
        let req = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(raw))
            .unwrap();
        Json::<T>::from_request(req, &()).await
    }

    async fn into_parts(result: Result<Response, ApiError>) -> (StatusCode, Value) {
        let response = match result {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_thread() {
        let state = test_state(FakeGateway::default());
        let (status, body) =
            into_parts(chat(State(state), request(json!({ "action": "createThread" }))).await)
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "threadId": "thread_1" }));
    }

    #[tokio::test]
    async fn test_send_message_then_read_back() {
        let state = test_state(FakeGateway::replying("좋은 생각이에요!"));

        let (status, body) = into_parts(
            chat(
                State(state.clone()),
                request(json!({
                    "action": "sendMessage",
                    "threadId": "thread_1",
                    "content": "공주는 약속을 지켜야 해요"
                })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "runId": "run_1" }));

        let (_, body) = into_parts(
            chat(
                State(state.clone()),
                request(json!({ "action": "checkStatus", "threadId": "thread_1", "runId": "run_1" })),
            )
            .await,
        )
        .await;
        assert_eq!(body, json!({ "status": "completed" }));

        let (_, body) = into_parts(
            chat(
                State(state.clone()),
                request(json!({ "action": "getMessages", "threadId": "thread_1" })),
            )
            .await,
        )
        .await;
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[1]["content"], "공주는 약속을 지켜야 해요");

        let (_, body) = into_parts(
            chat(
                State(state),
                request(json!({ "action": "getPartialResponse", "threadId": "thread_1", "runId": "run_1" })),
            )
            .await,
        )
        .await;
        assert_eq!(body["content"], "좋은 생각이에요!");
        assert!(body["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_missing_parameters_is_bad_request() {
        let state = test_state(FakeGateway::default());
        for body in [
            json!({ "action": "sendMessage", "threadId": "thread_1" }),
            json!({ "action": "sendMessage", "threadId": "", "content": "hi" }),
            json!({ "action": "checkStatus", "threadId": "thread_1" }),
            json!({ "action": "getMessages" }),
        ] {
            let (status, body) = into_parts(chat(State(state.clone()), request(body)).await).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "message": MISSING_PARAMETERS }));
        }
    }

    #[tokio::test]
    async fn test_unknown_action_is_bad_request() {
        let state = test_state(FakeGateway::default());
        let (status, body) =
            into_parts(chat(State(state), request(json!({ "action": "deleteThread" }))).await)
                .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": UNSUPPORTED_ACTION }));
    }

    #[tokio::test]
    async fn test_missing_action_is_unsupported() {
        let state = test_state(FakeGateway::default());
        let (status, body) = into_parts(chat(State(state.clone()), extract("{}").await).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": UNSUPPORTED_ACTION }));

        let (status, body) = into_parts(
            chat(State(state), extract(r#"{"threadId":"thread_1"}"#).await).await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": UNSUPPORTED_ACTION }));
    }

    #[tokio::test]
    async fn test_unreadable_body_is_generic_server_error() {
        let state = test_state(FakeGateway::default());
        for raw in ["{not json", r#"{"action": 7}"#] {
            let (status, body) =
                into_parts(chat(State(state.clone()), extract(raw).await).await).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, json!({ "message": SERVER_ERROR }));
        }
    }

    #[tokio::test]
    async fn test_unreadable_evaluate_body_has_fixed_message() {
        let state = test_state(FakeGateway::default());
        for raw in ["{not json", r#"{"messages": [{"role": "teacher", "content": "hi"}]}"#] {
            let response = match evaluate(State(state.clone()), extract(raw).await).await {
                Ok(_) => panic!("evaluation should fail"),
                Err(err) => err.into_response(),
            };
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body, json!({ "message": EVALUATION_ERROR }));
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_is_generic_server_error() {
        let state = test_state(FakeGateway {
            fail: true,
            ..Default::default()
        });
        let (status, body) =
            into_parts(chat(State(state), request(json!({ "action": "createThread" }))).await)
                .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "message": SERVER_ERROR }));
    }

    #[tokio::test]
    async fn test_partial_response_never_fails() {
        let state = test_state(FakeGateway {
            fail: true,
            ..Default::default()
        });
        let (status, body) = into_parts(
            chat(
                State(state.clone()),
                request(json!({ "action": "getPartialResponse", "threadId": "thread_1" })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "");

        let (status, body) = into_parts(
            chat(State(state), request(json!({ "action": "getPartialResponse" }))).await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "");
    }

    #[tokio::test]
    async fn test_partial_response_ignores_user_message_on_top() {
        let gateway = FakeGateway::default();
        gateway.push(Role::Assistant, "이전 답변");
        gateway.push(Role::User, "새 질문");
        let state = test_state(gateway);

        let (_, body) = into_parts(
            chat(
                State(state),
                request(json!({ "action": "getPartialResponse", "threadId": "thread_1" })),
            )
            .await,
        )
        .await;
        assert_eq!(body["content"], "");
    }

    #[tokio::test]
    async fn test_evaluate_returns_raw_and_parsed_report() {
        let state = test_state(FakeGateway::default());
        let payload = EvaluateRequest {
            messages: vec![Turn::assistant(OPENING_LINE), Turn::user("네")],
        };

        let Json(response) = match evaluate(State(state), Ok(Json(payload))).await {
            Ok(response) => response,
            Err(_) => panic!("evaluation should succeed"),
        };
        assert!(response.evaluation.contains("종합 평가"));
        assert_eq!(response.report.entries.len(), 4);
        assert!(!response.report.overall_comment.is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_failure_has_fixed_message() {
        let state = Arc::new(AppState {
            gateway: Arc::new(FakeGateway::default()),
            evaluator: Arc::new(FailingEvaluator),
            config: Arc::new(test_config()),
        });
        let payload = EvaluateRequest { messages: vec![] };

        let response = match evaluate(State(state), Ok(Json(payload))).await {
            Ok(_) => panic!("evaluation should fail"),
            Err(err) => err.into_response(),
        };
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "message": EVALUATION_ERROR }));
    }
}
