//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ChatRequest, CreateThreadResponse, ErrorResponse, EvaluateRequest, EvaluateResponse,
        MessagesResponse, PartialResponse, RunStatusResponse, SendMessageResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::chat, handlers::evaluate),
    components(
        schemas(
            ChatRequest,
            CreateThreadResponse,
            SendMessageResponse,
            RunStatusResponse,
            MessagesResponse,
            PartialResponse,
            EvaluateRequest,
            EvaluateResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Tutor API", description = "Reading-discussion tutor backed by a hosted assistant")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/evaluate", post(handlers::evaluate))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_endpoints() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/chat"));
        assert!(doc.paths.paths.contains_key("/api/evaluate"));
    }
}
