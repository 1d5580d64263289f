/// HTTP handlers for the IntervAIew chat shell
pub mod chat;
pub mod conversations;

#[cfg(test)]
mod test_handlers;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::IntervaiewError;
use crate::service::ChatService;

impl IntoResponse for IntervaiewError {
    fn into_response(self) -> Response {
        let status = match &self {
            IntervaiewError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            IntervaiewError::MalformedConversation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IntervaiewError::Completion(_)
            | IntervaiewError::Connection(_)
            | IntervaiewError::Query(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the router; every route except `/health` sits behind the optional
/// bearer token.
pub fn router(service: ChatService) -> Router {
    let bearer_token = service.config().server.bearer_token.clone();

    let mut router = Router::new()
        .route("/api/sessions", post(chat::open_session))
        .route(
            "/api/sessions/:id",
            get(chat::get_session).delete(chat::close_session),
        )
        .route("/api/sessions/:id/messages", post(chat::send_message))
        .route(
            "/api/sessions/:id/messages/stream",
            post(chat::stream_message),
        )
        .route("/api/sessions/:id/turns", delete(chat::clear_history))
        .route("/api/sessions/:id/settings", put(chat::update_settings))
        .route("/api/sessions/:id/stats", get(chat::stats))
        .route("/api/sessions/:id/archive", post(conversations::save))
        .route("/api/conversations", get(conversations::list))
        .route(
            "/api/conversations/:name",
            get(conversations::view).delete(conversations::delete),
        )
        .with_state(service);

    if let Some(expected) = bearer_token {
        router = router.layer(middleware::from_fn_with_state(
            Arc::new(expected),
            require_bearer,
        ));
    }

    router.route("/health", get(|| async { "ok" }))
}

#[derive(Debug, Default, Deserialize)]
struct TokenParams {
    access_token: Option<String>,
    token: Option<String>,
}

async fn require_bearer(
    State(expected): State<Arc<String>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let header_ok = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", expected.as_str()));

    // Fallback for clients that cannot set headers (EventSource)
    let query_ok = Query::<TokenParams>::try_from_uri(req.uri()).is_ok_and(|Query(params)| {
        [params.access_token, params.token]
            .into_iter()
            .flatten()
            .any(|token| token == expected.as_str())
    });

    if !(header_ok || query_ok) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(req).await
}
