use super::*;
use crate::config::Config;
use crate::models::{ConversationTurn, SavedConversation, SessionView};
use crate::service::tests::{EchoWarehouse, service_with};

use axum::http::Method;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn open(app: &Router) -> SessionView {
    let response = app
        .clone()
        .oneshot(empty_request(Method::POST, "/api/sessions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn app(tmp: &TempDir) -> Router {
    router(service_with(Arc::new(EchoWarehouse::new(Some("250"))), tmp))
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let response = app(&tmp)
        .oneshot(empty_request(Method::GET, "/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn test_chat_flow() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    let session = open(&app).await;
    assert!((session.remaining_balance_usd - 250.0).abs() < 1e-9);

    let uri = format!("/api/sessions/{}/messages", session.id);
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, &uri, json!({"message": "Hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let turn: ConversationTurn = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(turn.user_input, "Hi");

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/sessions/{}/stats", session.id),
        ))
        .await
        .unwrap();
    let stats: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(stats["total_tokens"], 25);
    assert_eq!(stats["panel"]["total_tokens"], "25");

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/sessions/{}/turns", session.id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Clearing an empty history is refused
    let response = app
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/sessions/{}/turns", session.id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_settings_update_clears_history() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    let session = open(&app).await;

    app.clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/sessions/{}/messages", session.id),
            json!({"message": "remember me"}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/sessions/{}/settings", session.id),
            json!({"memory_enabled": false, "guardrails_enabled": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view: SessionView = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(view.turns.is_empty());
    assert!(view.settings.guardrails_enabled);
    assert!(!view.settings.memory_enabled);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let tmp = TempDir::new().unwrap();
    let response = app(&tmp)
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/sessions/{}", uuid::Uuid::new_v4()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_archive_endpoints() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    let session = open(&app).await;

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, "/api/conversations"))
        .await
        .unwrap();
    let names: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(names.is_empty());

    app.clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/sessions/{}/messages", session.id),
            json!({"message": "Tell me about yourself"}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/sessions/{}/archive", session.id),
            json!({"name": "round-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, "/api/conversations/round-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let saved: SavedConversation = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(saved.turns.len(), 1);
    assert_eq!(saved.turns[0].user_input, "Tell me about yourself");

    let response = app
        .clone()
        .oneshot(empty_request(Method::DELETE, "/api/conversations/round-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(empty_request(Method::GET, "/api/conversations/round-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stream_reveals_then_sends_turn() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp);
    let session = open(&app).await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!("/api/sessions/{}/messages/stream", session.id),
            json!({"message": "Hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("event: delta"));
    assert!(text.contains("▌"));
    let turn_pos = text.find("event: turn").unwrap();
    assert!(text.rfind("event: delta").unwrap() < turn_pos);
    assert!(text[turn_pos..].contains("\"user_input\":\"Hello\""));
}

#[tokio::test]
async fn test_bearer_token_required_when_configured() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.server.bearer_token = Some("s3cret".to_string());
    let service = crate::service::ChatService::with_parts(
        Arc::new(config),
        Arc::new(EchoWarehouse::new(None)),
        Arc::new(crate::rates::MockRateSource::new()),
        Arc::new(crate::archive::JsonFileArchive::new(tmp.path())),
    );
    let app = router(service);

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, "/api/conversations"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/conversations")
                .header(header::AUTHORIZATION, "Bearer s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, "/api/conversations?token=s3cret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(empty_request(Method::GET, "/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_query_token_is_percent_decoded() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.server.bearer_token = Some("a+b/c=d&e".to_string());
    let service = crate::service::ChatService::with_parts(
        Arc::new(config),
        Arc::new(EchoWarehouse::new(None)),
        Arc::new(crate::rates::MockRateSource::new()),
        Arc::new(crate::archive::JsonFileArchive::new(tmp.path())),
    );
    let app = router(service);

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            "/api/conversations?access_token=a%2Bb%2Fc%3Dd%26e",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Undecoded, '+' is a space and '&' splits the pair
    let response = app
        .oneshot(empty_request(
            Method::GET,
            "/api/conversations?access_token=a+b/c=d&e",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
