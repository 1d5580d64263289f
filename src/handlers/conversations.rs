use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{SaveConversationRequest, SavedConversation};
use crate::service::ChatService;

pub async fn save(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveConversationRequest>,
) -> Result<StatusCode> {
    service.save_conversation(id, &req.name).await?;
    Ok(StatusCode::CREATED)
}

pub async fn list(State(service): State<ChatService>) -> Result<Json<Vec<String>>> {
    Ok(Json(service.list_conversations().await?))
}

pub async fn view(
    State(service): State<ChatService>,
    Path(name): Path<String>,
) -> Result<Json<SavedConversation>> {
    Ok(Json(service.load_conversation(&name).await?))
}

pub async fn delete(
    State(service): State<ChatService>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    service.delete_conversation(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
