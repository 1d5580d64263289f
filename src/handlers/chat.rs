use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ConversationTurn, SendMessageRequest, SessionView, SettingsUpdate};
use crate::reveal;
use crate::service::ChatService;
use crate::stats::SessionStats;

pub async fn open_session(
    State(service): State<ChatService>,
) -> (StatusCode, Json<SessionView>) {
    (StatusCode::CREATED, Json(service.open_session().await))
}

pub async fn get_session(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    Ok(Json(service.session(id).await?))
}

pub async fn close_session(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    service.close_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_message(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ConversationTurn>> {
    Ok(Json(service.send_message(id, &req.message).await?))
}

/// Sends the message, then replays the finished response as `delta` frames
/// followed by a `turn` event.
pub async fn stream_message(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let turn = service.send_message(id, &req.message).await?;

    let settings = service.config().reveal;
    let frames = reveal::frames(&turn.assistant_response, settings.chars_per_frame);
    let deltas = reveal::timed(frames, service.config().reveal_delay())
        .map(|frame| Ok(Event::default().event("delta").data(frame)));
    let done = futures::stream::once(async move { Event::default().event("turn").json_data(turn) });

    Ok(Sse::new(deltas.chain(done)).keep_alive(KeepAlive::default()))
}

pub async fn clear_history(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    service.clear_history(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_settings(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SessionView>> {
    Ok(Json(service.update_settings(id, &update).await?))
}

pub async fn stats(
    State(service): State<ChatService>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStats>> {
    Ok(Json(service.stats(id).await?))
}
