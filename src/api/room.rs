use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Path, State},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    SharedState,
    api::middleware::{AuthUser, require_auth},
    db::connection::{Database, is_duplicate_key_error},
    error::ApiError,
    models::room_model::{Room, RoomResponse},
    services::summarizer::Summarizer,
};

const CODE_LENGTH: usize = 6;
const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MAX_CODE_ATTEMPTS: u32 = 5;

fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

async fn create_room(
    State(db): State<Arc<Database>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let code = generate_room_code();
        let room = Room::new(code.clone(), user.id);

        match Database::create_room(db.clone(), &room).await {
            Ok(()) => {
                tracing::info!(room_code = %code, host = %user.username, "room created");
                return Ok(Json(json!({ "roomCode": code })));
            }
            // A code collision regenerates; anything else is a real failure.
            Err(err) if is_duplicate_key_error(&err) && attempts < MAX_CODE_ATTEMPTS => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetRoomResponse {
    #[serde(flatten)]
    room: RoomResponse,
    creator_email: Option<String>,
}

async fn get_room(
    State(db): State<Arc<Database>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room = Database::get_active_room(db.clone(), &code)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    let creator_email = Database::get_user_by_id(db, room.created_by)
        .await?
        .map(|user| user.email);

    Ok(Json(GetRoomResponse {
        room: room.into(),
        creator_email,
    }))
}

async fn join_room(
    State(db): State<Arc<Database>>,
    Extension(user): Extension<AuthUser>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room = Database::get_active_room(db.clone(), &code)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    Database::add_participant_to_room(db, &room.room_code, user.id).await?;

    tracing::debug!(room_code = %room.room_code, user = %user.username, "participant joined");
    Ok(Json(json!({
        "message": "Joined room successfully",
        "roomCode": room.room_code
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRoomRequest {
    user_id: String,
}

/// Removes a room and every question posted in it. The caller proves
/// ownership by sending the creator's id in the body; inactive rooms can
/// still be deleted this way.
async fn delete_room(
    State(db): State<Arc<Database>>,
    Path(code): Path<String>,
    Json(payload): Json<DeleteRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room = Database::get_room_by_code(db.clone(), &code)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    if payload.user_id != room.created_by.to_hex() {
        return Err(ApiError::forbidden("Unauthorized to delete this room"));
    }

    let removed = Database::delete_questions_in_room(db.clone(), &room.room_code).await?;
    Database::delete_room(db, &room.room_code).await?;

    tracing::info!(room_code = %room.room_code, questions = removed, "room deleted");
    Ok(Json(json!({
        "message": "Room and associated questions deleted successfully"
    })))
}

async fn cleanup_rooms(State(db): State<Arc<Database>>) -> Result<impl IntoResponse, ApiError> {
    let deactivated = Database::deactivate_stale_rooms(db).await?;

    if deactivated > 0 {
        tracing::info!(deactivated, "stale rooms deactivated");
    }
    Ok(Json(json!({
        "message": "Room cleanup completed",
        "deactivatedCount": deactivated
    })))
}

async fn summarize_room(
    State(db): State<Arc<Database>>,
    State(summarizer): State<Arc<Summarizer>>,
    Extension(user): Extension<AuthUser>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room = Database::get_active_room(db.clone(), &code)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    if room.created_by != user.id {
        return Err(ApiError::forbidden(
            "Only the room creator can request summaries",
        ));
    }

    let questions = Database::questions_for_room(db, &room.room_code).await?;
    let summaries = summarizer.summarize(&questions).await?;

    tracing::info!(room_code = %room.room_code, themes = summaries.len(), "questions summarized");
    Ok(Json(summaries))
}

pub fn room_router() -> Router<SharedState> {
    Router::new()
        .route("/", post(create_room))
        .route("/{code}/join", post(join_room))
        .route("/{code}/summary", get(summarize_room))
        .route_layer(middleware::from_fn(require_auth))
        .route("/{code}", get(get_room).delete(delete_room))
        .route("/cleanup", post(cleanup_rooms))
}
