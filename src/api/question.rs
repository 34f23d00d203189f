use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Json},
    routing::{delete, post},
};
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::{
    SharedState,
    api::middleware::authenticate,
    db::connection::Database,
    error::ApiError,
    models::question_model::{Question, QuestionResponse},
    ws::{RoomChannels, RoomEvent},
};

const MAX_CONTENT_LENGTH: usize = 500;
const QUESTION_RATE_LIMIT_SECONDS: i64 = 10;

static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());

/// Best-effort sanitizer. Only paired script tags are removed; everything
/// else passes through untouched.
fn strip_script_tags(content: &str) -> String {
    SCRIPT_TAG.replace_all(content, "").into_owned()
}

fn validate_content(raw: &str) -> Result<&str, ApiError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Question content cannot be empty"));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(ApiError::bad_request(
            "Question content must be 500 characters or less",
        ));
    }
    Ok(content)
}

/// Strictly-less-than comparison so a question posted exactly at the
/// boundary is allowed.
fn within_rate_limit(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - last).num_milliseconds() < QUESTION_RATE_LIMIT_SECONDS * 1000
}

#[derive(Debug, Deserialize)]
struct PostQuestionRequest {
    content: String,
}

/// Shares its path with the public question listing, so the bearer check
/// runs here rather than behind the router middleware.
async fn post_question(
    State(db): State<Arc<Database>>,
    State(channels): State<Arc<RoomChannels>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<PostQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&headers)?;

    let content = strip_script_tags(validate_content(&payload.content)?);

    let room = Database::get_active_room(db.clone(), &code)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    if room.created_by == user.id {
        return Err(ApiError::forbidden("The room creator cannot post questions"));
    }
    if !room.participants.contains(&user.id) {
        return Err(ApiError::forbidden("Join the room before posting questions"));
    }

    let last_posted =
        Database::latest_question_by_author(db.clone(), &room.room_code, &user.username).await?;
    if let Some(last) = last_posted {
        if within_rate_limit(last.created_at, Utc::now()) {
            return Err(ApiError::too_many_requests(
                "Please wait before posting another question",
            ));
        }
    }

    let question = Question::new(
        room.room_code.clone(),
        content.trim().to_string(),
        user.username.clone(),
        user.id,
    );
    Database::insert_question(db, &question).await?;

    let response = QuestionResponse::from(question);
    let delivered = channels.publish(&room.room_code, RoomEvent::NewQuestion(response.clone()));
    tracing::debug!(
        room_code = %room.room_code,
        user = %user.username,
        delivered,
        "question posted"
    );

    Ok(Json(response))
}

async fn list_questions(
    State(db): State<Arc<Database>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let questions: Vec<QuestionResponse> = Database::questions_for_room(db, &code)
        .await?
        .into_iter()
        .map(QuestionResponse::from)
        .collect();
    Ok(Json(questions))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteQuestionRequest {
    user_id: String,
}

async fn delete_question(
    State(db): State<Arc<Database>>,
    State(channels): State<Arc<RoomChannels>>,
    Path(id): Path<String>,
    Json(payload): Json<DeleteQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question_id = ObjectId::parse_str(&id)
        .map_err(|_| ApiError::bad_request("Invalid question ID format"))?;

    let question = Database::get_question_by_id(db.clone(), question_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Question not found"))?;

    if payload.user_id != question.user_id.to_hex() {
        return Err(ApiError::forbidden("Unauthorized to delete this question"));
    }

    Database::delete_question(db, question_id).await?;

    let delivered = channels.publish(
        &question.room_code,
        RoomEvent::DeleteQuestion(question_id.to_hex()),
    );
    tracing::debug!(room_code = %question.room_code, delivered, "question deleted");

    Ok(Json(json!({ "message": "Question deleted successfully" })))
}

pub fn question_router() -> Router<SharedState> {
    Router::new()
        .route("/{code}/question", post(post_question).get(list_questions))
        .route("/question/{id}", delete(delete_question))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use mongodb::Client;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::services::summarizer::Summarizer;
    use crate::ws::RoomChannels;

    async fn state() -> SharedState {
        let client = Client::with_uri_str("mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=100")
            .await
            .unwrap();
        let db = client.database("askroom_test");

        SharedState {
            db: Arc::new(Database {
                user: db.collection("users"),
                room: db.collection("rooms"),
                question: db.collection("questions"),
            }),
            channels: Arc::new(RoomChannels::new()),
            summarizer: Arc::new(Summarizer::new(None, "http://127.0.0.1:9".to_string())),
        }
    }

    #[test]
    fn strips_paired_script_tags() {
        assert_eq!(
            strip_script_tags("hello <script>alert(1)</script>world"),
            "hello world"
        );
        assert_eq!(
            strip_script_tags("<SCRIPT src=\"evil.js\">x</SCRIPT>safe"),
            "safe"
        );
        assert_eq!(
            strip_script_tags("<script>a</script>mid<script>b</script>"),
            "mid"
        );
    }

    #[test]
    fn leaves_everything_else_alone() {
        assert_eq!(strip_script_tags("what about 1 < 2?"), "what about 1 < 2?");
        assert_eq!(strip_script_tags("<script>unclosed"), "<script>unclosed");
        assert_eq!(strip_script_tags("<b>bold</b>"), "<b>bold</b>");
    }

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert!(matches!(
            validate_content("   "),
            Err(ApiError::BadRequest(_))
        ));
        assert_eq!(validate_content("  What is X?  ").unwrap(), "What is X?");

        let exactly_max = "é".repeat(MAX_CONTENT_LENGTH);
        assert!(validate_content(&exactly_max).is_ok());

        let too_long = "a".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(matches!(
            validate_content(&too_long),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn rate_limit_boundary_is_exclusive() {
        let now = Utc::now();

        assert!(within_rate_limit(now - Duration::milliseconds(9_999), now));
        assert!(!within_rate_limit(now - Duration::seconds(10), now));
        assert!(!within_rate_limit(now - Duration::seconds(11), now));
    }

    #[tokio::test]
    async fn posting_requires_a_token() {
        let app = question_router().with_state(state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/AB12CD/question")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"content":"What is X?"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_question_ids_are_rejected() {
        let app = question_router().with_state(state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/question/not-an-id")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"userId":"abc"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
