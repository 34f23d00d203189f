use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Serialize, Deserialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub room_code: String,
    pub content: String,

    /// Display name of the poster, kept for rendering and the per-room
    /// rate-limit key. Ownership checks go through `user_id`.
    pub user: String,
    pub user_id: ObjectId,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn new(room_code: String, content: String, user: String, user_id: ObjectId) -> Self {
        Question {
            _id: Some(ObjectId::new()),
            room_code,
            content,
            user,
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// Wire form of a stored question: ids as plain hex, `createdAt` as an
/// RFC 3339 string. REST responses and room events both use this shape,
/// matching the hex ids the delete contracts expect back.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub room_code: String,
    pub content: String,
    pub user: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(question: Question) -> Self {
        QuestionResponse {
            id: question._id.map(|id| id.to_hex()).unwrap_or_default(),
            room_code: question.room_code,
            content: question.content,
            user: question.user,
            user_id: question.user_id.to_hex(),
            created_at: question.created_at,
        }
    }
}
