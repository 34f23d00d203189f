use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Serialize, Deserialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub room_code: String,
    pub created_by: ObjectId,

    #[serde(default)]
    pub participants: Vec<ObjectId>,

    pub is_active: bool,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(room_code: String, created_by: ObjectId) -> Self {
        Room {
            _id: Some(ObjectId::new()),
            room_code,
            created_by,
            participants: vec![created_by],
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Wire form of a room, with every member id rendered as plain hex and
/// `createdAt` as an RFC 3339 string.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub room_code: String,
    pub created_by: String,
    pub participants: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        RoomResponse {
            id: room._id.map(|id| id.to_hex()).unwrap_or_default(),
            room_code: room.room_code,
            created_by: room.created_by.to_hex(),
            participants: room.participants.iter().map(|id| id.to_hex()).collect(),
            is_active: room.is_active,
            created_at: room.created_at,
        }
    }
}
