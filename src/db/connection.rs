use chrono::{Duration, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    Client, Collection, IndexModel,
    bson::{DateTime, doc, oid::ObjectId},
    error::{ErrorKind, Result, WriteFailure},
    options::{FindOneOptions, FindOptions, IndexOptions},
};
use std::{env, sync::Arc};

use crate::models::{question_model::Question, room_model::Room, user_model::User};

/// Rooms older than this are flipped inactive by the cleanup sweep.
const STALE_ROOM_HOURS: i64 = 24;

pub struct Database {
    pub user: Collection<User>,
    pub room: Collection<Room>,
    pub question: Collection<Question>,
}

impl Database {
    pub async fn init() -> Result<Self> {
        let db_url = env::var("MONGODB_URI").expect("❌ MONGODB_URI not found in .env");
        let client = Client::with_uri_str(&db_url).await?;

        let db_name = env::var("DB_NAME").unwrap_or_else(|_| "askroom".to_string());
        let db = client.database(&db_name);

        let user: Collection<User> = db.collection("users");
        let room: Collection<Room> = db.collection("rooms");
        let question: Collection<Question> = db.collection("questions");

        // Room codes must stay unique across every room ever created;
        // create_room regenerates on a duplicate-key rejection.
        let room_code_index = IndexModel::builder()
            .keys(doc! { "roomCode": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        room.create_index(room_code_index, None).await?;

        Ok(Database {
            user,
            room,
            question,
        })
    }

    pub async fn get_user_by_id(
        db: Arc<Database>,
        user_id: ObjectId,
    ) -> mongodb::error::Result<Option<User>> {
        let filter = doc! { "_id": user_id };
        let user = db.user.find_one(filter, None).await?;

        Ok(user)
    }

    pub async fn create_room(db: Arc<Database>, room: &Room) -> mongodb::error::Result<()> {
        db.room.insert_one(room, None).await?;
        Ok(())
    }

    /// Fetches a room regardless of its `isActive` flag. Explicit room
    /// deletion goes through here so stale rooms stay deletable.
    pub async fn get_room_by_code(
        db: Arc<Database>,
        room_code: &str,
    ) -> mongodb::error::Result<Option<Room>> {
        let filter = doc! { "roomCode": room_code };
        let room = db.room.find_one(filter, None).await?;

        Ok(room)
    }

    /// Fetches a room only while it is active. Join, post, get and
    /// summarize all treat an inactive room as absent.
    pub async fn get_active_room(
        db: Arc<Database>,
        room_code: &str,
    ) -> mongodb::error::Result<Option<Room>> {
        let filter = doc! { "roomCode": room_code, "isActive": true };
        let room = db.room.find_one(filter, None).await?;

        Ok(room)
    }

    pub async fn add_participant_to_room(
        db: Arc<Database>,
        room_code: &str,
        user_id: ObjectId,
    ) -> mongodb::error::Result<()> {
        let filter = doc! { "roomCode": room_code };
        let update = doc! { "$addToSet": { "participants": user_id } };

        db.room.update_one(filter, update, None).await?;
        Ok(())
    }

    pub async fn delete_room(db: Arc<Database>, room_code: &str) -> mongodb::error::Result<()> {
        let filter = doc! { "roomCode": room_code };
        db.room.delete_one(filter, None).await?;
        Ok(())
    }

    /// Deactivates every active room older than the staleness threshold.
    /// Questions are left in place; only explicit deletion cascades.
    pub async fn deactivate_stale_rooms(db: Arc<Database>) -> mongodb::error::Result<u64> {
        let cutoff = Utc::now() - Duration::hours(STALE_ROOM_HOURS);
        let filter = doc! {
            "isActive": true,
            "createdAt": { "$lt": DateTime::from_chrono(cutoff) },
        };
        let update = doc! { "$set": { "isActive": false } };

        let result = db.room.update_many(filter, update, None).await?;
        Ok(result.modified_count)
    }

    pub async fn insert_question(
        db: Arc<Database>,
        question: &Question,
    ) -> mongodb::error::Result<()> {
        db.question.insert_one(question, None).await?;
        Ok(())
    }

    pub async fn get_question_by_id(
        db: Arc<Database>,
        question_id: ObjectId,
    ) -> mongodb::error::Result<Option<Question>> {
        let filter = doc! { "_id": question_id };
        let question = db.question.find_one(filter, None).await?;

        Ok(question)
    }

    pub async fn questions_for_room(
        db: Arc<Database>,
        room_code: &str,
    ) -> mongodb::error::Result<Vec<Question>> {
        let filter = doc! { "roomCode": room_code };
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();

        let cursor = db.question.find(filter, options).await?;
        let questions: Vec<Question> = cursor.try_collect().await?;

        Ok(questions)
    }

    /// The most recent question a display name posted in a room, used by
    /// the best-effort rate limit.
    pub async fn latest_question_by_author(
        db: Arc<Database>,
        room_code: &str,
        user: &str,
    ) -> mongodb::error::Result<Option<Question>> {
        let filter = doc! { "roomCode": room_code, "user": user };
        let options = FindOneOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .build();

        let question = db.question.find_one(filter, options).await?;

        Ok(question)
    }

    pub async fn delete_question(
        db: Arc<Database>,
        question_id: ObjectId,
    ) -> mongodb::error::Result<()> {
        let filter = doc! { "_id": question_id };
        db.question.delete_one(filter, None).await?;
        Ok(())
    }

    pub async fn delete_questions_in_room(
        db: Arc<Database>,
        room_code: &str,
    ) -> mongodb::error::Result<u64> {
        let filter = doc! { "roomCode": room_code };
        let result = db.question.delete_many(filter, None).await?;

        Ok(result.deleted_count)
    }
}

/// True when an insert bounced off a unique index, which is how a room-code
/// collision surfaces.
pub fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}
