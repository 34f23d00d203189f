use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::post,
};
use mongodb::bson::{doc, oid::ObjectId};
use serde::Deserialize;
use serde_json::json;

use crate::{
    SharedState,
    db::connection::Database,
    error::ApiError,
    models::user_model::{LoginUser, RegisterUser, User},
    utils::{
        bcrypt::{hash_password, verify_password},
        jwt::{generate_access_token, generate_refresh_token, verify_refresh_token},
    },
};

async fn register(
    State(db): State<Arc<Database>>,
    Json(payload): Json<RegisterUser>,
) -> Result<impl IntoResponse, ApiError> {
    if db
        .user
        .find_one(doc! { "email": &payload.email }, None)
        .await?
        .is_some()
    {
        return Err(ApiError::bad_request(
            "User already exists with this email.",
        ));
    }

    let hashed_password = hash_password(&payload.password)?;

    let new_user = User::new(payload.username, payload.email, hashed_password);
    db.user.insert_one(&new_user, None).await?;

    tracing::info!(email = %new_user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "User registered successfully." })),
    ))
}

async fn login(
    State(db): State<Arc<Database>>,
    Json(payload): Json<LoginUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = db
        .user
        .find_one(doc! { "email": &payload.email }, None)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if let Ok(false) | Err(_) = verify_password(&payload.password, &user.password) {
        return Err(ApiError::bad_request("Incorrect password."));
    }

    let user_id = user._id.expect("User id not found in DB.").to_hex();
    let access_token = generate_access_token(&user_id, &user.username, &user.email);
    let refresh_token = generate_refresh_token(&user_id);

    tracing::info!(email = %user.email, "user logged in");
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "User logged in successfully.",
            "access_token": access_token,
            "refresh_token": refresh_token
        })),
    ))
}

#[derive(Deserialize)]
struct RefreshPayload {
    refresh_token: String,
}

/// Trades a valid refresh token for a fresh access token. The account is
/// looked up again so tokens for deleted users stop working here.
async fn refresh(
    State(db): State<Arc<Database>>,
    Json(payload): Json<RefreshPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = verify_refresh_token(&payload.refresh_token).ok_or(ApiError::Unauthorized)?;
    let user_id = claims
        .sub
        .parse::<ObjectId>()
        .map_err(|_| ApiError::Unauthorized)?;

    let user = Database::get_user_by_id(db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let access_token = generate_access_token(&claims.sub, &user.username, &user.email);

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "access_token": access_token
        })),
    ))
}

pub fn auth_router() -> Router<SharedState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}
