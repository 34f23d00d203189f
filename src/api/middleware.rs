use axum::{
    extract::Request,
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use mongodb::bson::oid::ObjectId;

use crate::error::ApiError;
use crate::utils::jwt::verify_access_token;

/// Identity extracted from a verified access token, available to protected
/// handlers through request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: ObjectId,
    pub username: String,
    pub email: String,
}

/// Verifies the `Authorization: Bearer <token>` header. Handlers that share
/// a path with a public method call this directly instead of sitting behind
/// the middleware.
pub fn authenticate(headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = verify_access_token(token).map_err(|_| ApiError::Unauthorized)?;
    let id = claims
        .sub
        .parse::<ObjectId>()
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(AuthUser {
        id,
        username: claims.username,
        email: claims.email,
    })
}

/// Rejects the request with 401 unless it carries a valid bearer token.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let user = authenticate(req.headers())?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
