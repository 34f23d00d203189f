mod api;
mod db;
mod error;
mod models;
mod services;
mod utils;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use dotenv::dotenv;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{auth::auth_router, question::question_router, room::room_router},
    db::connection::Database,
    services::summarizer::Summarizer,
    ws::RoomChannels,
};

const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[derive(Clone, FromRef)]
pub struct SharedState {
    pub db: Arc<Database>,
    pub channels: Arc<RoomChannels>,
    pub summarizer: Arc<Summarizer>,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("askroom=debug,tower_http=info")),
        )
        .init();

    let db = Arc::new(
        Database::init()
            .await
            .expect("❌ Failed to connect to MongoDB"),
    );

    let shared_state = SharedState {
        db: db.clone(),
        channels: Arc::new(RoomChannels::new()),
        summarizer: Arc::new(Summarizer::from_env()),
    };

    // Hourly sweep alongside the manual cleanup endpoint.
    let sweep_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match Database::deactivate_stale_rooms(sweep_db.clone()).await {
                Ok(0) => {}
                Ok(deactivated) => tracing::info!(deactivated, "stale rooms deactivated"),
                Err(err) => tracing::error!(error = %err, "stale room sweep failed"),
            }
        }
    });

    let client_url =
        std::env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
    let cors = CorsLayer::new()
        .allow_origin(
            client_url
                .parse::<HeaderValue>()
                .expect("❌ CLIENT_URL is not a valid origin"),
        )
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let app = Router::new()
        .nest("/auth", auth_router())
        .nest("/room", room_router().merge(question_router()))
        .route("/ws", get(ws::handler))
        .layer(cors)
        .with_state(shared_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("❌ Failed to bind server address");
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.unwrap();
}
