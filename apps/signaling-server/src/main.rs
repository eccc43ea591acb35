use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod error;
mod models;
mod routes;
mod state;
mod store;
mod validation;

use state::AppState;
use store::SignalingStore;

#[tokio::main]
async fn main() {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let db_path = std::env::var("SIGNALING_DB_PATH").unwrap_or_else(|_| {
        tracing::info!("SIGNALING_DB_PATH not set, using ./signaling.sqlite");
        "signaling.sqlite".to_string()
    });
    let store = SignalingStore::new(db_path.into())
        .await
        .expect("open signaling store");

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/calls", routes::calls::router())
        .nest("/api/presence", routes::presence::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(store));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> &'static str {
    "OK"
}
