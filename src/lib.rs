pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/:business_id/turn", post(handlers::chat::post_turn))
        .route(
            "/api/:business_id/availability",
            get(handlers::catalog::get_availability),
        )
        .route(
            "/api/:business_id/services",
            get(handlers::catalog::list_services).post(handlers::catalog::create_service),
        )
        .route(
            "/api/:business_id/services/:id",
            put(handlers::catalog::update_service).delete(handlers::catalog::delete_service),
        )
        .route("/api/:business_id/hours", get(handlers::catalog::get_hours))
        .route(
            "/api/:business_id/hours/:weekday",
            put(handlers::catalog::put_hours),
        )
        .route(
            "/api/:business_id/blackouts",
            get(handlers::catalog::list_blackouts).post(handlers::catalog::create_blackout),
        )
        .route(
            "/api/:business_id/blackouts/:id",
            axum::routing::delete(handlers::catalog::delete_blackout),
        )
        .route(
            "/api/:business_id/bookings",
            get(handlers::bookings::list_bookings).post(handlers::bookings::create_booking),
        )
        .route(
            "/api/:business_id/bookings/:id",
            get(handlers::bookings::get_booking).delete(handlers::bookings::delete_booking),
        )
        .route(
            "/api/:business_id/bookings/:id/status",
            post(handlers::bookings::update_status),
        )
        .route(
            "/api/:business_id/threads/:thread_id/bookings",
            get(handlers::bookings::thread_bookings),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
