//! REST API: routes, shared types, and structured errors.

pub mod error;
pub mod handlers;
pub mod types;

use axum::routing::{get, post};
use axum::Router;

use crate::server::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        // admin sessions
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/auth/verify",
            get(handlers::auth::verify).post(handlers::auth::verify),
        )
        // API key management (token)
        .route("/apikey/create", post(handlers::apikey::create_api_key))
        .route("/apikey/list", get(handlers::apikey::list_api_keys))
        .route("/apikey/update", post(handlers::apikey::update_api_key))
        .route("/apikey/delete", post(handlers::apikey::delete_api_key))
        // blacklist, admin side (token)
        .route("/blacklist/add", post(handlers::blacklist::add))
        .route("/blacklist/remove", post(handlers::blacklist::remove))
        .route(
            "/blacklist/get",
            get(handlers::blacklist::get).post(handlers::blacklist::get),
        )
        // blacklist, machine side (API key)
        .route(
            "/blacklist/check-api",
            get(handlers::blacklist::check_api).post(handlers::blacklist::check_api),
        )
        .route(
            "/blacklist/check-external",
            get(handlers::blacklist::check_api),
        )
        .route(
            "/blacklist/get-api",
            get(handlers::blacklist::get_api).post(handlers::blacklist::get_api),
        )
        .route("/blacklist/add-api", post(handlers::blacklist::add_api))
        .route(
            "/blacklist/remove-api",
            post(handlers::blacklist::remove_api),
        )
        // connectivity probes
        .route("/blacklist/check", get(handlers::health::health))
        .route("/health", get(handlers::health::health))
        // operation log
        .route("/logs/list", get(handlers::logs::list))
        .route("/logs/advanced", get(handlers::logs::advanced))
        .route("/logs/cleanup", post(handlers::logs::cleanup))
}
