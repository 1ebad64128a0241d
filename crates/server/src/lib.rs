pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::{
    routing::{get, post, put},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the HTTP shell around a shared [`AppState`].
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Game
        .route(
            "/api/game",
            post(routes::game::create_game)
                .get(routes::game::get_game)
                .delete(routes::game::delete_game),
        )
        .route("/api/game/move", post(routes::game::make_move))
        .route("/api/game/retry", post(routes::game::retry))
        .route("/api/game/explain", post(routes::game::explain))
        .route("/api/game/dismiss", post(routes::game::dismiss_explanation))
        .route("/api/game/continue", post(routes::game::continue_anyway))
        .route("/api/game/strictness", put(routes::game::set_strictness))
        .route("/api/game/ws", get(routes::ws::game_ws))
        // Shared state
        .layer(Extension(state))
        .layer(cors)
}
