use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/profile",
            get(handlers::get_profile)
                .post(handlers::create_profile)
                .patch(handlers::update_profile),
        )
        .route("/api/baths", get(handlers::list_baths).post(handlers::log_bath))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/challenge/start", post(handlers::start_challenge))
        .route("/api/challenge/cancel", post(handlers::cancel_challenge))
        .route("/api/challenge/refresh", post(handlers::refresh_challenge))
        .route("/api/friends", get(handlers::list_friends))
        .route("/api/friends/:id", delete(handlers::unfriend))
        .route("/api/friends/:id/challenge", post(handlers::start_paired_challenge))
        .route("/api/friends/:id/progress", get(handlers::buddy_progress))
        .route("/api/invites", post(handlers::create_invite))
        .route("/api/invites/accept", post(handlers::accept_invite))
        .route("/api/leaderboard", get(handlers::leaderboard))
        .with_state(state)
}
