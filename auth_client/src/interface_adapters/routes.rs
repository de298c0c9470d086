use crate::interface_adapters::handlers::{callback, health, post_message};
use crate::interface_adapters::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/auth/message", post(post_message))
        .route("/auth/callback", get(callback))
        .route("/health", get(health))
        .with_state(state)
}
