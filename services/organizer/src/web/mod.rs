pub mod live;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub use live::live_handler;
use rest::{
    add_goal_handler, add_item_handler, add_moment_handler, add_trip_handler,
    contribute_handler, get_state_handler, remove_goal_handler, remove_item_handler,
    remove_moment_handler, remove_trip_handler, rename_item_handler, toggle_goal_handler,
    toggle_item_handler, update_goal_handler,
};
use state::AppState;

/// Builds the API router: state, live updates, and every mutation endpoint.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(get_state_handler))
        .route("/live", get(live_handler))
        .route("/lists/{category}/items", post(add_item_handler))
        .route(
            "/lists/{category}/items/{id}",
            delete(remove_item_handler).put(rename_item_handler),
        )
        .route("/lists/{category}/items/{id}/toggle", post(toggle_item_handler))
        .route("/moments", post(add_moment_handler))
        .route("/moments/{id}", delete(remove_moment_handler))
        .route("/trips", post(add_trip_handler))
        .route("/trips/{id}", delete(remove_trip_handler))
        .route("/trips/{id}/goals", post(add_goal_handler))
        .route(
            "/trips/{id}/goals/{goal_id}",
            delete(remove_goal_handler).put(update_goal_handler),
        )
        .route(
            "/trips/{id}/goals/{goal_id}/contributions",
            post(contribute_handler),
        )
        .route("/trips/{id}/goals/{goal_id}/toggle", post(toggle_goal_handler))
        .with_state(app_state)
}
