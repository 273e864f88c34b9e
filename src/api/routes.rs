use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::DocumentSource;

pub fn create_router<S: DocumentSource + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Cross-file analysis of a comparison
        .route("/analyze", post(handlers::analyze::<S>))
        // Apply decisions to one document pair
        .route("/merge", post(handlers::merge::<S>))
}
