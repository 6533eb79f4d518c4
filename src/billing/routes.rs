use super::handler::webhook;
use crate::common::DefaultAppState;
use axum::{Router, routing::post};
use std::sync::Arc;

pub fn routes(app_state: Arc<DefaultAppState>) -> Router {
    Router::new()
        .route("/webhooks/billing", post(webhook))
        .with_state(app_state)
}
