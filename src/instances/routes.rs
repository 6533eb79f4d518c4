use super::handler::{
    deprovision, get, list, my_instance, my_instance_health, open_instance, provision,
    release_subdomain, reprovision, rotate_password, sso_keys,
};
use crate::common::DefaultAppState;
use axum::{Router, routing::get as http_get, routing::post};
use std::sync::Arc;

pub fn routes(app_state: Arc<DefaultAppState>) -> Router {
    let admin = Router::new()
        .route("/instances", http_get(list).post(provision))
        .route("/instances/{id}", http_get(get))
        .route("/instances/{id}/deprovision", post(deprovision))
        .route("/instances/{id}/reprovision", post(reprovision))
        .route("/instances/{id}/rotate-password", post(rotate_password))
        .route("/instances/{id}/release-subdomain", post(release_subdomain));

    let tenant = Router::new()
        .route("/instance", http_get(my_instance))
        .route("/instance/health", http_get(my_instance_health))
        .route("/instance/open", http_get(open_instance));

    Router::new()
        .nest("/admin", admin)
        .nest("/me", tenant)
        .route("/sso/keys", http_get(sso_keys))
        .with_state(app_state)
}
