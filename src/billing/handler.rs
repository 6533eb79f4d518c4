use crate::billing::repository::BillingRepository;
use crate::billing::service::BillingService;
use crate::common::DefaultAppState;
use crate::common::MailTransporter;
use crate::common::dto::{GeneralError, HandlerResult, SuccessResponseBuilder};
use crate::common::error::IntoFriendlyError;
use crate::instances::repository::InstancesRepository;
use crate::tenants::repository::TenantsRepository;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use std::sync::Arc;

/// `POST /webhooks/billing` (spec §6). Takes the raw body rather than a
/// typed extractor so the HMAC signature can be verified over the exact
/// bytes the provider signed, before any JSON parsing happens.
pub async fn webhook(
    State(app_state): State<Arc<DefaultAppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult<GeneralError> {
    let signature = headers
        .get("x-billing-signature")
        .and_then(|v| v.to_str().ok());

    let billing_repo = app_state.store.clone() as Arc<dyn BillingRepository>;
    let tenants_repo = app_state.store.clone() as Arc<dyn TenantsRepository>;
    let instances_repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    let webhook_secret = app_state.config().billing().webhook_secret().to_owned();
    let policy = app_state.config().billing().policy().clone();

    match BillingService::handle_webhook(
        billing_repo,
        tenants_repo,
        instances_repo,
        &app_state.reconcile,
        &webhook_secret,
        &policy,
        &body,
        signature,
    )
    .await
    {
        Ok(()) => Ok(SuccessResponseBuilder::<GeneralError>::new().build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}
