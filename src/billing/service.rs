use crate::app::config::BillingPolicyTable;
use crate::billing::dto::BillingWebhookPayload;
use crate::billing::model::BillingEventKind;
use crate::billing::policy;
use crate::billing::repository::{BillingRepository, DedupeOutcome};
use crate::billing::verifier::{verify_webhook_signature, VerifierError};
use crate::common::MailTransporter;
use crate::common::dto::GeneralError;
use crate::common::error::{FriendlyError, IntoFriendlyError, RepositoryError};
use crate::instances::reconciler::ReconcileHandle;
use crate::instances::repository::InstancesRepository;
use crate::tenants::repository::TenantsRepository;
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{event, Level};

#[derive(Debug, Error)]
pub enum BillingServiceError {
    #[error("webhook signature verification failed: {0}")]
    Verification(#[from] VerifierError),

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[async_trait]
impl IntoFriendlyError<GeneralError> for BillingServiceError {
    async fn into_friendly_error(
        self,
        _mailer: Arc<dyn MailTransporter>,
    ) -> FriendlyError<GeneralError> {
        let body = GeneralError {
            message: self.to_string(),
        };
        match &self {
            Self::Verification(_) => {
                FriendlyError::user_facing(Level::WARN, StatusCode::UNAUTHORIZED, file!(), body)
            }
            Self::MalformedPayload(_) => {
                FriendlyError::user_facing(Level::DEBUG, StatusCode::BAD_REQUEST, file!(), body)
            }
            Self::Repository(_) => FriendlyError::internal(file!(), body),
        }
    }
}

pub(crate) type BillingServiceResult<T> = Result<T, BillingServiceError>;

/// Spec §4.6 "signed webhook → verify → normalize → dedupe → enqueue".
/// Webhook replays (a duplicate `external_event_id`) are accepted as a
/// no-op 200, not an error — delivery-at-least-once is the provider's
/// contract, not a client mistake.
pub(crate) struct BillingService;

impl BillingService {
    pub async fn handle_webhook(
        billing_repo: Arc<dyn BillingRepository>,
        tenants_repo: Arc<dyn TenantsRepository>,
        instances_repo: Arc<dyn InstancesRepository>,
        reconcile: &ReconcileHandle,
        webhook_secret: &str,
        policy_table: &BillingPolicyTable,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> BillingServiceResult<()> {
        verify_webhook_signature(webhook_secret, raw_body, signature_header)?;

        let payload: BillingWebhookPayload = serde_json::from_slice(raw_body)
            .map_err(|e| BillingServiceError::MalformedPayload(e.to_string()))?;

        let kind: BillingEventKind = payload
            .kind
            .parse()
            .map_err(BillingServiceError::MalformedPayload)?;

        let normalized_body = serde_json::to_value(&payload)
            .map_err(|e| BillingServiceError::MalformedPayload(e.to_string()))?;

        let event = match billing_repo
            .dedupe_and_store(&payload.external_event_id, kind.as_str(), normalized_body)
            .await?
        {
            DedupeOutcome::Duplicate => return Ok(()),
            DedupeOutcome::Fresh(event) => event,
        };

        let decision = policy::decide(kind, policy_table);

        let tenant = match tenants_repo
            .get_tenant_by_external_customer_id(&payload.external_customer_id)
            .await
        {
            Ok(tenant) => Some(tenant),
            Err(e) if e.is_not_found() => {
                event!(
                    Level::WARN,
                    external_customer_id = %payload.external_customer_id,
                    "billing webhook for an unlinked customer; subscription state not applied"
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(tenant) = tenant {
            tenants_repo
                .update_billing_link(
                    tenant.id,
                    Some(&payload.external_customer_id),
                    payload.external_subscription_id.as_deref(),
                    &decision.subscription_state,
                )
                .await?;

            if let Some(desired) = decision.desired_state {
                match instances_repo.load_by_tenant_id(tenant.id).await {
                    Ok(instance) => {
                        // Billing-driven deprovision always retains the data
                        // volume (spec §6 "retain=false" is an explicit
                        // admin choice, never an implicit consequence of a
                        // payment-provider webhook).
                        let delete_volume =
                            (desired.as_str() == "absent").then_some(false);
                        instances_repo
                            .update_desired_state(
                                instance.id,
                                instance.generation,
                                desired.as_str(),
                                None,
                                delete_volume,
                            )
                            .await?;
                        reconcile.enqueue(instance.id);
                    }
                    Err(e) if e.is_not_found() => {
                        event!(
                            Level::INFO,
                            tenant_id = %tenant.id,
                            "billing event resolved to a desired-state change but the tenant has no instance yet"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        billing_repo.mark_processed(event.id).await?;
        Ok(())
    }
}
