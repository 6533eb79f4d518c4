use serde::{Deserialize, Serialize};

/// The raw webhook body (spec §6 `POST /webhooks/billing`). `kind` is
/// validated against [`crate::billing::model::BillingEventKind`] in
/// `BillingService::handle_webhook`, not here — deserialization only
/// needs to recognize the envelope shape, classification is the service's
/// job so a malformed `kind` can still be stored/deduped before it's
/// rejected.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct BillingWebhookPayload {
    pub external_event_id: String,
    pub kind: String,
    pub external_customer_id: String,
    pub external_subscription_id: Option<String>,
}
