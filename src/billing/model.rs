use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// The four webhook event kinds the `billing_events_kind_check` constraint
/// in `0001_init.sql` allows (spec §3 "BillingEvent").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventKind {
    CheckoutCompleted,
    SubscriptionUpdated,
    SubscriptionCancelled,
    PaymentFailed,
}

impl BillingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout_completed",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::PaymentFailed => "payment_failed",
        }
    }
}

impl FromStr for BillingEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout_completed" => Ok(Self::CheckoutCompleted),
            "subscription_updated" => Ok(Self::SubscriptionUpdated),
            "subscription_cancelled" => Ok(Self::SubscriptionCancelled),
            "payment_failed" => Ok(Self::PaymentFailed),
            other => Err(format!("unknown billing event kind: {other}")),
        }
    }
}

impl fmt::Display for BillingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An append-only row of the inbound webhook log (spec §3 "BillingEvent
/// rows are immutable after processed-at is set").
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BillingEvent {
    pub id: i64,
    pub external_event_id: String,
    pub kind: String,
    pub received_at: DateTime<Utc>,
    pub normalized_body: serde_json::Value,
    pub processed_at: Option<DateTime<Utc>>,
}

impl BillingEvent {
    pub fn kind(&self) -> Result<BillingEventKind, String> {
        self.kind.parse()
    }
}
