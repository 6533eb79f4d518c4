use crate::app::database::{PoolProvider, Store};
use crate::billing::model::BillingEvent;
use crate::common::error::RepositoryResult;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Whether a webhook delivery is new work or a replay the caller has
/// already processed (spec §4.1 `DedupeAndStoreBillingEvent`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupeOutcome {
    Fresh(BillingEvent),
    Duplicate,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Inserts on a fresh `external_event_id`, reports `Duplicate` on a
    /// conflict rather than erroring — retried webhook deliveries are
    /// expected traffic, not a failure (spec §3 "dedup key").
    async fn dedupe_and_store(
        &self,
        external_event_id: &str,
        kind: &str,
        normalized_body: serde_json::Value,
    ) -> RepositoryResult<DedupeOutcome>;

    async fn mark_processed(&self, id: i64) -> RepositoryResult<()>;
}

#[async_trait]
impl BillingRepository for Store {
    async fn dedupe_and_store(
        &self,
        external_event_id: &str,
        kind: &str,
        normalized_body: serde_json::Value,
    ) -> RepositoryResult<DedupeOutcome> {
        let inserted = sqlx::query_as::<_, BillingEvent>(
            "INSERT INTO billing_events (external_event_id, kind, normalized_body)
             VALUES ($1, $2, $3)
             ON CONFLICT (external_event_id) DO NOTHING
             RETURNING *",
        )
        .bind(external_event_id)
        .bind(kind)
        .bind(normalized_body)
        .fetch_optional(self.pool())
        .await?;

        if let Some(event) = inserted {
            return Ok(DedupeOutcome::Fresh(event));
        }

        // Row already existed. A prior delivery stored it, but if it never
        // reached `processed_at` (crash or error between storing and
        // applying it) this delivery is still new work, not a replay —
        // only a row that already completed processing is a true
        // duplicate (spec §4.1 "dedup key").
        let existing = sqlx::query_as::<_, BillingEvent>(
            "SELECT * FROM billing_events WHERE external_event_id = $1",
        )
        .bind(external_event_id)
        .fetch_one(self.pool())
        .await?;

        Ok(if existing.processed_at.is_some() {
            DedupeOutcome::Duplicate
        } else {
            DedupeOutcome::Fresh(existing)
        })
    }

    async fn mark_processed(&self, id: i64) -> RepositoryResult<()> {
        sqlx::query("UPDATE billing_events SET processed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips() {
        use crate::billing::model::BillingEventKind;
        use std::str::FromStr;
        for s in [
            "checkout_completed",
            "subscription_updated",
            "subscription_cancelled",
            "payment_failed",
        ] {
            assert_eq!(BillingEventKind::from_str(s).unwrap().as_str(), s);
        }
        assert!(BillingEventKind::from_str("bogus").is_err());
    }
}
