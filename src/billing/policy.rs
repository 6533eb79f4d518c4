use crate::app::config::{BillingPolicyEntry, BillingPolicyTable};
use crate::billing::model::BillingEventKind;
use crate::instances::model::DesiredState;

/// The effect a billing event should have on the tenant's subscription
/// record and, where applicable, their instance's desired state.
/// `desired_state: None` means "leave the instance alone" — e.g. a mid-cycle
/// plan change carries no provisioning consequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingDecision {
    pub subscription_state: String,
    pub desired_state: Option<DesiredState>,
}

/// Spec §9 Open Question resolution: driven entirely by `table`
/// (`BillingConfig::policy`, `[billing.policy.*]` in config), so the
/// billing → lifecycle mapping can be read, tested, and changed by editing
/// configuration without touching this function or the Reconciler at all.
pub fn decide(kind: BillingEventKind, table: &BillingPolicyTable) -> BillingDecision {
    let entry = match kind {
        BillingEventKind::CheckoutCompleted => table.checkout_completed(),
        BillingEventKind::SubscriptionUpdated => table.subscription_updated(),
        BillingEventKind::SubscriptionCancelled => table.subscription_cancelled(),
        BillingEventKind::PaymentFailed => table.payment_failed(),
    };
    from_entry(entry)
}

fn from_entry(entry: &BillingPolicyEntry) -> BillingDecision {
    let desired_state = entry.desired_state.as_deref().map(|s| {
        s.parse()
            .unwrap_or_else(|e| panic!("invalid billing.policy desired_state: {e}"))
    });
    BillingDecision {
        subscription_state: entry.subscription_state.clone(),
        desired_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BillingPolicyTable {
        BillingPolicyTable::test_default()
    }

    #[test]
    fn checkout_completed_brings_instance_up() {
        let d = decide(BillingEventKind::CheckoutCompleted, &table());
        assert_eq!(d.subscription_state, "active");
        assert_eq!(d.desired_state, Some(DesiredState::Running));
    }

    #[test]
    fn cancellation_tears_instance_down() {
        let d = decide(BillingEventKind::SubscriptionCancelled, &table());
        assert_eq!(d.subscription_state, "cancelled");
        assert_eq!(d.desired_state, Some(DesiredState::Absent));
    }

    #[test]
    fn payment_failure_does_not_deprovision_immediately() {
        let d = decide(BillingEventKind::PaymentFailed, &table());
        assert_eq!(d.subscription_state, "past_due");
        assert_eq!(d.desired_state, None);
    }

    #[test]
    fn subscription_update_is_a_state_only_change() {
        let d = decide(BillingEventKind::SubscriptionUpdated, &table());
        assert_eq!(d.desired_state, None);
    }
}
