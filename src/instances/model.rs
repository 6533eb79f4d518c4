use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What the caller of [`crate::instances::repository::InstancesRepository::update_desired_state`]
/// wants the Reconciler to converge the container toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Absent,
    Running,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Absent => "absent",
            DesiredState::Running => "running",
        }
    }
}

impl FromStr for DesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absent" => Ok(DesiredState::Absent),
            "running" => Ok(DesiredState::Running),
            other => Err(format!("unknown desired_state: {other}")),
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The Reconciler's own view of reality, as committed by
/// [`crate::instances::repository::InstancesRepository::record_observed`].
/// Nothing outside the Reconciler writes this field (spec §2 control flow).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ObservedState {
    Absent,
    Creating,
    Starting,
    Healthy,
    Unhealthy,
    Stopping,
    Failed { reason: String },
}

impl ObservedState {
    /// The bare state name, as stored in the `observed_state` column; the
    /// `Failed` reason lives in the sibling `last_error` column instead, so
    /// the check constraint in `0001_init.sql` only ever sees one of the
    /// seven names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservedState::Absent => "absent",
            ObservedState::Creating => "creating",
            ObservedState::Starting => "starting",
            ObservedState::Healthy => "healthy",
            ObservedState::Unhealthy => "unhealthy",
            ObservedState::Stopping => "stopping",
            ObservedState::Failed { .. } => "failed",
        }
    }

    pub fn from_db(state: &str, last_error: Option<&str>) -> Result<Self, String> {
        match state {
            "absent" => Ok(ObservedState::Absent),
            "creating" => Ok(ObservedState::Creating),
            "starting" => Ok(ObservedState::Starting),
            "healthy" => Ok(ObservedState::Healthy),
            "unhealthy" => Ok(ObservedState::Unhealthy),
            "stopping" => Ok(ObservedState::Stopping),
            "failed" => Ok(ObservedState::Failed {
                reason: last_error.unwrap_or("unknown").to_string(),
            }),
            other => Err(format!("unknown observed_state: {other}")),
        }
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ObservedState::Failed { .. })
    }

    pub fn is_non_absent(&self) -> bool {
        !matches!(self, ObservedState::Absent)
    }
}

/// The coarse tenant-facing projection of [`ObservedState`] (spec §7
/// propagation policy: "tenant endpoints expose only coarse status").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseStatus {
    Absent,
    Provisioning,
    Healthy,
    Unhealthy,
}

impl From<&ObservedState> for CoarseStatus {
    fn from(observed: &ObservedState) -> Self {
        match observed {
            ObservedState::Absent => CoarseStatus::Absent,
            ObservedState::Creating | ObservedState::Starting | ObservedState::Stopping => {
                CoarseStatus::Provisioning
            }
            ObservedState::Healthy => CoarseStatus::Healthy,
            ObservedState::Unhealthy | ObservedState::Failed { .. } => CoarseStatus::Unhealthy,
        }
    }
}

/// A per-tenant isolated workload: one container, one volume, one virtual
/// host (spec GLOSSARY). `generation` fences stale containers (§4.5
/// "generation-as-fence"); `data_volume_path` is derived from `subdomain`
/// alone so it survives arbitrarily many reprovisions (§4.5 "volume
/// invariance").
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Instance {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subdomain: String,
    pub desired_state: String,
    pub target_image_ref: String,
    pub observed_state: String,
    pub last_transition_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub runtime_handle: Option<String>,
    pub network_address: Option<String>,
    #[serde(skip)]
    pub secrets_envelope: Option<Vec<u8>>,
    pub data_volume_path: String,
    /// Set by [`crate::instances::service::InstancesService::deprovision`]
    /// when the caller passes `retain: false` (spec §6); consumed once, by
    /// the Reconciler's `begin_deprovision`, which deletes
    /// `data_volume_path` after the container is removed and clears the
    /// flag in the same transition so a later reprovision never re-deletes
    /// the fresh volume it creates.
    pub delete_volume_on_deprovision: bool,
    /// An admin-supplied password or password-hash override, sealed with
    /// the Secret Mint's envelope key at provision time and consumed once
    /// by the Reconciler's `begin_create` (spec §9 Open Question 1: "which
    /// wins when both are set", resolved as "reject both" at the point the
    /// request is accepted, see [`crate::instances::secret_mint::reject_conflicting_password_env`]).
    /// `None` once consumed, or when the instance was provisioned without
    /// either.
    #[serde(skip)]
    pub pending_credential: Option<Vec<u8>>,
    #[serde(skip)]
    pub pending_credential_kind: Option<String>,
    pub generation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn desired(&self) -> DesiredState {
        self.desired_state
            .parse()
            .unwrap_or(DesiredState::Absent)
    }

    pub fn observed(&self) -> Result<ObservedState, String> {
        ObservedState::from_db(&self.observed_state, self.last_error.as_deref())
    }

    /// The name that doubles as the container-runtime lock (spec §9
    /// "shared docker name as a lock").
    pub fn container_name(&self, product_name: &str) -> String {
        format!("{product_name}-{}", self.subdomain)
    }
}

/// One row of the append-only audit trail every successful transition
/// writes in the same transaction as the `RecordObserved` call (spec §3
/// "Relationships & invariants").
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InstanceTransition {
    pub id: i64,
    pub instance_id: Uuid,
    pub from_state: String,
    pub to_state: String,
    pub reason: String,
    pub generation: i64,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_state_round_trips_non_failed() {
        for s in ["absent", "creating", "starting", "healthy", "unhealthy", "stopping"] {
            let observed = ObservedState::from_db(s, None).unwrap();
            assert_eq!(observed.as_str(), s);
        }
    }

    #[test]
    fn observed_state_failed_carries_reason_out_of_band() {
        let observed = ObservedState::from_db("failed", Some("image pull denied")).unwrap();
        assert_eq!(observed.as_str(), "failed");
        match observed {
            ObservedState::Failed { reason } => assert_eq!(reason, "image pull denied"),
            _ => panic!("expected Failed"),
        }
    }

    #[test]
    fn coarse_status_collapses_transitional_states() {
        assert_eq!(CoarseStatus::from(&ObservedState::Creating), CoarseStatus::Provisioning);
        assert_eq!(CoarseStatus::from(&ObservedState::Starting), CoarseStatus::Provisioning);
        assert_eq!(CoarseStatus::from(&ObservedState::Stopping), CoarseStatus::Provisioning);
        assert_eq!(
            CoarseStatus::from(&ObservedState::Failed { reason: "x".into() }),
            CoarseStatus::Unhealthy
        );
    }

    #[test]
    fn container_name_follows_product_subdomain_convention() {
        let instance = Instance {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            subdomain: "acme".to_string(),
            desired_state: "running".to_string(),
            target_image_ref: "img".to_string(),
            observed_state: "healthy".to_string(),
            last_transition_at: Utc::now(),
            last_error: None,
            runtime_handle: Some("abc123".to_string()),
            network_address: None,
            secrets_envelope: None,
            data_volume_path: "/data/acme".to_string(),
            delete_volume_on_deprovision: false,
            pending_credential: None,
            pending_credential_kind: None,
            generation: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(instance.container_name("instancectl"), "instancectl-acme");
    }
}
