use crate::common::types::{Email, Subdomain, ValueObject};
use crate::instances::model::{CoarseStatus, Instance, InstanceTransition, ObservedState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /admin/instances` (spec §6). The target image ref is always the
/// runtime's configured default at provision time — an instance only ever
/// diverges from it via `ReprovisionRequest`.
#[derive(Debug, Deserialize)]
pub(crate) struct ProvisionInstanceRequest {
    pub email: Email,
    pub subdomain: ValueObject<Subdomain>,
    /// Pre-seeds the instance's `INSTANCE_PASSWORD` env at creation instead
    /// of letting the Secret Mint generate one. Mutually exclusive with
    /// `password_hash` (spec §9 Open Question 1) — setting both is
    /// rejected at the HTTP boundary, before the instance is even reserved.
    #[serde(default)]
    pub password: Option<String>,
    /// Pre-seeds `INSTANCE_PASSWORD_HASH` instead of a plaintext password.
    /// Mutually exclusive with `password`.
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// `POST /admin/instances/{id}/deprovision` (spec §6). `retain: false`
/// (the default) tells the Reconciler to delete `data_volume_path` after
/// the container and proxy rule are torn down; `retain: true` stops short
/// of that, leaving the volume in place for a later reprovision. Either
/// way the Instance row persists with `observed_state = absent` and the
/// subdomain reservation holds (S6).
#[derive(Debug, Deserialize)]
pub(crate) struct DeprovisionRequest {
    #[serde(default)]
    pub retain: bool,
}

/// `POST /admin/instances/{id}/reprovision` (spec §4.5 "image-ref
/// changed"). Omitting `target_image_ref` reprovisions onto the runtime's
/// configured default image.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct ReprovisionRequest {
    pub target_image_ref: Option<String>,
}

/// The admin-facing projection of an [`Instance`] row (spec §6 `GET
/// /admin/instances`, `GET /admin/instances/{id}`). Everything but the
/// encrypted secrets envelope, which is never serialized off `Instance` in
/// the first place.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct InstanceAdminView {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subdomain: String,
    pub desired_state: String,
    pub target_image_ref: String,
    pub observed_state: String,
    pub last_transition_at: chrono::DateTime<chrono::Utc>,
    pub last_error: Option<String>,
    pub runtime_handle: Option<String>,
    pub network_address: Option<String>,
    pub data_volume_path: String,
    pub generation: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Instance> for InstanceAdminView {
    fn from(instance: Instance) -> Self {
        Self {
            id: instance.id,
            tenant_id: instance.tenant_id,
            subdomain: instance.subdomain,
            desired_state: instance.desired_state,
            target_image_ref: instance.target_image_ref,
            observed_state: instance.observed_state,
            last_transition_at: instance.last_transition_at,
            last_error: instance.last_error,
            runtime_handle: instance.runtime_handle,
            network_address: instance.network_address,
            data_volume_path: instance.data_volume_path,
            generation: instance.generation,
            created_at: instance.created_at,
            updated_at: instance.updated_at,
        }
    }
}

/// One row of `GET /admin/instances/{id}`'s transition history.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TransitionView {
    pub from_state: String,
    pub to_state: String,
    pub reason: String,
    pub generation: i64,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl From<InstanceTransition> for TransitionView {
    fn from(t: InstanceTransition) -> Self {
        Self {
            from_state: t.from_state,
            to_state: t.to_state,
            reason: t.reason,
            generation: t.generation,
            at: t.at,
        }
    }
}

/// `GET /admin/instances/{id}`: the detail view adds the last 20
/// transitions to the admin projection (spec §6, "AppendTransition" audit
/// trail surfaced to the admin UI).
#[derive(Debug, Clone, Serialize)]
pub(crate) struct InstanceDetailView {
    #[serde(flatten)]
    pub instance: InstanceAdminView,
    pub recent_transitions: Vec<TransitionView>,
}

/// `GET /me/instance` (spec §6, §7 "tenant endpoints expose only coarse
/// status"). No `observed_state`, no `last_error`, no `runtime_handle`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MyInstanceView {
    pub subdomain: String,
    pub status: CoarseStatus,
    pub url: String,
}

impl MyInstanceView {
    pub fn new(instance: &Instance, root_domain: &str) -> Self {
        let status = CoarseStatus::from(&instance.observed().unwrap_or(ObservedState::Absent));
        Self {
            subdomain: instance.subdomain.clone(),
            status,
            url: format!("https://{}.{root_domain}", instance.subdomain),
        }
    }
}

/// `GET /me/instance/health`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct HealthView {
    pub status: CoarseStatus,
}

/// `POST /admin/instances/{id}/rotate-password` (spec S8 "secret
/// non-disclosure": the plaintext is returned exactly once and never
/// persisted anywhere).
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RotatePasswordResponse {
    pub password_once: String,
}
