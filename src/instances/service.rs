use crate::common::dto::GeneralError;
use crate::common::MailTransporter;
use crate::common::error::{FriendlyError, IntoFriendlyError, RepositoryError};
use crate::common::types::ValueObjectable;
use crate::instances::dto::{
    DeprovisionRequest, ProvisionInstanceRequest, ReprovisionRequest, RotatePasswordResponse,
};
use crate::instances::model::Instance;
use crate::instances::reconciler::ReconcileHandle;
use crate::instances::repository::InstancesRepository;
use crate::instances::secret_mint::{SecretMint, SecretMintError};
use crate::tenants::repository::TenantsRepository;
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::Level;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InstanceServiceError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Secret mint error: {0}")]
    SecretMint(#[from] SecretMintError),

    #[error("no tenant is registered with that email address")]
    TenantNotFound,

    #[error("this subdomain is already taken")]
    SubdomainTaken,

    #[error("this tenant already has a non-absent instance")]
    TenantHasActiveInstance,

    #[error("instance not found")]
    InstanceNotFound,

    #[error("stale generation, retry the request")]
    StaleGeneration,
}

#[async_trait]
impl IntoFriendlyError<GeneralError> for InstanceServiceError {
    async fn into_friendly_error(
        self,
        _mailer: Arc<dyn MailTransporter>,
    ) -> FriendlyError<GeneralError> {
        let body = GeneralError {
            message: self.to_string(),
        };
        match &self {
            Self::TenantNotFound | Self::InstanceNotFound => {
                FriendlyError::user_facing(Level::DEBUG, StatusCode::NOT_FOUND, file!(), body)
            }
            Self::SubdomainTaken | Self::TenantHasActiveInstance | Self::StaleGeneration => {
                FriendlyError::user_facing(Level::DEBUG, StatusCode::CONFLICT, file!(), body)
            }
            Self::Repository(e) if e.is_not_found() => {
                FriendlyError::user_facing(Level::DEBUG, StatusCode::NOT_FOUND, file!(), body)
            }
            Self::Repository(RepositoryError::InvalidInput(_)) => {
                FriendlyError::user_facing(Level::DEBUG, StatusCode::CONFLICT, file!(), body)
            }
            _ => FriendlyError::internal(file!(), body),
        }
    }
}

pub(crate) type InstanceServiceResult<T> = Result<T, InstanceServiceError>;

fn map_reserve_error(e: RepositoryError) -> InstanceServiceError {
    match e {
        RepositoryError::SubdomainTaken => InstanceServiceError::SubdomainTaken,
        RepositoryError::TenantHasActiveInstance => InstanceServiceError::TenantHasActiveInstance,
        e => InstanceServiceError::Repository(e),
    }
}

fn map_generation_error(e: RepositoryError) -> InstanceServiceError {
    match e {
        RepositoryError::StaleGeneration { .. } => InstanceServiceError::StaleGeneration,
        RepositoryError::NotFound => InstanceServiceError::InstanceNotFound,
        e => InstanceServiceError::Repository(e),
    }
}

/// Orchestrates writes to `desired_state`/secrets and enqueues a reconcile
/// pass — nothing here ever touches the Runtime or Proxy Adapter directly
/// (spec §9: "the request handler's job ends at 'record desired state and
/// enqueue'; all external side effects happen in the Reconciler").
pub(crate) struct InstancesService;

impl InstancesService {
    pub async fn provision(
        tenants_repo: Arc<dyn TenantsRepository>,
        instances_repo: Arc<dyn InstancesRepository>,
        mint: Arc<dyn SecretMint>,
        reconcile: &ReconcileHandle,
        default_image_ref: &str,
        data_root: &str,
        payload: ProvisionInstanceRequest,
    ) -> InstanceServiceResult<Instance> {
        crate::instances::secret_mint::reject_conflicting_password_env(
            payload.password.as_deref(),
            payload.password_hash.as_deref(),
        )?;

        let tenant = tenants_repo
            .get_tenant_by_email(payload.email.as_str())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    InstanceServiceError::TenantNotFound
                } else {
                    e.into()
                }
            })?;

        let subdomain = payload.subdomain.extract().get_value().clone();
        let data_volume_path = format!("{data_root}/{subdomain}");

        let instance = instances_repo
            .reserve_instance(tenant.id, &subdomain, default_image_ref, &data_volume_path)
            .await
            .map_err(map_reserve_error)?;

        if let Some(password) = payload.password.as_deref() {
            let sealed = mint.seal_credential(password)?;
            instances_repo
                .set_pending_credential(instance.id, &sealed, "password")
                .await?;
        } else if let Some(password_hash) = payload.password_hash.as_deref() {
            let sealed = mint.seal_credential(password_hash)?;
            instances_repo
                .set_pending_credential(instance.id, &sealed, "password_hash")
                .await?;
        }

        reconcile.enqueue(instance.id);
        Ok(instance)
    }

    pub async fn deprovision(
        repo: Arc<dyn InstancesRepository>,
        reconcile: &ReconcileHandle,
        instance_id: Uuid,
        payload: DeprovisionRequest,
    ) -> InstanceServiceResult<Instance> {
        let current = repo.load_by_id(instance_id).await.map_err(map_generation_error)?;
        let updated = repo
            .update_desired_state(
                instance_id,
                current.generation,
                "absent",
                None,
                Some(!payload.retain),
            )
            .await
            .map_err(map_generation_error)?;
        reconcile.enqueue(instance_id);
        Ok(updated)
    }

    /// Re-asserts `desired=running` with a (possibly unchanged) target
    /// image ref; the actual generation bump and container swap happen in
    /// the Reconciler once it observes the image-ref mismatch (spec §4.5).
    pub async fn reprovision(
        repo: Arc<dyn InstancesRepository>,
        reconcile: &ReconcileHandle,
        instance_id: Uuid,
        default_image_ref: &str,
        payload: ReprovisionRequest,
    ) -> InstanceServiceResult<Instance> {
        let current = repo.load_by_id(instance_id).await.map_err(map_generation_error)?;
        let target = payload.target_image_ref.as_deref().unwrap_or(default_image_ref);
        let updated = repo
            .update_desired_state(instance_id, current.generation, "running", Some(target), None)
            .await
            .map_err(map_generation_error)?;
        reconcile.enqueue(instance_id);
        Ok(updated)
    }

    /// Spec S8 "secret non-disclosure": the plaintext is handed back once
    /// to the admin caller here and never stored.
    pub async fn rotate_password(
        repo: Arc<dyn InstancesRepository>,
        mint: Arc<dyn SecretMint>,
        instance_id: Uuid,
    ) -> InstanceServiceResult<RotatePasswordResponse> {
        repo.load_by_id(instance_id).await.map_err(map_generation_error)?;
        let (password, envelope) = mint.rotate_password(instance_id).await?;
        repo.update_secrets_envelope(instance_id, &envelope)
            .await
            .map_err(map_generation_error)?;
        Ok(RotatePasswordResponse {
            password_once: password,
        })
    }

    pub async fn list_instances(
        repo: Arc<dyn InstancesRepository>,
    ) -> InstanceServiceResult<Vec<Instance>> {
        Ok(repo.list_instances().await?)
    }

    pub async fn get_instance(
        repo: Arc<dyn InstancesRepository>,
        instance_id: Uuid,
    ) -> InstanceServiceResult<(Instance, Vec<crate::instances::model::InstanceTransition>)> {
        let instance = repo.load_by_id(instance_id).await.map_err(map_generation_error)?;
        let transitions = repo.list_transitions(instance_id, 20).await?;
        Ok((instance, transitions))
    }

    pub async fn my_instance(
        repo: Arc<dyn InstancesRepository>,
        tenant_id: Uuid,
    ) -> InstanceServiceResult<Instance> {
        repo.load_by_tenant_id(tenant_id).await.map_err(|e| {
            if e.is_not_found() {
                InstanceServiceError::InstanceNotFound
            } else {
                e.into()
            }
        })
    }

    /// Spec §6 `GET /me/instance/open`: mints a short-lived SSO login
    /// token and hands back the URL the tenant's browser should be
    /// redirected to.
    pub async fn open_instance(
        repo: Arc<dyn InstancesRepository>,
        mint: Arc<dyn SecretMint>,
        tenant_id: Uuid,
        root_domain: &str,
    ) -> InstanceServiceResult<String> {
        let instance = Self::my_instance(repo, tenant_id).await?;
        let token = mint.mint_login_token(instance.id, tenant_id, &instance.subdomain, 300)?;
        Ok(format!(
            "https://{}.{root_domain}/sso?token={token}",
            instance.subdomain
        ))
    }

    /// Spec §9 Open Question resolution: an explicit admin action,
    /// distinct from deprovision, requiring `desired_state = absent`
    /// already (enforced by [`InstancesRepository::release_subdomain`]
    /// itself).
    pub async fn release_subdomain(
        repo: Arc<dyn InstancesRepository>,
        instance_id: Uuid,
    ) -> InstanceServiceResult<Instance> {
        repo.release_subdomain(instance_id).await.map_err(map_generation_error)
    }
}
