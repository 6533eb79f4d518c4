use crate::common::DefaultAppState;
use crate::common::MailTransporter;
use crate::common::dto::{GeneralError, HandlerResult, SuccessResponseBuilder};
use crate::common::error::IntoFriendlyError;
use crate::common::extractors::ValidJson;
use crate::auth::extractors::{AdminToken, TenantSession};
use crate::instances::dto::{
    DeprovisionRequest, HealthView, InstanceAdminView, InstanceDetailView, MyInstanceView,
    ProvisionInstanceRequest, ReprovisionRequest, TransitionView,
};
use crate::instances::model::ObservedState;
use crate::instances::repository::InstancesRepository;
use crate::instances::secret_mint::SecretMint;
use crate::instances::service::InstancesService;
use crate::tenants::repository::TenantsRepository;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

pub async fn provision(
    State(app_state): State<Arc<DefaultAppState>>,
    _admin: AdminToken,
    ValidJson(payload): ValidJson<ProvisionInstanceRequest>,
) -> HandlerResult<GeneralError> {
    let tenants_repo = app_state.store.clone() as Arc<dyn TenantsRepository>;
    let instances_repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    let mint = app_state.reconcile.secret_mint();
    let default_image_ref = app_state.config().runtime().default_image_ref().to_owned();
    let data_root = app_state.config().secrets().data_root().to_owned();

    match InstancesService::provision(
        tenants_repo,
        instances_repo,
        mint,
        &app_state.reconcile,
        &default_image_ref,
        &data_root,
        payload,
    )
    .await
    {
        Ok(instance) => Ok(SuccessResponseBuilder::new()
            .status_code(StatusCode::CREATED)
            .data(InstanceAdminView::from(instance))
            .build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn list(
    State(app_state): State<Arc<DefaultAppState>>,
    _admin: AdminToken,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    match InstancesService::list_instances(repo).await {
        Ok(instances) => Ok(SuccessResponseBuilder::new()
            .data(
                instances
                    .into_iter()
                    .map(InstanceAdminView::from)
                    .collect::<Vec<_>>(),
            )
            .build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn get(
    State(app_state): State<Arc<DefaultAppState>>,
    _admin: AdminToken,
    Path(instance_id): Path<Uuid>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    match InstancesService::get_instance(repo, instance_id).await {
        Ok((instance, transitions)) => Ok(SuccessResponseBuilder::new()
            .data(InstanceDetailView {
                instance: InstanceAdminView::from(instance),
                recent_transitions: transitions.into_iter().map(TransitionView::from).collect(),
            })
            .build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn deprovision(
    State(app_state): State<Arc<DefaultAppState>>,
    _admin: AdminToken,
    Path(instance_id): Path<Uuid>,
    ValidJson(payload): ValidJson<DeprovisionRequest>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    match InstancesService::deprovision(repo, &app_state.reconcile, instance_id, payload).await {
        Ok(instance) => Ok(SuccessResponseBuilder::new()
            .data(InstanceAdminView::from(instance))
            .build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn reprovision(
    State(app_state): State<Arc<DefaultAppState>>,
    _admin: AdminToken,
    Path(instance_id): Path<Uuid>,
    ValidJson(payload): ValidJson<ReprovisionRequest>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    let default_image_ref = app_state.config().runtime().default_image_ref().to_owned();
    match InstancesService::reprovision(
        repo,
        &app_state.reconcile,
        instance_id,
        &default_image_ref,
        payload,
    )
    .await
    {
        Ok(instance) => Ok(SuccessResponseBuilder::new()
            .data(InstanceAdminView::from(instance))
            .build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn rotate_password(
    State(app_state): State<Arc<DefaultAppState>>,
    _admin: AdminToken,
    Path(instance_id): Path<Uuid>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    let mint = app_state.reconcile.secret_mint();
    match InstancesService::rotate_password(repo, mint, instance_id).await {
        Ok(response) => Ok(SuccessResponseBuilder::new().data(response).build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn release_subdomain(
    State(app_state): State<Arc<DefaultAppState>>,
    _admin: AdminToken,
    Path(instance_id): Path<Uuid>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    match InstancesService::release_subdomain(repo, instance_id).await {
        Ok(instance) => Ok(SuccessResponseBuilder::new()
            .data(InstanceAdminView::from(instance))
            .build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn my_instance(
    State(app_state): State<Arc<DefaultAppState>>,
    session: TenantSession,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    let root_domain = app_state.config().secrets().root_domain().to_owned();
    match InstancesService::my_instance(repo, session.tenant_id).await {
        Ok(instance) => Ok(SuccessResponseBuilder::new()
            .data(MyInstanceView::new(&instance, &root_domain))
            .build()),
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn my_instance_health(
    State(app_state): State<Arc<DefaultAppState>>,
    session: TenantSession,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    match InstancesService::my_instance(repo, session.tenant_id).await {
        Ok(instance) => {
            let status = crate::instances::model::CoarseStatus::from(
                &instance.observed().unwrap_or(ObservedState::Absent),
            );
            Ok(SuccessResponseBuilder::new()
                .data(HealthView { status })
                .build())
        }
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

/// `GET /me/instance/open` (spec §6): mints an SSO login token and 302s the
/// tenant's browser straight to their running instance. Not wrapped in the
/// usual `{"status":"success", ...}` envelope since a redirect has no body
/// worth enveloping.
pub async fn open_instance(
    State(app_state): State<Arc<DefaultAppState>>,
    session: TenantSession,
) -> Response {
    let repo = app_state.store.clone() as Arc<dyn InstancesRepository>;
    let mint = app_state.reconcile.secret_mint();
    let root_domain = app_state.config().secrets().root_domain().to_owned();
    match InstancesService::open_instance(repo, mint, session.tenant_id, &root_domain).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await
            .into_response(),
    }
}

/// `GET /sso/keys` (spec §6): unauthenticated JWKS-style endpoint instances
/// use to verify the login tokens minted by `open_instance`.
pub async fn sso_keys(State(app_state): State<Arc<DefaultAppState>>) -> Response {
    Json(app_state.reconcile.secret_mint().jwks()).into_response()
}
