/*
 * This file is part of the Obvia ERP.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::auth::dto::{FederatedLoginRequest, LoginRequest, SignupRequest, TenantPublic};
use crate::auth::extractors::{TenantSession, clear_session_cookie, session_cookie};
use crate::auth::service::AuthService;
use crate::common::DefaultAppState;
use crate::common::MailTransporter;
use crate::common::dto::{GeneralError, HandlerResult, SuccessResponseBuilder};
use crate::common::error::IntoFriendlyError;
use crate::common::extractors::ValidJson;
use crate::tenants::model::Tenant;
use crate::tenants::repository::TenantsRepository;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

async fn signed_in_response(
    app_state: &Arc<DefaultAppState>,
    jar: CookieJar,
    status: StatusCode,
    tenant: Tenant,
) -> HandlerResult<GeneralError> {
    let key = app_state.config().secrets().session_signing_key().to_owned();
    let jar = jar.add(session_cookie(tenant.id, key.as_bytes()));
    Ok((
        jar,
        SuccessResponseBuilder::new()
            .status_code(status)
            .data(TenantPublic::from(tenant))
            .build(),
    )
        .into_response())
}

pub async fn signup(
    State(app_state): State<Arc<DefaultAppState>>,
    jar: CookieJar,
    ValidJson(payload): ValidJson<SignupRequest>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn TenantsRepository>;
    match AuthService::signup(repo, payload).await {
        Ok(tenant) => signed_in_response(&app_state, jar, StatusCode::CREATED, tenant).await,
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn login(
    State(app_state): State<Arc<DefaultAppState>>,
    jar: CookieJar,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn TenantsRepository>;
    match AuthService::login(repo, payload).await {
        Ok(tenant) => signed_in_response(&app_state, jar, StatusCode::OK, tenant).await,
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn federated(
    State(app_state): State<Arc<DefaultAppState>>,
    jar: CookieJar,
    ValidJson(payload): ValidJson<FederatedLoginRequest>,
) -> HandlerResult<GeneralError> {
    let repo = app_state.store.clone() as Arc<dyn TenantsRepository>;
    match AuthService::federated_login(repo, payload).await {
        Ok(tenant) => signed_in_response(&app_state, jar, StatusCode::OK, tenant).await,
        Err(e) => Err(e
            .into_friendly_error(app_state.clone() as Arc<dyn MailTransporter>)
            .await),
    }
}

pub async fn logout(_session: TenantSession, jar: CookieJar) -> HandlerResult<GeneralError> {
    let jar = jar.remove(clear_session_cookie());
    Ok((jar, SuccessResponseBuilder::<GeneralError>::new().build()).into_response())
}
