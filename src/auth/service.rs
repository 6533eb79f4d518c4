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

use crate::auth::dto::{FederatedLoginRequest, LoginRequest, SignupRequest};
use crate::common::dto::GeneralError;
use crate::common::MailTransporter;
use crate::common::error::{FriendlyError, IntoFriendlyError, RepositoryError};
use crate::common::types::ValueObjectable;
use crate::tenants::model::Tenant;
use crate::tenants::repository::TenantsRepository;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::Level;

#[derive(Debug, Error)]
pub enum AuthServiceError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("this email address is already registered")]
    TenantExists,

    #[error("this account was removed")]
    TenantAnonymized,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

#[async_trait]
impl IntoFriendlyError<GeneralError> for AuthServiceError {
    async fn into_friendly_error(
        self,
        _mailer: Arc<dyn MailTransporter>,
    ) -> FriendlyError<GeneralError> {
        match self {
            Self::InvalidCredentials | Self::TenantExists | Self::TenantAnonymized => {
                FriendlyError::user_facing(
                    Level::DEBUG,
                    StatusCode::UNPROCESSABLE_ENTITY,
                    file!(),
                    GeneralError {
                        message: self.to_string(),
                    },
                )
            }
            other => FriendlyError::internal(
                file!(),
                GeneralError {
                    message: other.to_string(),
                },
            ),
        }
    }
}

pub(crate) type AuthServiceResult<T> = Result<T, AuthServiceError>;

/// Signup/login/federated-login against the Tenant table — there is no
/// separate Users table, the Tenant *is* the auth-bearing identity (spec
/// S4.1). Email verification, password reset, and OTP are out of scope.
pub(crate) struct AuthService;

impl AuthService {
    pub async fn signup(
        repo: Arc<dyn TenantsRepository>,
        payload: SignupRequest,
    ) -> AuthServiceResult<Tenant> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(
                payload.password.extract().get_value().as_bytes(),
                &salt,
            )
            .map(|hash| hash.to_string())
            .map_err(|e| AuthServiceError::Hash(e.to_string()))?;

        repo.create_tenant(payload.email.as_str(), Some(&password_hash), None)
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    AuthServiceError::TenantExists
                } else {
                    e.into()
                }
            })
    }

    pub async fn login(
        repo: Arc<dyn TenantsRepository>,
        payload: LoginRequest,
    ) -> AuthServiceResult<Tenant> {
        let tenant = repo
            .get_tenant_by_email(payload.email.as_str())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AuthServiceError::InvalidCredentials
                } else {
                    e.into()
                }
            })?;

        if tenant.is_anonymized() {
            return Err(AuthServiceError::TenantAnonymized);
        }

        let stored_hash = tenant
            .password_hash
            .as_deref()
            .ok_or(AuthServiceError::InvalidCredentials)?;
        let parsed_hash = PasswordHash::new(stored_hash)
            .map_err(|e| AuthServiceError::Hash(e.to_string()))?;

        Argon2::default()
            .verify_password(payload.password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthServiceError::InvalidCredentials)?;

        Ok(tenant)
    }

    /// Resolves (provisioning on first sight) the tenant named by a trusted
    /// upstream identity assertion. The assertion itself is taken as given —
    /// verifying it against the identity provider is a dashboard concern.
    pub async fn federated_login(
        repo: Arc<dyn TenantsRepository>,
        payload: FederatedLoginRequest,
    ) -> AuthServiceResult<Tenant> {
        match repo.get_tenant_by_federated_id(&payload.federated_id).await {
            Ok(tenant) if tenant.is_anonymized() => Err(AuthServiceError::TenantAnonymized),
            Ok(tenant) => Ok(tenant),
            Err(e) if e.is_not_found() => {
                match repo
                    .create_tenant(payload.email.as_str(), None, Some(&payload.federated_id))
                    .await
                {
                    Ok(tenant) => Ok(tenant),
                    Err(e) if e.is_unique_violation() => Err(AuthServiceError::TenantExists),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

