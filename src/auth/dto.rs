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

use crate::common::types::{Email, Password, ValueObject};
use crate::tenants::model::Tenant;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /auth/signup`: password-based signup (spec S1/S4.1). Both fields
/// validate themselves at deserialize time.
#[derive(Debug, Deserialize)]
pub(crate) struct SignupRequest {
    pub email: Email,
    pub password: ValueObject<Password>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    pub email: Email,
    pub password: String,
}

/// `POST /auth/federated`: a trusted upstream identity assertion. The
/// actual OAuth provider handshake is a dashboard/external-collaborator
/// concern, out of scope here (spec S1 non-goals) — this endpoint only
/// resolves (or provisions) the Tenant the assertion names.
#[derive(Debug, Deserialize)]
pub(crate) struct FederatedLoginRequest {
    pub email: Email,
    pub federated_id: String,
}

/// What a tenant sees about themselves once authenticated.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TenantPublic {
    pub id: Uuid,
    pub email: String,
    pub subscription_state: String,
}

impl From<Tenant> for TenantPublic {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: tenant.id,
            email: tenant.email,
            subscription_state: tenant.subscription_state,
        }
    }
}
