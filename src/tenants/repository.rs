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

use crate::app::database::{PoolProvider, Store};
use crate::common::error::{RepositoryError, RepositoryResult};
use crate::tenants::model::Tenant;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::Error;
use uuid::Uuid;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantsRepository: Send + Sync {
    /// `CreateTenant(email, auth) -> Tenant | AlreadyExists` (spec S4.1).
    /// Exactly one of `password_hash`/`federated_id` must be set; the
    /// `tenants_auth_method_check` constraint is the backstop, the caller
    /// (auth::service) is expected to have already enforced it.
    async fn create_tenant(
        &self,
        email: &str,
        password_hash: Option<&str>,
        federated_id: Option<&str>,
    ) -> RepositoryResult<Tenant>;

    async fn get_tenant_by_email(&self, email: &str) -> RepositoryResult<Tenant>;

    async fn get_tenant_by_federated_id(&self, federated_id: &str) -> RepositoryResult<Tenant>;

    async fn get_tenant_by_id(&self, id: Uuid) -> RepositoryResult<Tenant>;

    async fn update_billing_link(
        &self,
        tenant_id: Uuid,
        external_customer_id: Option<&str>,
        external_subscription_id: Option<&str>,
        subscription_state: &str,
    ) -> RepositoryResult<Tenant>;

    async fn get_tenant_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> RepositoryResult<Tenant>;

    async fn anonymize_tenant(&self, id: Uuid) -> RepositoryResult<()>;
}

#[async_trait]
impl TenantsRepository for Store {
    async fn create_tenant(
        &self,
        email: &str,
        password_hash: Option<&str>,
        federated_id: Option<&str>,
    ) -> RepositoryResult<Tenant> {
        Ok(sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (id, email, password_hash, federated_id)
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(email.to_lowercase())
        .bind(password_hash)
        .bind(federated_id)
        .fetch_one(self.pool())
        .await?)
    }

    async fn get_tenant_by_email(&self, email: &str) -> RepositoryResult<Tenant> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE email = $1")
            .bind(email.to_lowercase())
            .fetch_one(self.pool())
            .await
            .map_err(|e| match e {
                Error::RowNotFound => RepositoryError::NotFound,
                e => RepositoryError::Database(e),
            })
    }

    async fn get_tenant_by_federated_id(&self, federated_id: &str) -> RepositoryResult<Tenant> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE federated_id = $1")
            .bind(federated_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| match e {
                Error::RowNotFound => RepositoryError::NotFound,
                e => RepositoryError::Database(e),
            })
    }

    async fn get_tenant_by_id(&self, id: Uuid) -> RepositoryResult<Tenant> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| match e {
                Error::RowNotFound => RepositoryError::NotFound,
                e => RepositoryError::Database(e),
            })
    }

    async fn update_billing_link(
        &self,
        tenant_id: Uuid,
        external_customer_id: Option<&str>,
        external_subscription_id: Option<&str>,
        subscription_state: &str,
    ) -> RepositoryResult<Tenant> {
        sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET external_customer_id = COALESCE($1, external_customer_id),
                external_subscription_id = COALESCE($2, external_subscription_id),
                subscription_state = $3,
                updated_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(external_customer_id)
        .bind(external_subscription_id)
        .bind(subscription_state)
        .bind(tenant_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match e {
            Error::RowNotFound => RepositoryError::NotFound,
            e => RepositoryError::Database(e),
        })
    }

    async fn get_tenant_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> RepositoryResult<Tenant> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE external_customer_id = $1")
            .bind(external_customer_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| match e {
                Error::RowNotFound => RepositoryError::NotFound,
                e => RepositoryError::Database(e),
            })
    }

    async fn anonymize_tenant(&self, id: Uuid) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET email = 'anonymized-' || id || '@deleted.invalid',
                password_hash = NULL,
                federated_id = NULL,
                anonymized_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND anonymized_at IS NULL
            "#,
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_state_round_trips() {
        use crate::tenants::model::SubscriptionState;
        use std::str::FromStr;
        for s in ["none", "trialing", "active", "past_due", "cancelled"] {
            assert_eq!(SubscriptionState::from_str(s).unwrap().as_str(), s);
        }
        assert!(SubscriptionState::from_str("bogus").is_err());
    }
}
