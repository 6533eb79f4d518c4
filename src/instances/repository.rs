use crate::app::database::{PoolProvider, Store};
use crate::common::error::{RepositoryError, RepositoryResult};
use crate::instances::model::{Instance, InstanceTransition, ObservedState};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::Error;
use uuid::Uuid;

/// The Store's coarse transactional API for the Instance entity (spec
/// §4.1). `reserve_instance` is the only write that can fail with
/// [`RepositoryError::SubdomainTaken`] or
/// [`RepositoryError::TenantHasActiveInstance`]; every state-mutating call
/// after that takes `expected_generation` and fails with
/// [`RepositoryError::StaleGeneration`] under concurrent writers, per the
/// optimistic-concurrency contract in §4.1.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstancesRepository: Send + Sync {
    async fn reserve_instance(
        &self,
        tenant_id: Uuid,
        subdomain: &str,
        target_image_ref: &str,
        data_volume_path: &str,
    ) -> RepositoryResult<Instance>;

    async fn load_by_id(&self, id: Uuid) -> RepositoryResult<Instance>;
    async fn load_by_subdomain(&self, subdomain: &str) -> RepositoryResult<Instance>;
    async fn load_by_tenant_id(&self, tenant_id: Uuid) -> RepositoryResult<Instance>;

    /// `UpdateDesiredState` (spec §4.1). Never touches `observed_state`;
    /// the Reconciler is the only writer of that column (spec §2).
    /// `delete_volume` is only meaningful alongside `new_desired = "absent"`
    /// (spec §6 deprovision `retain`); pass `None` from every other caller
    /// so the column is left unchanged.
    async fn update_desired_state(
        &self,
        instance_id: Uuid,
        expected_generation: i64,
        new_desired: &str,
        new_target_image_ref: Option<&str>,
        delete_volume: Option<bool>,
    ) -> RepositoryResult<Instance>;

    /// `RecordObserved` + `AppendTransition`, as a single transaction (spec
    /// §3 "every successful state transition writes ... to an append-only
    /// instance_transitions table"). `handle`/`addr` are the *new* values to
    /// store verbatim (`None` clears the column) — callers pass the prior
    /// value through unchanged when a transition doesn't touch it.
    #[allow(clippy::too_many_arguments)]
    async fn record_observed(
        &self,
        instance_id: Uuid,
        expected_generation: i64,
        new_observed: &ObservedState,
        handle: Option<&str>,
        addr: Option<&str>,
        reason: &str,
        new_generation: i64,
    ) -> RepositoryResult<Instance>;

    async fn list_instances(&self) -> RepositoryResult<Vec<Instance>>;
    async fn list_transitions(&self, instance_id: Uuid, limit: i64) -> RepositoryResult<Vec<InstanceTransition>>;

    /// Frees a subdomain reservation for reuse (spec §9 Open Question:
    /// subdomain release/reuse, resolved in DESIGN.md as this explicit,
    /// `absent`-only admin endpoint rather than an implicit side effect of
    /// deprovision).
    async fn release_subdomain(&self, instance_id: Uuid) -> RepositoryResult<Instance>;

    async fn update_secrets_envelope(&self, instance_id: Uuid, envelope: &[u8]) -> RepositoryResult<()>;

    /// Stashes an admin-supplied, already-sealed password/password-hash
    /// override for `begin_create` to consume (spec §9 Open Question 1).
    /// `kind` is `"password"` or `"password_hash"`.
    async fn set_pending_credential(
        &self,
        instance_id: Uuid,
        sealed: &[u8],
        kind: &str,
    ) -> RepositoryResult<()>;

    /// Clears the pending credential once `begin_create` has consumed it,
    /// so a later reprovision never reuses a stale override.
    async fn clear_pending_credential(&self, instance_id: Uuid, expected_generation: i64) -> RepositoryResult<()>;
}

fn classify_reserve_conflict(e: Error) -> RepositoryError {
    if let Error::Database(db_err) = &e {
        match db_err.constraint() {
            Some("instances_subdomain_unique") => return RepositoryError::SubdomainTaken,
            Some("instances_one_active_per_tenant") => {
                return RepositoryError::TenantHasActiveInstance;
            }
            _ => {}
        }
    }
    RepositoryError::Database(e)
}

fn not_found_or(e: Error) -> RepositoryError {
    match e {
        Error::RowNotFound => RepositoryError::NotFound,
        e => RepositoryError::Database(e),
    }
}

#[async_trait]
impl InstancesRepository for Store {
    async fn reserve_instance(
        &self,
        tenant_id: Uuid,
        subdomain: &str,
        target_image_ref: &str,
        data_volume_path: &str,
    ) -> RepositoryResult<Instance> {
        sqlx::query_as::<_, Instance>(
            "INSERT INTO instances (id, tenant_id, subdomain, desired_state, target_image_ref, data_volume_path)
             VALUES ($1, $2, $3, 'running', $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(subdomain)
        .bind(target_image_ref)
        .bind(data_volume_path)
        .fetch_one(self.pool())
        .await
        .map_err(classify_reserve_conflict)
    }

    async fn load_by_id(&self, id: Uuid) -> RepositoryResult<Instance> {
        sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE id = $1")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(not_found_or)
    }

    async fn load_by_subdomain(&self, subdomain: &str) -> RepositoryResult<Instance> {
        sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE subdomain = $1")
            .bind(subdomain)
            .fetch_one(self.pool())
            .await
            .map_err(not_found_or)
    }

    async fn load_by_tenant_id(&self, tenant_id: Uuid) -> RepositoryResult<Instance> {
        sqlx::query_as::<_, Instance>(
            "SELECT * FROM instances WHERE tenant_id = $1 AND desired_state <> 'absent'
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(tenant_id)
        .fetch_one(self.pool())
        .await
        .map_err(not_found_or)
    }

    async fn update_desired_state(
        &self,
        instance_id: Uuid,
        expected_generation: i64,
        new_desired: &str,
        new_target_image_ref: Option<&str>,
        delete_volume: Option<bool>,
    ) -> RepositoryResult<Instance> {
        let updated = sqlx::query_as::<_, Instance>(
            "UPDATE instances
             SET desired_state = $1,
                 target_image_ref = COALESCE($2, target_image_ref),
                 delete_volume_on_deprovision = COALESCE($5, delete_volume_on_deprovision),
                 updated_at = NOW()
             WHERE id = $3 AND generation = $4
             RETURNING *",
        )
        .bind(new_desired)
        .bind(new_target_image_ref)
        .bind(instance_id)
        .bind(expected_generation)
        .bind(delete_volume)
        .fetch_optional(self.pool())
        .await?;

        match updated {
            Some(instance) => Ok(instance),
            None => {
                let current = self.load_by_id(instance_id).await?;
                Err(RepositoryError::StaleGeneration {
                    expected: expected_generation,
                    actual: current.generation,
                })
            }
        }
    }

    async fn record_observed(
        &self,
        instance_id: Uuid,
        expected_generation: i64,
        new_observed: &ObservedState,
        handle: Option<&str>,
        addr: Option<&str>,
        reason: &str,
        new_generation: i64,
    ) -> RepositoryResult<Instance> {
        let mut tx = self.pool().begin().await?;

        let current = sqlx::query_as::<_, Instance>(
            "SELECT * FROM instances WHERE id = $1 FOR UPDATE",
        )
        .bind(instance_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if current.generation != expected_generation {
            return Err(RepositoryError::StaleGeneration {
                expected: expected_generation,
                actual: current.generation,
            });
        }

        let last_error = match new_observed {
            ObservedState::Failed { reason } => Some(reason.as_str()),
            _ => None,
        };

        let updated = sqlx::query_as::<_, Instance>(
            "UPDATE instances
             SET observed_state = $1,
                 last_error = $2,
                 runtime_handle = $3,
                 network_address = $4,
                 generation = $5,
                 last_transition_at = NOW(),
                 updated_at = NOW()
             WHERE id = $6
             RETURNING *",
        )
        .bind(new_observed.as_str())
        .bind(last_error)
        .bind(handle)
        .bind(addr)
        .bind(new_generation)
        .bind(instance_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO instance_transitions (instance_id, from_state, to_state, reason, generation)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(instance_id)
        .bind(&current.observed_state)
        .bind(new_observed.as_str())
        .bind(reason)
        .bind(new_generation)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn list_instances(&self) -> RepositoryResult<Vec<Instance>> {
        Ok(
            sqlx::query_as::<_, Instance>("SELECT * FROM instances ORDER BY created_at DESC")
                .fetch_all(self.pool())
                .await?,
        )
    }

    async fn list_transitions(
        &self,
        instance_id: Uuid,
        limit: i64,
    ) -> RepositoryResult<Vec<InstanceTransition>> {
        Ok(sqlx::query_as::<_, InstanceTransition>(
            "SELECT * FROM instance_transitions WHERE instance_id = $1 ORDER BY at DESC LIMIT $2",
        )
        .bind(instance_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }

    async fn release_subdomain(&self, instance_id: Uuid) -> RepositoryResult<Instance> {
        let tombstone = format!("rel{}", &instance_id.simple().to_string()[..24]);
        sqlx::query_as::<_, Instance>(
            "UPDATE instances SET subdomain = $1, updated_at = NOW()
             WHERE id = $2 AND desired_state = 'absent'
             RETURNING *",
        )
        .bind(tombstone)
        .bind(instance_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| {
            RepositoryError::InvalidInput(
                "instance must be deprovisioned (desired_state=absent) before its subdomain can be released"
                    .to_string(),
            )
        })
    }

    async fn update_secrets_envelope(&self, instance_id: Uuid, envelope: &[u8]) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE instances SET secrets_envelope = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(envelope)
        .bind(instance_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_pending_credential(
        &self,
        instance_id: Uuid,
        sealed: &[u8],
        kind: &str,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE instances
             SET pending_credential = $1, pending_credential_kind = $2, updated_at = NOW()
             WHERE id = $3",
        )
        .bind(sealed)
        .bind(kind)
        .bind(instance_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn clear_pending_credential(&self, instance_id: Uuid, expected_generation: i64) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE instances
             SET pending_credential = NULL, pending_credential_kind = NULL, updated_at = NOW()
             WHERE id = $1 AND generation = $2",
        )
        .bind(instance_id)
        .bind(expected_generation)
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
    fn release_subdomain_tombstone_matches_format_check() {
        let id = Uuid::new_v4();
        let tombstone = format!("rel{}", &id.simple().to_string()[..24]);
        assert_eq!(tombstone.len(), 27);
        assert!(tombstone.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
