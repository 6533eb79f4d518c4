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
use crate::app::config::BasicDatabaseConfig;
use crate::common::error::RepositoryError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Single shared connection pool of record. The teacher's `PgPoolManager`
/// keeps one pool per tenant database; this system provisions a container
/// per tenant instead of a database per tenant, so every row — tenants,
/// instances, transitions, billing events — lives in one schema behind one
/// pool (see DESIGN.md "Store simplification").
#[cfg_attr(test, automock)]
pub trait PoolProvider: Send + Sync {
    fn pool(&self) -> &PgPool;
}

pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn new(config: &BasicDatabaseConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_pool_size.unwrap_or(5))
            .acquire_timeout(Duration::from_secs(10))
            .connect(&sqlx_url(config))
            .await?;
        Ok(Self { pool })
    }
}

fn sqlx_url(config: &BasicDatabaseConfig) -> String {
    format!(
        "postgresql://{}:{}@{}:{}/{}",
        config.username, config.password, config.host, config.port, config.database
    )
}

impl PoolProvider for Store {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatabaseMigrator: Send + Sync {
    async fn migrate(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
impl DatabaseMigrator for Store {
    async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}
