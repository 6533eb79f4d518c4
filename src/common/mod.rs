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

use crate::app::config::AppConfig;
use crate::app::database::{DatabaseMigrator, PoolProvider, Store};
use crate::instances::reconciler::{ReconcileHandle, spawn_reconciler};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    transport::smtp::{Error, authentication::Credentials, response::Response},
};
use sqlx::PgPool;
use std::sync::Arc;

pub(crate) mod dto;
pub(crate) mod error;
pub(crate) mod extractors;
pub(crate) mod macros;
pub(crate) mod services;
pub(crate) mod types;

pub trait ConfigProvider: Send + Sync {
    fn config(&self) -> Arc<AppConfig>;
}

#[async_trait]
pub trait MailTransporter: ConfigProvider + Send + Sync {
    async fn send(&self, message: Message) -> Result<Response, Error>;
}

/// Process-wide dependency bag: config, the Store's pool, and the mail
/// transport used for admin-alert notifications. Constructed once in
/// [`crate::app::init::init_default_app`] and handed to every module by
/// `Arc` reference — no global mutable registry (SPEC_FULL §9).
pub struct AppState<T>
where
    T: Send + Sync,
{
    pub config: Arc<AppConfig>,
    pub default_smtp_transport: Arc<T>,
    pub store: Arc<Store>,
    pub reconcile: ReconcileHandle,
}

pub type DefaultSmtpTransport = AsyncSmtpTransport<Tokio1Executor>;
pub type DefaultAppState = AppState<DefaultSmtpTransport>;

impl DefaultAppState {
    fn init_config() -> anyhow::Result<AppConfig> {
        Ok(AppConfig::from_env()?)
    }
    async fn init_store(config: Arc<AppConfig>) -> anyhow::Result<Store> {
        Ok(Store::new(config.store().database()).await?)
    }
    fn init_smtp_transport(config: Arc<AppConfig>) -> anyhow::Result<DefaultSmtpTransport> {
        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(config.mail().smtp_host())?
                .credentials(Credentials::new(
                    config.mail().smtp_user().to_owned(),
                    config.mail().smtp_passwd().to_owned(),
                ))
                .build(),
        )
    }
    pub async fn new() -> anyhow::Result<DefaultAppState> {
        let config = Arc::new(Self::init_config()?);
        let store = Arc::new(Self::init_store(config.clone()).await?);
        let reconcile = spawn_reconciler(store.clone(), config.clone());
        Ok(Self {
            config: config.clone(),
            default_smtp_transport: Arc::new(Self::init_smtp_transport(config.clone())?),
            store,
            reconcile,
        })
    }
}

impl<T> ConfigProvider for AppState<T>
where
    T: Send + Sync,
{
    fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }
}

#[async_trait]
impl MailTransporter for AppState<DefaultSmtpTransport> {
    async fn send(&self, message: Message) -> Result<Response, Error> {
        self.default_smtp_transport.send(message).await
    }
}

#[async_trait]
impl<T> DatabaseMigrator for AppState<T>
where
    T: Send + Sync,
{
    async fn migrate(&self) -> crate::common::error::RepositoryResult<()> {
        self.store.migrate().await
    }
}

impl<T> PoolProvider for AppState<T>
where
    T: Send + Sync,
{
    fn pool(&self) -> &PgPool {
        self.store.pool()
    }
}
