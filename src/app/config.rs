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
use serde::Deserialize;
use sqlx::postgres::PgSslMode;
use std::fmt::Display;
use std::str::FromStr;

/// Top-level, env/file-layered configuration. Every required key listed in
/// §6 of the instance-controller specification is a field somewhere below;
/// the process refuses to start if any of them is missing (see
/// [`AppConfig::from_env`] and each section's `*Builder::build`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    server: ServerConfig,
    store: StoreConfig,
    runtime: RuntimeConfig,
    proxy: ProxyConfig,
    secrets: SecretsConfig,
    billing: BillingConfig,
    admin: AdminConfig,
    mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

/// A generic database connection configuration. Kept generic over field
/// types the way the teacher's config layer does, even though this crate
/// only ever instantiates it as [`BasicDatabaseConfig`] now that there is
/// one store, not one pool per tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig<HostType, PortType, UserType, PasswordType, DatabaseType, MaxPoolSizeType>
{
    pub host: HostType,
    pub port: PortType,
    pub username: UserType,
    pub password: PasswordType,
    pub database: DatabaseType,
    pub max_pool_size: Option<MaxPoolSizeType>,
    pub ssl_mode: Option<String>,
}

pub type BasicDatabaseConfig = DatabaseConfig<String, u16, String, String, String, u32>;

pub trait DatabaseUrlProvider {
    fn url(&self) -> String;
}

pub trait DatabasePoolSizeProvider {
    type MaxPoolSizeType;
    fn max_pool_size(&self) -> Self::MaxPoolSizeType;
}

pub trait DatabasePgSslModeProvider {
    fn pg_ssl_mode(&self) -> Result<PgSslMode, String>;
}

impl<H, P, U, W, D, M> DatabasePgSslModeProvider for DatabaseConfig<H, P, U, W, D, M> {
    fn pg_ssl_mode(&self) -> Result<PgSslMode, String> {
        match &self.ssl_mode {
            Some(mode) => PgSslMode::from_str(mode).map_err(|_| "invalid ssl_mode".to_string()),
            None => Ok(PgSslMode::VerifyFull),
        }
    }
}

impl<H, P, U, W, D> DatabasePoolSizeProvider for DatabaseConfig<H, P, U, W, D, u32> {
    type MaxPoolSizeType = u32;

    fn max_pool_size(&self) -> u32 {
        self.max_pool_size.unwrap_or(5) // TODO: read global default from cfg!
    }
}

impl<H, P, U, W, D, M> DatabaseUrlProvider for DatabaseConfig<H, P, U, W, D, M>
where
    H: Display,
    P: Display,
    U: Display,
    W: Display,
    D: Display,
{
    fn url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    database: BasicDatabaseConfig,
}

/// The reverse-proxy publication strategy (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    Label,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    mode: ProxyMode,
    network: String,
    /// Only meaningful when `mode == File`; the fragment directory the
    /// adapter writes to and the reload signal reads from.
    file_output_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    endpoint: String,
    default_image_ref: String,
    product_name: String,
    publish_ports: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    envelope_key: String,
    sso_signing_key: String,
    session_signing_key: String,
    data_root: String,
    root_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    webhook_secret: String,
    policy: BillingPolicyTable,
}

/// One row of the billing → lifecycle mapping (spec §9 Open Question 3):
/// what subscription_state to record and, optionally, what desired_state
/// to push onto the tenant's instance. `desired_state: None` means "leave
/// the instance alone".
#[derive(Debug, Clone, Deserialize)]
pub struct BillingPolicyEntry {
    pub subscription_state: String,
    pub desired_state: Option<String>,
}

/// The full billing-event-kind → [`BillingPolicyEntry`] table, read from
/// `[billing.policy.*]` so the mapping can be changed without touching
/// `billing::policy::decide` or the Reconciler at all.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingPolicyTable {
    checkout_completed: BillingPolicyEntry,
    subscription_updated: BillingPolicyEntry,
    subscription_cancelled: BillingPolicyEntry,
    payment_failed: BillingPolicyEntry,
}

impl BillingPolicyTable {
    pub fn checkout_completed(&self) -> &BillingPolicyEntry {
        &self.checkout_completed
    }
    pub fn subscription_updated(&self) -> &BillingPolicyEntry {
        &self.subscription_updated
    }
    pub fn subscription_cancelled(&self) -> &BillingPolicyEntry {
        &self.subscription_cancelled
    }
    pub fn payment_failed(&self) -> &BillingPolicyEntry {
        &self.payment_failed
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    smtp_host: String,
    smtp_user: String,
    smtp_passwd: String,
    default_from: String,
    default_from_name: String,
    default_notification_email: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(true))
            .add_source(config::Environment::default().separator("__"));
        builder.build()?.try_deserialize()
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }
    pub fn store(&self) -> &StoreConfig {
        &self.store
    }
    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }
    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }
    pub fn secrets(&self) -> &SecretsConfig {
        &self.secrets
    }
    pub fn billing(&self) -> &BillingConfig {
        &self.billing
    }
    pub fn admin(&self) -> &AdminConfig {
        &self.admin
    }
    pub fn mail(&self) -> &MailConfig {
        &self.mail
    }
}

impl ServerConfig {
    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl StoreConfig {
    pub fn database(&self) -> &BasicDatabaseConfig {
        &self.database
    }
}

impl ProxyConfig {
    pub fn mode(&self) -> ProxyMode {
        self.mode
    }
    pub fn network(&self) -> &str {
        &self.network
    }
    pub fn file_output_dir(&self) -> Option<&str> {
        self.file_output_dir.as_deref()
    }
}

impl RuntimeConfig {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
    pub fn default_image_ref(&self) -> &str {
        &self.default_image_ref
    }
    /// The `<product>` half of the `<product>-<subdomain>` container name.
    pub fn product_name(&self) -> &str {
        &self.product_name
    }
    pub fn publish_ports(&self) -> bool {
        self.publish_ports
    }
}

impl SecretsConfig {
    pub fn envelope_key(&self) -> &str {
        &self.envelope_key
    }
    pub fn sso_signing_key(&self) -> &str {
        &self.sso_signing_key
    }
    /// Key backing the tenant session cookie's HMAC signature (`auth::extractors`).
    pub fn session_signing_key(&self) -> &str {
        &self.session_signing_key
    }
    pub fn data_root(&self) -> &str {
        &self.data_root
    }
    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }
}

impl BillingConfig {
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }
    pub fn policy(&self) -> &BillingPolicyTable {
        &self.policy
    }
}

impl AdminConfig {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl MailConfig {
    pub fn smtp_host(&self) -> &str {
        &self.smtp_host
    }
    pub fn smtp_user(&self) -> &str {
        &self.smtp_user
    }
    pub fn smtp_passwd(&self) -> &str {
        &self.smtp_passwd
    }
    pub fn default_from(&self) -> &str {
        &self.default_from
    }
    pub fn default_from_name(&self) -> &str {
        &self.default_from_name
    }
    pub fn default_notification_email(&self) -> &str {
        &self.default_notification_email
    }
}

#[cfg(test)]
mod test_defaults {
    use super::*;

    impl Default for AppConfig {
        fn default() -> Self {
            Self {
                server: ServerConfig {
                    host: "127.0.0.1".to_string(),
                    port: 8080,
                },
                store: StoreConfig {
                    database: BasicDatabaseConfig {
                        host: "localhost".to_string(),
                        port: 5432,
                        username: "postgres".to_string(),
                        password: "postgres".to_string(),
                        database: "instancectl_test".to_string(),
                        max_pool_size: Some(5),
                        ssl_mode: Some("disable".to_string()),
                    },
                },
                runtime: RuntimeConfig {
                    endpoint: "unix:///var/run/docker.sock".to_string(),
                    default_image_ref: "registry.example.com/app:latest".to_string(),
                    product_name: "instancectl".to_string(),
                    publish_ports: false,
                },
                proxy: ProxyConfig {
                    mode: ProxyMode::Label,
                    network: "instancectl-proxy".to_string(),
                    file_output_dir: None,
                },
                secrets: SecretsConfig {
                    envelope_key: "0".repeat(64),
                    sso_signing_key: "test-sso-signing-key".to_string(),
                    session_signing_key: "0".repeat(64),
                    data_root: "/var/lib/instancectl/data".to_string(),
                    root_domain: "example.test".to_string(),
                },
                billing: BillingConfig {
                    webhook_secret: "test-webhook-secret".to_string(),
                    policy: BillingPolicyTable::test_default(),
                },
                admin: AdminConfig {
                    token: "test-admin-token".to_string(),
                },
                mail: MailConfig {
                    smtp_host: "localhost".to_string(),
                    smtp_user: "test".to_string(),
                    smtp_passwd: "test".to_string(),
                    default_from: "noreply@example.test".to_string(),
                    default_from_name: "instancectl".to_string(),
                    default_notification_email: "admin@example.test".to_string(),
                },
            }
        }
    }

    impl BillingPolicyTable {
        /// Mirrors `config/default.toml`'s `[billing.policy.*]` so tests
        /// exercising [`crate::billing::policy::decide`] don't need a real
        /// `config::Config` source.
        pub fn test_default() -> Self {
            Self {
                checkout_completed: BillingPolicyEntry {
                    subscription_state: "active".to_string(),
                    desired_state: Some("running".to_string()),
                },
                subscription_updated: BillingPolicyEntry {
                    subscription_state: "active".to_string(),
                    desired_state: None,
                },
                subscription_cancelled: BillingPolicyEntry {
                    subscription_state: "cancelled".to_string(),
                    desired_state: Some("absent".to_string()),
                },
                payment_failed: BillingPolicyEntry {
                    subscription_state: "past_due".to_string(),
                    desired_state: None,
                },
            }
        }
    }

    #[test]
    fn default_config_builds() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server().port(), 8080);
        assert_eq!(cfg.proxy().mode(), ProxyMode::Label);
    }
}
