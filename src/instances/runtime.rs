use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::secret::ContainerStateStatusEnum;
use std::collections::HashMap;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;
use thiserror::Error;

/// Everything [`RuntimeAdapter::create`] needs to name, label, mount and
/// network-attach a container (spec §4.2).
pub struct ContainerSpec {
    pub name: String,
    /// The `<product>` half of `name` (`<product>-<subdomain>`), also
    /// stamped into the `product` label so a label-selector query matches
    /// the same operator-configured value the name was built from.
    pub product_name: String,
    pub image_ref: String,
    pub subdomain: String,
    pub generation: i64,
    pub env: Vec<(String, String)>,
    pub data_volume_path: String,
    pub container_data_path: String,
    pub network: String,
    pub publish_port: Option<u16>,
}

/// An opaque container id. Never constructed except by `Create` or
/// `ListByLabel`, matching the spec's "opaque container-id" framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle(pub String);

impl ContainerHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Restarting,
    Exited,
    Dead,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Inspection {
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub started_at: Option<String>,
    pub labels: HashMap<String, String>,
}

/// Runtime errors classified per spec §7: transient errors are retried by
/// the Reconciler with backoff, permanent errors surface immediately, and
/// a name conflict is treated as an adoption candidate rather than a
/// failure outright (spec §4.5 "naming-as-lock").
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("transient runtime error: {0}")]
    Transient(String),
    #[error("permanent runtime error: {0}")]
    Permanent(String),
    #[error("container name already in use: {0}")]
    NameConflict(String),
    #[error("container not found: {0}")]
    NotFound(String),
}

impl RuntimeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::Transient(_))
    }
    pub fn is_conflict(&self) -> bool {
        matches!(self, RuntimeError::NameConflict(_))
    }
}

fn classify(e: BollardError) -> RuntimeError {
    match &e {
        BollardError::DockerResponseServerError { status_code, message } => {
            match *status_code {
                409 => RuntimeError::NameConflict(message.clone()),
                404 => RuntimeError::NotFound(message.clone()),
                500..=599 => RuntimeError::Transient(message.clone()),
                _ => RuntimeError::Permanent(message.clone()),
            }
        }
        BollardError::RequestTimeoutError | BollardError::HyperResponseError { .. } => {
            RuntimeError::Transient(e.to_string())
        }
        other => RuntimeError::Permanent(other.to_string()),
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Thin facade over the container engine (spec §4.2). Implemented against
/// `bollard`'s async Docker Engine API client; every fallible call goes
/// through [`classify`] so the Reconciler never has to pattern-match on a
/// `bollard` error type directly.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerHandle>;
    async fn start(&self, handle: &ContainerHandle) -> RuntimeResult<()>;
    async fn stop(&self, handle: &ContainerHandle, grace: Duration) -> RuntimeResult<()>;
    async fn remove(&self, handle: &ContainerHandle, force: bool) -> RuntimeResult<()>;
    async fn inspect(&self, handle: &ContainerHandle) -> RuntimeResult<Inspection>;
    /// `ListByLabel` (spec §4.2) — used at startup reconciliation (§5) and
    /// by the Reconciler's orphan-adoption check (§4.5).
    async fn list_by_label(&self, label: &str, value: &str) -> RuntimeResult<Vec<ContainerHandle>>;
}

pub struct BollardRuntimeAdapter {
    docker: Docker,
}

impl BollardRuntimeAdapter {
    pub fn connect(endpoint: &str) -> anyhow::Result<Self> {
        let docker = if let Some(path) = endpoint.strip_prefix("unix://") {
            Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_http(endpoint, 120, bollard::API_DEFAULT_VERSION)?
        };
        Ok(Self { docker })
    }
}

#[async_trait]
impl RuntimeAdapter for BollardRuntimeAdapter {
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerHandle> {
        let mut labels = HashMap::new();
        labels.insert("product".to_string(), spec.product_name.clone());
        labels.insert("subdomain".to_string(), spec.subdomain.clone());
        labels.insert("generation".to_string(), spec.generation.to_string());
        labels.insert("role".to_string(), "instance".to_string());
        labels.insert("image_ref".to_string(), spec.image_ref.clone());

        let mut port_bindings = HashMap::new();
        let mut exposed_ports = HashMap::new();
        if let Some(port) = spec.publish_port {
            exposed_ports.insert(format!("{port}/tcp"), HashMap::new());
            port_bindings.insert(
                format!("{port}/tcp"),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                spec.data_volume_path, spec.container_data_path
            )]),
            network_mode: Some(spec.network.clone()),
            port_bindings: if spec.publish_port.is_some() {
                Some(port_bindings)
            } else {
                None
            },
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::ON_FAILURE),
                maximum_retry_count: Some(5),
            }),
            ..Default::default()
        };

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config {
            image: Some(spec.image_ref.clone()),
            env: Some(env),
            labels: Some(labels),
            exposed_ports: if spec.publish_port.is_some() {
                Some(exposed_ports)
            } else {
                None
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(classify)?;

        Ok(ContainerHandle(response.id))
    }

    async fn start(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        self.docker
            .start_container(&handle.0, None::<StartContainerOptions<String>>)
            .await
            .map_err(classify)
    }

    async fn stop(&self, handle: &ContainerHandle, grace: Duration) -> RuntimeResult<()> {
        self.docker
            .stop_container(
                &handle.0,
                Some(StopContainerOptions {
                    t: grace.as_secs() as i64,
                }),
            )
            .await
            .map_err(classify)
    }

    async fn remove(&self, handle: &ContainerHandle, force: bool) -> RuntimeResult<()> {
        self.docker
            .remove_container(
                &handle.0,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(classify)
    }

    async fn inspect(&self, handle: &ContainerHandle) -> RuntimeResult<Inspection> {
        let details = self
            .docker
            .inspect_container(&handle.0, None::<InspectContainerOptions>)
            .await
            .map_err(classify)?;

        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|status| match status {
                ContainerStateStatusEnum::CREATED => ContainerState::Created,
                ContainerStateStatusEnum::RUNNING => ContainerState::Running,
                ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
                ContainerStateStatusEnum::EXITED => ContainerState::Exited,
                ContainerStateStatusEnum::DEAD => ContainerState::Dead,
                _ => ContainerState::Unknown,
            })
            .unwrap_or(ContainerState::Unknown);

        let exit_code = details.state.as_ref().and_then(|s| s.exit_code);
        let started_at = details.state.as_ref().and_then(|s| s.started_at.clone());
        let labels = details
            .config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default();

        Ok(Inspection {
            state,
            exit_code,
            started_at,
            labels,
        })
    }

    async fn list_by_label(&self, label: &str, value: &str) -> RuntimeResult<Vec<ContainerHandle>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{label}={value}")]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(classify)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.id)
            .map(ContainerHandle)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_conflict_is_adoption_candidate() {
        let e = RuntimeError::NameConflict("name in use".to_string());
        assert!(e.is_conflict());
        assert!(!e.is_transient());
    }

    #[test]
    fn classify_transient_is_retryable() {
        let e = RuntimeError::Transient("timeout".to_string());
        assert!(e.is_transient());
    }
}
