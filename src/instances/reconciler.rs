use crate::app::config::AppConfig;
use crate::app::database::Store;
use crate::instances::model::{DesiredState, Instance, ObservedState};
use crate::instances::proxy::ProxyAdapter;
use crate::instances::repository::InstancesRepository;
use crate::instances::runtime::{ContainerHandle, ContainerSpec, ContainerState, RuntimeAdapter};
use crate::instances::secret_mint::SecretMint;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{Level, event};
use uuid::Uuid;

const HEALTH_FAILURE_THRESHOLD: u32 = 3;
const STARTING_GRACE: Duration = Duration::from_secs(60);
const STOP_GRACE: Duration = Duration::from_secs(10);
const RESWEEP_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// What the Health Prober last observed for an instance, consumed by the
/// Reconciler's `decide` step as one of its three inputs (spec §4.7: the
/// prober "writes a single field; does not drive runtime mutations
/// directly — the Reconciler decides whether unhealthy warrants action").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    ConsecutiveFailures(u32),
}

/// Pure decision: what the state machine in spec §4.5 says to do next,
/// given the Instance row, what the Runtime Adapter observed, and (when
/// relevant) the latest health-probe outcome. Exercised directly by unit
/// tests without a live Docker daemon or database (spec §9 "Test
/// tooling").
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NoOp,
    Adopt { handle: ContainerHandle },
    RemoveStaleContainer { handle: ContainerHandle },
    BeginCreate,
    MarkStarting,
    MarkHealthy,
    FailStartingTimeout,
    MarkUnhealthy,
    RecoverToHealthy,
    BeginReprovision,
    BeginDeprovision,
}

/// A container sharing this instance's `subdomain` label but not matching
/// `instance.runtime_handle` — either a legitimate crash-recovery orphan
/// (spec S5) or a stale leftover from a prior generation. `generation` is
/// `None` when the candidate couldn't be inspected (transient runtime
/// error); such a candidate is never adopted, only ever left alone or
/// removed, per spec §4.5 "Generation-as-fence".
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanCandidate {
    pub handle: ContainerHandle,
    pub generation: Option<i64>,
}

pub struct DecisionInput<'a> {
    pub instance: &'a Instance,
    pub inspected_state: Option<ContainerState>,
    pub deployed_image_ref: Option<&'a str>,
    pub orphan: Option<&'a OrphanCandidate>,
    pub probe: Option<ProbeOutcome>,
    pub starting_grace_elapsed: bool,
}

/// The state machine of spec §4.5, as a pure function. One mutation per
/// pass (spec §4.5 "one mutation per pass"): every arm here corresponds
/// to at most one externally-visible Runtime/Proxy call in
/// [`Reconciler::reconcile_once`].
pub fn decide(input: &DecisionInput) -> Decision {
    let instance = input.instance;
    let observed = instance.observed().unwrap_or(ObservedState::Absent);
    let desired = instance.desired();

    if let Some(orphan) = input.orphan
        && instance.runtime_handle.as_deref() != Some(orphan.handle.as_str())
    {
        // Only a container stamped with this row's own generation is this
        // instance's legitimate crash-recovery handle (spec S5); anything
        // else is a stale remnant of an earlier generation and must be
        // removed, never silently adopted (spec §4.5 "Generation-as-fence",
        // testable property #7).
        return if orphan.generation == Some(instance.generation) {
            Decision::Adopt {
                handle: orphan.handle.clone(),
            }
        } else {
            Decision::RemoveStaleContainer {
                handle: orphan.handle.clone(),
            }
        };
    }

    if desired == DesiredState::Absent && observed.is_non_absent() {
        return Decision::BeginDeprovision;
    }

    if desired == DesiredState::Running
        && matches!(
            observed,
            ObservedState::Creating
                | ObservedState::Starting
                | ObservedState::Healthy
                | ObservedState::Unhealthy
        )
        && input
            .deployed_image_ref
            .is_some_and(|deployed| deployed != instance.target_image_ref)
    {
        return Decision::BeginReprovision;
    }

    match observed {
        ObservedState::Absent => {
            if desired == DesiredState::Running {
                Decision::BeginCreate
            } else {
                Decision::NoOp
            }
        }
        ObservedState::Creating => {
            if input.inspected_state == Some(ContainerState::Running) {
                Decision::MarkStarting
            } else {
                Decision::NoOp
            }
        }
        ObservedState::Starting => match input.probe {
            Some(ProbeOutcome::Ok) => Decision::MarkHealthy,
            _ if input.starting_grace_elapsed => Decision::FailStartingTimeout,
            _ => Decision::NoOp,
        },
        ObservedState::Healthy => {
            if matches!(input.probe, Some(ProbeOutcome::ConsecutiveFailures(n)) if n >= HEALTH_FAILURE_THRESHOLD)
            {
                Decision::MarkUnhealthy
            } else {
                Decision::NoOp
            }
        }
        ObservedState::Unhealthy => match input.probe {
            Some(ProbeOutcome::Ok) => Decision::RecoverToHealthy,
            _ => Decision::NoOp,
        },
        ObservedState::Stopping => {
            if instance.runtime_handle.is_none() && desired == DesiredState::Running {
                Decision::BeginCreate
            } else {
                Decision::NoOp
            }
        }
        ObservedState::Failed { .. } => Decision::NoOp,
    }
}

pub struct Reconciler {
    repo: Arc<dyn InstancesRepository>,
    runtime: Arc<dyn RuntimeAdapter>,
    proxy: Arc<dyn ProxyAdapter>,
    mint: Arc<dyn SecretMint>,
    product_name: String,
    network: String,
    default_image_ref: String,
    publish_ports: bool,
    root_domain: String,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    backoff: Mutex<HashMap<Uuid, Duration>>,
    probes: Mutex<HashMap<Uuid, ProbeOutcome>>,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn InstancesRepository>,
        runtime: Arc<dyn RuntimeAdapter>,
        proxy: Arc<dyn ProxyAdapter>,
        mint: Arc<dyn SecretMint>,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            runtime,
            proxy,
            mint,
            product_name: config.runtime().product_name().to_string(),
            network: config.proxy().network().to_string(),
            default_image_ref: config.runtime().default_image_ref().to_string(),
            publish_ports: config.runtime().publish_ports(),
            root_domain: config.secrets().root_domain().to_string(),
            locks: Mutex::new(HashMap::new()),
            backoff: Mutex::new(HashMap::new()),
            probes: Mutex::new(HashMap::new()),
        }
    }

    async fn instance_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Records the Health Prober's latest finding for the next pass to
    /// consume (spec §4.7), without itself touching the Store.
    pub async fn record_probe(&self, instance_id: Uuid, outcome: ProbeOutcome) {
        self.probes.lock().await.insert(instance_id, outcome);
    }

    /// One full pass for one instance, serialized by a per-instance async
    /// mutex so concurrent triggers (admin call, re-sweep, health event)
    /// never run two passes for the same instance at once (spec §5
    /// "per-instance serialization"). Takes `self` by `Arc` so a transient
    /// failure can schedule a detached, backed-off retry of itself.
    pub async fn reconcile_once(self: Arc<Self>, instance_id: Uuid) {
        let lock = self.instance_lock(instance_id).await;
        let _guard = lock.lock().await;

        if let Err(e) = self.pass(instance_id).await {
            event!(Level::WARN, instance_id = %instance_id, error = %e, "reconcile pass failed");
            self.schedule_retry(instance_id);
        } else {
            self.backoff.lock().await.remove(&instance_id);
        }
    }

    /// Transient infra errors (spec §7) are retried with exponential
    /// backoff capped at [`MAX_BACKOFF`]; the counter resets on the next
    /// clean pass.
    fn schedule_retry(self: &Arc<Self>, instance_id: Uuid) {
        let this = self.clone();
        tokio::spawn(async move {
            let delay = {
                let mut backoff = this.backoff.lock().await;
                let next = backoff
                    .get(&instance_id)
                    .copied()
                    .map(|d| (d * 2).min(MAX_BACKOFF))
                    .unwrap_or(Duration::from_secs(1));
                backoff.insert(instance_id, next);
                next
            };
            event!(Level::DEBUG, instance_id = %instance_id, delay_secs = delay.as_secs(), "scheduling reconcile retry");
            tokio::time::sleep(delay).await;
            this.reconcile_once(instance_id).await;
        });
    }

    async fn pass(&self, instance_id: Uuid) -> anyhow::Result<()> {
        let instance = self.repo.load_by_id(instance_id).await?;

        let inspection = match &instance.runtime_handle {
            Some(handle) => self
                .runtime
                .inspect(&ContainerHandle(handle.clone()))
                .await
                .ok(),
            None => None,
        };
        let inspected_state = inspection.as_ref().map(|i| i.state);
        let deployed_image_ref = inspection
            .as_ref()
            .and_then(|i| i.labels.get("image_ref"))
            .map(String::as_str);

        let candidates = self
            .runtime
            .list_by_label("subdomain", &instance.subdomain)
            .await
            .unwrap_or_default();
        let candidate = candidates
            .iter()
            .find(|h| instance.runtime_handle.as_deref() != Some(h.as_str()));
        let orphan = match candidate {
            Some(handle) => {
                let generation = self
                    .runtime
                    .inspect(handle)
                    .await
                    .ok()
                    .and_then(|i| i.labels.get("generation").cloned())
                    .and_then(|g| g.parse::<i64>().ok());
                Some(OrphanCandidate {
                    handle: handle.clone(),
                    generation,
                })
            }
            None => None,
        };

        let probe = self.probes.lock().await.get(&instance_id).copied();

        let starting_grace_elapsed = instance.observed().ok() == Some(ObservedState::Starting)
            && (chrono::Utc::now() - instance.last_transition_at)
                .to_std()
                .map(|elapsed| elapsed > STARTING_GRACE)
                .unwrap_or(false);

        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state,
            deployed_image_ref,
            orphan: orphan.as_ref(),
            probe,
            starting_grace_elapsed,
        });

        self.act(&instance, decision).await
    }

    async fn act(&self, instance: &Instance, decision: Decision) -> anyhow::Result<()> {
        match decision {
            Decision::NoOp => Ok(()),
            Decision::Adopt { handle } => {
                self.repo
                    .record_observed(
                        instance.id,
                        instance.generation,
                        &instance.observed().unwrap_or(ObservedState::Creating),
                        Some(handle.as_str()),
                        instance.network_address.as_deref(),
                        "adopted orphan container with matching labels",
                        instance.generation,
                    )
                    .await?;
                Ok(())
            }
            Decision::RemoveStaleContainer { handle } => {
                // Leftover from an earlier generation (spec §4.5
                // "Generation-as-fence": "removes it before creating the new
                // one"). No Store write needed — the row's own handle is
                // untouched, so the next pass simply no longer sees it.
                self.runtime.remove(&handle, true).await?;
                Ok(())
            }
            Decision::BeginCreate => self.begin_create(instance).await,
            Decision::MarkStarting => {
                self.repo
                    .record_observed(
                        instance.id,
                        instance.generation,
                        &ObservedState::Starting,
                        instance.runtime_handle.as_deref(),
                        instance.network_address.as_deref(),
                        "container reported running",
                        instance.generation,
                    )
                    .await?;
                Ok(())
            }
            Decision::MarkHealthy => {
                self.repo
                    .record_observed(
                        instance.id,
                        instance.generation,
                        &ObservedState::Healthy,
                        instance.runtime_handle.as_deref(),
                        instance.network_address.as_deref(),
                        "health probe succeeded",
                        instance.generation,
                    )
                    .await?;
                Ok(())
            }
            Decision::FailStartingTimeout => {
                if let Some(handle) = &instance.runtime_handle {
                    let handle = ContainerHandle(handle.clone());
                    let _ = self.runtime.stop(&handle, STOP_GRACE).await;
                    self.runtime.remove(&handle, true).await.ok();
                }
                self.repo
                    .record_observed(
                        instance.id,
                        instance.generation,
                        &ObservedState::Failed {
                            reason: "health probe never succeeded within the grace window"
                                .to_string(),
                        },
                        None,
                        None,
                        "starting grace window exceeded",
                        instance.generation,
                    )
                    .await?;
                Ok(())
            }
            Decision::MarkUnhealthy => {
                self.repo
                    .record_observed(
                        instance.id,
                        instance.generation,
                        &ObservedState::Unhealthy,
                        instance.runtime_handle.as_deref(),
                        instance.network_address.as_deref(),
                        "consecutive health probe failures exceeded threshold",
                        instance.generation,
                    )
                    .await?;
                Ok(())
            }
            Decision::RecoverToHealthy => {
                self.repo
                    .record_observed(
                        instance.id,
                        instance.generation,
                        &ObservedState::Healthy,
                        instance.runtime_handle.as_deref(),
                        instance.network_address.as_deref(),
                        "health probe recovered",
                        instance.generation,
                    )
                    .await?;
                Ok(())
            }
            Decision::BeginReprovision => self.begin_reprovision(instance).await,
            Decision::BeginDeprovision => self.begin_deprovision(instance).await,
        }
    }

    fn container_data_path(&self) -> &'static str {
        "/data"
    }

    async fn begin_create(&self, instance: &Instance) -> anyhow::Result<()> {
        let minted = match (&instance.pending_credential, instance.pending_credential_kind.as_deref()) {
            (Some(sealed), Some(kind)) => {
                // Spec §9 Open Question 1: an admin-supplied override takes
                // the place of a Secret-Mint-generated password. Consumed
                // once here; cleared below so a later reprovision doesn't
                // reapply it.
                let plaintext = self.mint.open_credential(sealed)?;
                let plaintext = String::from_utf8(plaintext)
                    .map_err(|e| anyhow::anyhow!("pending credential was not valid utf-8: {e}"))?;
                let env_key = match kind {
                    "password" => "INSTANCE_PASSWORD",
                    "password_hash" => "INSTANCE_PASSWORD_HASH",
                    other => return Err(anyhow::anyhow!("unknown pending_credential_kind: {other}")),
                };
                crate::instances::secret_mint::MintedInstanceSecrets {
                    envelope: sealed.clone(),
                    env: vec![
                        ("INSTANCE_SUBDOMAIN".to_string(), instance.subdomain.clone()),
                        (env_key.to_string(), plaintext),
                    ],
                }
            }
            _ => self.mint.mint_for_instance(&instance.subdomain).await?,
        };
        self.repo
            .update_secrets_envelope(instance.id, &minted.envelope)
            .await?;
        if instance.pending_credential.is_some() {
            self.repo
                .clear_pending_credential(instance.id, instance.generation)
                .await?;
        }

        let name = instance.container_name(&self.product_name);
        let spec = ContainerSpec {
            name: name.clone(),
            product_name: self.product_name.clone(),
            image_ref: instance.target_image_ref.clone(),
            subdomain: instance.subdomain.clone(),
            generation: instance.generation,
            env: minted.env,
            data_volume_path: instance.data_volume_path.clone(),
            container_data_path: self.container_data_path().to_string(),
            network: self.network.clone(),
            publish_port: self.publish_ports.then_some(80),
        };

        let handle = match self.runtime.create(&spec).await {
            Ok(handle) => handle,
            Err(e) if e.is_conflict() => {
                // Crash-recovery path (spec S5): a container with this name
                // already exists. Adopt it only if its generation label
                // matches; otherwise it is a foreign container and the
                // instance goes to `failed` rather than silently reusing it.
                let existing = self
                    .runtime
                    .list_by_label("subdomain", &instance.subdomain)
                    .await
                    .unwrap_or_default();
                match existing.into_iter().next() {
                    Some(candidate) => {
                        let candidate_generation = self
                            .runtime
                            .inspect(&candidate)
                            .await
                            .ok()
                            .and_then(|i| i.labels.get("generation").cloned())
                            .and_then(|g| g.parse::<i64>().ok());
                        if candidate_generation == Some(instance.generation) {
                            candidate
                        } else {
                            self.repo
                                .record_observed(
                                    instance.id,
                                    instance.generation,
                                    &ObservedState::Failed {
                                        reason: "container name already in use by a foreign or stale-generation container".to_string(),
                                    },
                                    None,
                                    None,
                                    "name conflict on create: existing container's generation label did not match",
                                    instance.generation,
                                )
                                .await?;
                            return Ok(());
                        }
                    }
                    None => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        self.runtime.start(&handle).await?;
        let internal_address = format!("{name}:{}", 80);
        self.proxy.publish(&instance.subdomain, &internal_address).await?;

        self.repo
            .record_observed(
                instance.id,
                instance.generation,
                &ObservedState::Creating,
                Some(handle.as_str()),
                Some(&internal_address),
                "create/start/publish issued",
                instance.generation,
            )
            .await?;
        Ok(())
    }

    async fn begin_reprovision(&self, instance: &Instance) -> anyhow::Result<()> {
        if let Some(handle) = &instance.runtime_handle {
            let handle = ContainerHandle(handle.clone());
            let _ = self.runtime.stop(&handle, STOP_GRACE).await;
            self.runtime.remove(&handle, true).await.ok();
        }
        self.repo
            .record_observed(
                instance.id,
                instance.generation,
                &ObservedState::Stopping,
                None,
                instance.network_address.as_deref(),
                "reprovision: stopping prior generation",
                instance.generation + 1,
            )
            .await?;
        Ok(())
    }

    async fn begin_deprovision(&self, instance: &Instance) -> anyhow::Result<()> {
        self.proxy.retract(&instance.subdomain).await?;
        if let Some(handle) = &instance.runtime_handle {
            let handle = ContainerHandle(handle.clone());
            let _ = self.runtime.stop(&handle, STOP_GRACE).await;
            // Spec §4.5 "on failure: retry Remove until success" — propagate
            // rather than swallow, so `pass()` fails and `reconcile_once`
            // schedules a backed-off retry instead of committing `absent`
            // over a container that is still alive.
            self.runtime.remove(&handle, true).await?;
        }
        if instance.delete_volume_on_deprovision {
            // Best-effort (spec §6 "retain=false"): a failure here does not
            // block the container/proxy teardown that already happened, it
            // just surfaces in the logs. `remove_dir_all` on a missing path
            // is treated as success — nothing left to delete.
            match tokio::fs::remove_dir_all(&instance.data_volume_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => event!(
                    Level::WARN,
                    instance_id = %instance.id,
                    path = %instance.data_volume_path,
                    error = %e,
                    "failed to delete data volume on deprovision"
                ),
            }
        }
        self.repo
            .record_observed(
                instance.id,
                instance.generation,
                &ObservedState::Absent,
                None,
                None,
                "deprovisioned",
                instance.generation,
            )
            .await?;
        Ok(())
    }

    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    pub fn default_image_ref(&self) -> &str {
        &self.default_image_ref
    }
}

/// The enqueue side of the worker pool (spec §5 "parallel workers"). A
/// trigger for an instance already pending collapses into the pending
/// entry instead of growing the queue (spec §5 "concurrent triggers for
/// the same instance coalesce"). Also the Health Prober's only way to
/// reach the Reconciler (spec §4.7): it never touches the Store or the
/// Runtime Adapter directly, it just records an outcome and enqueues.
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::UnboundedSender<Uuid>,
    pending: Arc<Mutex<HashSet<Uuid>>>,
    reconciler: Arc<Reconciler>,
}

impl ReconcileHandle {
    pub fn enqueue(&self, instance_id: Uuid) {
        let tx = self.tx.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            let mut pending = pending.lock().await;
            if pending.insert(instance_id) {
                let _ = tx.send(instance_id);
            }
        });
    }

    /// Records the Health Prober's latest finding and enqueues a pass so it
    /// is picked up promptly rather than waiting for the next re-sweep.
    pub async fn record_probe(&self, instance_id: Uuid, outcome: ProbeOutcome) {
        self.reconciler.record_probe(instance_id, outcome).await;
        self.enqueue(instance_id);
    }

    /// The Secret Mint shares a lifetime with the Reconciler, so request
    /// handlers that need it (rotate-password, SSO login, JWKS) reach it
    /// through here rather than duplicating a second instance.
    pub fn secret_mint(&self) -> Arc<dyn SecretMint> {
        self.reconciler.mint.clone()
    }
}

/// Spawns the worker pool, the periodic re-sweeper, and performs startup
/// reconciliation (spec §5 "Startup reconciliation"): list all rows and
/// labeled containers, enqueue one pass per row, and log — but do not
/// recreate — orphans with no matching row.
pub fn spawn_reconciler(store: Arc<Store>, config: Arc<AppConfig>) -> ReconcileHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Uuid>();
    let pending = Arc::new(Mutex::new(HashSet::new()));

    let reconciler = Arc::new(Reconciler::new(
        store,
        build_runtime_adapter(&config),
        build_proxy_adapter_arc(&config),
        build_secret_mint(&config),
        &config,
    ));

    let handle = ReconcileHandle {
        tx: tx.clone(),
        pending: pending.clone(),
        reconciler: reconciler.clone(),
    };

    {
        let reconciler = reconciler.clone();
        let pending = pending.clone();
        tokio::spawn(async move {
            while let Some(instance_id) = rx.recv().await {
                pending.lock().await.remove(&instance_id);
                reconciler.clone().reconcile_once(instance_id).await;
            }
        });
    }

    {
        let reconciler = reconciler.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RESWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                match reconciler.repo.list_instances().await {
                    Ok(instances) => {
                        for instance in instances {
                            handle.enqueue(instance.id);
                        }
                    }
                    Err(e) => {
                        event!(Level::ERROR, error = %e, "re-sweep failed to list instances");
                    }
                }
            }
        });
    }

    {
        let reconciler = reconciler.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            startup_reconciliation(&reconciler, &handle).await;
        });
    }

    handle
}

async fn startup_reconciliation(reconciler: &Reconciler, handle: &ReconcileHandle) {
    let instances = match reconciler.repo.list_instances().await {
        Ok(instances) => instances,
        Err(e) => {
            event!(Level::ERROR, error = %e, "startup reconciliation: failed to list instances");
            return;
        }
    };

    let known_handles: HashSet<String> = instances
        .iter()
        .filter_map(|i| i.runtime_handle.clone())
        .collect();

    let labeled = reconciler
        .runtime
        .list_by_label("role", "instance")
        .await
        .unwrap_or_default();

    for container in &labeled {
        if !known_handles.contains(container.as_str()) {
            event!(
                Level::WARN,
                handle = %container.as_str(),
                "orphan container found at startup with no matching instance row; left alone (adopt-orphans not implemented as a running mode switch)"
            );
        }
    }

    for instance in instances {
        handle.enqueue(instance.id);
    }
}

fn build_runtime_adapter(config: &AppConfig) -> Arc<dyn RuntimeAdapter> {
    Arc::new(
        crate::instances::runtime::BollardRuntimeAdapter::connect(config.runtime().endpoint())
            .expect("failed to connect to container runtime"),
    )
}

fn build_proxy_adapter_arc(config: &AppConfig) -> Arc<dyn ProxyAdapter> {
    crate::instances::proxy::build_proxy_adapter(
        config.proxy().mode(),
        config.proxy().file_output_dir(),
    )
    .expect("failed to build proxy adapter")
    .into()
}

fn build_secret_mint(config: &AppConfig) -> Arc<dyn SecretMint> {
    Arc::new(
        crate::instances::secret_mint::EnvelopeSecretMint::new(
            config.secrets().envelope_key(),
            config.secrets().sso_signing_key(),
        )
        .expect("failed to initialize secret mint"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_instance(observed: &str, desired: &str, generation: i64, handle: Option<&str>) -> Instance {
        Instance {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            subdomain: "acme".to_string(),
            desired_state: desired.to_string(),
            target_image_ref: "img:latest".to_string(),
            observed_state: observed.to_string(),
            last_transition_at: Utc::now(),
            last_error: None,
            runtime_handle: handle.map(str::to_string),
            network_address: None,
            secrets_envelope: None,
            data_volume_path: "/data/acme".to_string(),
            delete_volume_on_deprovision: false,
            pending_credential: None,
            pending_credential_kind: None,
            generation,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn absent_running_begins_create() {
        let instance = base_instance("absent", "running", 1, None);
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: None,
            deployed_image_ref: None,
            orphan: None,
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::BeginCreate);
    }

    #[test]
    fn creating_with_running_container_advances_to_starting() {
        let instance = base_instance("creating", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::MarkStarting);
    }

    #[test]
    fn starting_with_ok_probe_becomes_healthy() {
        let instance = base_instance("starting", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: Some(ProbeOutcome::Ok),
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::MarkHealthy);
    }

    #[test]
    fn starting_past_grace_without_success_fails() {
        let instance = base_instance("starting", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: None,
            starting_grace_elapsed: true,
        });
        assert_eq!(decision, Decision::FailStartingTimeout);
    }

    #[test]
    fn healthy_with_failures_over_threshold_becomes_unhealthy() {
        let instance = base_instance("healthy", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: Some(ProbeOutcome::ConsecutiveFailures(3)),
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::MarkUnhealthy);
    }

    #[test]
    fn healthy_with_failures_under_threshold_is_noop() {
        let instance = base_instance("healthy", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: Some(ProbeOutcome::ConsecutiveFailures(1)),
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::NoOp);
    }

    #[test]
    fn unhealthy_recovers_on_ok_probe() {
        let instance = base_instance("unhealthy", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: Some(ProbeOutcome::Ok),
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::RecoverToHealthy);
    }

    #[test]
    fn desired_absent_from_healthy_begins_deprovision() {
        let instance = base_instance("healthy", "absent", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::BeginDeprovision);
    }

    #[test]
    fn orphan_with_matching_generation_is_adopted_before_anything_else() {
        let instance = base_instance("creating", "running", 1, Some("stale-handle"));
        let orphan = OrphanCandidate {
            handle: ContainerHandle("fresh-handle".to_string()),
            generation: Some(1),
        };
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: None,
            deployed_image_ref: None,
            orphan: Some(&orphan),
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(
            decision,
            Decision::Adopt {
                handle: ContainerHandle("fresh-handle".to_string())
            }
        );
    }

    #[test]
    fn orphan_with_mismatched_generation_is_removed_not_adopted() {
        let instance = base_instance("creating", "running", 2, Some("stale-handle"));
        let orphan = OrphanCandidate {
            handle: ContainerHandle("leftover-handle".to_string()),
            generation: Some(1),
        };
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: None,
            deployed_image_ref: None,
            orphan: Some(&orphan),
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(
            decision,
            Decision::RemoveStaleContainer {
                handle: ContainerHandle("leftover-handle".to_string())
            }
        );
    }

    #[test]
    fn orphan_with_unknown_generation_is_removed_not_adopted() {
        let instance = base_instance("creating", "running", 1, Some("stale-handle"));
        let orphan = OrphanCandidate {
            handle: ContainerHandle("uninspectable-handle".to_string()),
            generation: None,
        };
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: None,
            deployed_image_ref: None,
            orphan: Some(&orphan),
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(
            decision,
            Decision::RemoveStaleContainer {
                handle: ContainerHandle("uninspectable-handle".to_string())
            }
        );
    }

    #[test]
    fn matching_orphan_does_not_trigger_adoption() {
        let instance = base_instance("healthy", "running", 1, Some("c1"));
        let orphan = OrphanCandidate {
            handle: ContainerHandle("c1".to_string()),
            generation: Some(1),
        };
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: Some(&orphan),
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::NoOp);
    }

    #[test]
    fn repeated_passes_with_no_change_are_idempotent() {
        let instance = base_instance("healthy", "running", 1, Some("c1"));
        let input = DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: None,
            orphan: None,
            probe: Some(ProbeOutcome::Ok),
            starting_grace_elapsed: false,
        };
        assert_eq!(decide(&input), Decision::NoOp);
        assert_eq!(decide(&input), Decision::NoOp);
    }

    #[test]
    fn deployed_image_ref_mismatch_triggers_reprovision() {
        let instance = base_instance("healthy", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: Some("img:old"),
            orphan: None,
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::BeginReprovision);
    }

    #[test]
    fn matching_deployed_image_ref_is_noop() {
        let instance = base_instance("healthy", "running", 1, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Running),
            deployed_image_ref: Some("img:latest"),
            orphan: None,
            probe: Some(ProbeOutcome::Ok),
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::NoOp);
    }

    #[test]
    fn stopping_with_no_handle_recreates_at_new_generation() {
        let instance = base_instance("stopping", "running", 2, None);
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: None,
            deployed_image_ref: None,
            orphan: None,
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::BeginCreate);
    }

    #[test]
    fn stopping_with_handle_still_present_is_noop() {
        let instance = base_instance("stopping", "running", 2, Some("c1"));
        let decision = decide(&DecisionInput {
            instance: &instance,
            inspected_state: Some(ContainerState::Exited),
            deployed_image_ref: None,
            orphan: None,
            probe: None,
            starting_grace_elapsed: false,
        });
        assert_eq!(decision, Decision::NoOp);
    }
}
