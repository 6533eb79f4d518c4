use crate::common::DefaultAppState;
use crate::instances::model::ObservedState;
use crate::instances::reconciler::ProbeOutcome;
use crate::instances::repository::InstancesRepository;
use rand::Rng;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Level, event};
use uuid::Uuid;

const PROBE_INTERVAL: Duration = Duration::from_secs(15);
const PROBE_JITTER_MS: u64 = 4_000;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One GET against an instance's `/health` endpoint (spec §4.7: `{healthy|
/// ok}` or any other 2xx counts as healthy, non-2xx or a timed-out request
/// counts as a failure — the body is read on a best-effort basis only,
/// classification never hinges on it).
async fn probe_once(client: &Client, network_address: &str) -> bool {
    let url = format!("http://{network_address}/health");
    match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            event!(Level::DEBUG, error = %e, %url, "health probe request failed");
            false
        }
    }
}

/// Spawns the periodic health-polling loop (spec §4.7). Runs for the life
/// of the process, entirely decoupled from the Reconciler's own worker
/// pool — its only contact point is [`crate::instances::reconciler::ReconcileHandle::record_probe`].
pub fn spawn_prober(app_state: Arc<DefaultAppState>) {
    let client = Client::new();
    let consecutive_failures: Arc<Mutex<HashMap<Uuid, u32>>> = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(async move {
        loop {
            let jitter = rand::rng().random_range(0..PROBE_JITTER_MS);
            tokio::time::sleep(PROBE_INTERVAL + Duration::from_millis(jitter)).await;

            let instances = match app_state.store.list_instances().await {
                Ok(instances) => instances,
                Err(e) => {
                    event!(Level::ERROR, error = %e, "health prober failed to list instances");
                    continue;
                }
            };

            for instance in instances {
                let observed = match instance.observed() {
                    Ok(observed) => observed,
                    Err(_) => continue,
                };
                if matches!(observed, ObservedState::Absent | ObservedState::Creating | ObservedState::Stopping) {
                    continue;
                }
                let Some(network_address) = instance.network_address.clone() else {
                    continue;
                };

                let healthy = probe_once(&client, &network_address).await;
                let mut failures = consecutive_failures.lock().await;
                let outcome = if healthy {
                    failures.remove(&instance.id);
                    ProbeOutcome::Ok
                } else {
                    let count = failures.entry(instance.id).or_insert(0);
                    *count += 1;
                    ProbeOutcome::ConsecutiveFailures(*count)
                };
                drop(failures);

                app_state.reconcile.record_probe(instance.id, outcome).await;
            }
        }
    });
}
