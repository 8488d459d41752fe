//! Configuration dispatcher.
//!
//! Owns the per-service worker population and reconciles it against each
//! accepted machine configuration: services that disappeared get their
//! update channel closed (terminating the worker), new services get a fresh
//! worker, and every configured service receives its rebuilt probe
//! schedule. When the inbound channel closes, the dispatcher cascades
//! closure to the whole fleet and waits for it to drain.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use orbit_state::{MachineConfiguration, OrbitEvent, ServiceChecks};

use crate::worker::run_service_worker;

/// Per-service bookkeeping: the update channel and the worker task handle.
struct WorkerSlot {
    updates: mpsc::Sender<ServiceChecks>,
    handle: JoinHandle<()>,
}

pub(crate) async fn run_configuration_dispatcher(
    mut configurations: mpsc::Receiver<MachineConfiguration>,
    events: mpsc::Sender<OrbitEvent>,
    endpoint_address: String,
    default_delay: Duration,
) {
    debug!(%endpoint_address, "configuration dispatcher started");
    let mut workers: HashMap<String, WorkerSlot> = HashMap::new();

    while let Some(configuration) = configurations.recv().await {
        // Dropping a removed service's slot closes its update channel; the
        // worker terminates on its next poll.
        workers.retain(|name, _| {
            let keep = configuration.services.contains_key(name);
            if !keep {
                info!(service = %name, "service removed, stopping its check worker");
            }
            keep
        });

        for (name, bound) in &configuration.services {
            let updates = match workers.get(name) {
                Some(slot) => slot.updates.clone(),
                None => {
                    info!(service = %name, "starting check worker for new service");
                    let (tx, rx) = mpsc::channel(1);
                    let handle = tokio::spawn(run_service_worker(
                        rx,
                        events.clone(),
                        endpoint_address.clone(),
                        default_delay,
                    ));
                    workers.insert(
                        name.clone(),
                        WorkerSlot {
                            updates: tx.clone(),
                            handle,
                        },
                    );
                    tx
                }
            };

            // Workers accept updates on every poll cycle, so this send only
            // fails if the worker is gone (its event sink was closed).
            let checks = ServiceChecks::for_service(name, bound);
            if updates.send(checks).await.is_err() {
                warn!(service = %name, "check worker is gone, dropping it");
                workers.remove(name);
            }
        }
    }

    // Inbound channel closed: close every worker channel, then wait for the
    // fleet so no event can be produced after shutdown completes.
    debug!(
        workers = workers.len(),
        "configuration channel closed, stopping all check workers"
    );
    let handles: Vec<(String, JoinHandle<()>)> = workers
        .drain()
        .map(|(name, slot)| (name, slot.handle))
        .collect();
    for (name, handle) in handles {
        if let Err(e) = handle.await {
            // A panicking probe takes down only its own worker task.
            warn!(service = %name, error = %e, "check worker task failed");
        }
    }
    debug!("configuration dispatcher stopped");
}
