//! Check engine facade.
//!
//! The public surface of the health-check subsystem. The outer reconciler
//! starts the engine once, pushes desired-state configurations as they
//! change, and stops it on shutdown; it never reaches into the dispatcher's
//! channels directly.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use orbit_state::{MachineConfiguration, OrbitEvent};

use crate::dispatcher::run_configuration_dispatcher;
use crate::error::{CheckEngineError, CheckEngineResult};

/// Schedules health checks for the services configured on this node and
/// emits their state transitions to the shared event sink.
#[derive(Default)]
pub struct CheckEngine {
    configurations: Option<mpsc::Sender<MachineConfiguration>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl CheckEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the engine. Must be called exactly once per instance.
    ///
    /// `interval_ms` is the default delay between probe rounds; individual
    /// checks may override it. Events are written to `events`; the engine
    /// never closes that sink.
    pub fn start(
        &mut self,
        events: mpsc::Sender<OrbitEvent>,
        endpoint_address: impl Into<String>,
        interval_ms: u64,
    ) {
        let endpoint_address = endpoint_address.into();
        // Capacity 1: one configuration may be in flight; the next push
        // waits until the dispatcher has accepted the previous one.
        let (tx, rx) = mpsc::channel(1);
        self.configurations = Some(tx);
        self.dispatcher = Some(tokio::spawn(run_configuration_dispatcher(
            rx,
            events,
            endpoint_address.clone(),
            Duration::from_millis(interval_ms),
        )));
        info!(%endpoint_address, interval_ms, "check engine started");
    }

    /// Hand a new desired-state configuration to the dispatcher.
    ///
    /// Completes once the dispatcher can accept it; back-pressure from the
    /// capacity-1 inbound channel makes this wait while the previous
    /// configuration is still being absorbed.
    pub async fn push_new_configuration(
        &self,
        configuration: MachineConfiguration,
    ) -> CheckEngineResult<()> {
        let configurations = self
            .configurations
            .as_ref()
            .ok_or(CheckEngineError::NotRunning)?;
        configurations
            .send(configuration)
            .await
            .map_err(|_| CheckEngineError::NotRunning)
    }

    /// Stop the engine: close the inbound channel and wait for the
    /// dispatcher and every check worker to terminate.
    ///
    /// A configuration pushed before this call is still processed first.
    /// Probes in flight finish or time out naturally.
    pub async fn stop(&mut self) {
        // Dropping the sender closes the inbound channel; the dispatcher
        // cascades closure to the worker fleet and joins it.
        self.configurations.take();
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.await;
        }
        debug!("check engine stopped");
    }
}
