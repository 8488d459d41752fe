//! Domain types for the orbit node agent.
//!
//! These types cross the boundary between the outer reconciliation loop
//! (which polls desired state from the coordination store), the check engine
//! (which probes services and emits state events), and the load-balancer
//! publication pipeline (which consumes those events). All wire-facing types
//! serialize to/from JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

// ── Checks ─────────────────────────────────────────────────────────

/// One probe definition for a service.
///
/// `check_type` selects the probe mechanism: `"http"`, `"tcp"` or `"dummy"`.
/// The type is kept as an open string because configurations arrive from the
/// coordination store; an unrecognised type runs no probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceCheck {
    #[serde(rename = "type")]
    pub check_type: String,
    /// HTTP: full URL to GET.
    pub url: Option<String>,
    /// HTTP: overrides the `Host:` request header (virtual-host probing).
    pub http_host: Option<String>,
    /// HTTP: basic-auth user; auth is attached when either credential is set.
    pub username: Option<String>,
    /// HTTP: basic-auth password.
    pub password: Option<String>,
    /// TCP: `host:port` to dial.
    pub host_port: Option<String>,
    /// Dummy: the value the probe returns.
    pub dummy_result: bool,
    /// HTTP: required status-line prefix (e.g. "200", "2"). Default "200".
    pub expect_http_status: Option<String>,
    /// HTTP: substring that must appear in the response body.
    pub expect_string: Option<String>,
    /// Dial timeout in milliseconds. Defaults: 300 (http), 50 (tcp).
    pub connect_timeout: Option<u64>,
    /// HTTP read/write deadline in milliseconds, set after connect. Default 300.
    pub response_timeout: Option<u64>,
    /// Overrides the worker's delay between probe rounds, in milliseconds.
    pub delay: Option<u64>,
}

// ── Service configuration ──────────────────────────────────────────

/// Container binding for a service deployed on this node.
///
/// Presence of a binding is what makes a service eligible for endpoint
/// publication; the runtime details are consumed by the container runtime
/// collaborator, not by the check engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfiguration {
    pub name: String,
    pub image: String,
    /// Environment injected into the container.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A deployable revision of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRevision {
    pub revision: String,
}

/// Static configuration of one service as stored in the coordination store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfiguration {
    pub name: String,
    /// Port the service listens on; combined with the node address to form
    /// the endpoint advertised in state events.
    pub endpoint_port: u16,
    /// Probes run in order, every round.
    #[serde(default)]
    pub checks: Vec<ServiceCheck>,
    /// Container binding, when the service runs in a local container.
    #[serde(default)]
    pub container: Option<ContainerConfiguration>,
    /// Statically pinned revision.
    #[serde(default)]
    pub revision: Option<ServiceRevision>,
}

/// A service bound to this node: its configuration plus the revision that
/// is actually deployed here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoundService {
    pub service: ServiceConfiguration,
    /// Deployed revision; takes precedence over the static one.
    #[serde(default)]
    pub deployed_revision: Option<ServiceRevision>,
}

/// Desired state for this node: which services should be probed locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfiguration {
    #[serde(default)]
    pub services: HashMap<String, BoundService>,
}

// ── Check scheduling ───────────────────────────────────────────────

/// Per-service endpoint metadata forwarded verbatim into every state event.
///
/// Shared read-only across events because it embeds the full service
/// configuration; the load-balancer reconfiguration engine consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    pub revision: String,
    pub service_configuration: ServiceConfiguration,
}

/// The probe schedule for one service, as handed to its check worker.
#[derive(Debug, Clone)]
pub struct ServiceChecks {
    pub service_name: String,
    pub endpoint_port: u16,
    pub checks: Vec<ServiceCheck>,
    pub endpoint_info: Option<Arc<EndpointInfo>>,
}

// ── State events ───────────────────────────────────────────────────

/// Health of a service as observed by its check worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No probe round has completed yet.
    #[default]
    Unknown,
    Up,
    Down,
}

/// One probe round's verdict for one service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStateEvent {
    pub service: String,
    /// `<nodeAddress>:<endpointPort>` of the probed backend.
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_info: Option<Arc<EndpointInfo>>,
    pub is_up: bool,
    /// Whether this round transitioned the service into a different state.
    pub state_changed: bool,
    /// When the service last entered its current state. Updated iff
    /// `state_changed`; non-decreasing within a worker's event stream.
    pub same_state_since: SystemTime,
}

/// Tagged union carried on the node-wide event sink.
///
/// The check engine produces the `ServiceState` variant; consumers dispatch
/// on the variant at the sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrbitEvent {
    ServiceState(ServiceStateEvent),
}

impl BoundService {
    /// The concrete configuration to probe against.
    pub fn config(&self) -> &ServiceConfiguration {
        &self.service
    }

    /// Effective revision: the deployed one wins over the static one.
    pub fn revision(&self) -> String {
        self.deployed_revision
            .as_ref()
            .or(self.service.revision.as_ref())
            .map(|r| r.revision.clone())
            .unwrap_or_default()
    }
}

impl ServiceChecks {
    /// Build the probe schedule for a bound service.
    ///
    /// Endpoint metadata is attached only when the service has a container
    /// binding; services without one are probed but never published.
    pub fn for_service(name: &str, bound: &BoundService) -> Self {
        let service = bound.config();
        let endpoint_info = service.container.as_ref().map(|_| {
            Arc::new(EndpointInfo {
                revision: bound.revision(),
                service_configuration: service.clone(),
            })
        });
        Self {
            service_name: name.to_string(),
            endpoint_port: service.endpoint_port,
            checks: service.checks.clone(),
            endpoint_info,
        }
    }
}
