//! orbit-check — health-check scheduling for the orbit node agent.
//!
//! Keeps one probe worker per locally configured service and emits a stream
//! of service state transitions for downstream load-balancer publication.
//!
//! # Architecture
//!
//! ```text
//! CheckEngine
//!   └── configuration dispatcher (capacity-1 inbound channel)
//!         ├── one worker per configured service (capacity-1 update channel)
//!         │     ├── probe round: http / tcp / dummy checks, in order
//!         │     └── ServiceStateEvent → shared event sink
//!         └── worker lifecycle tracks configuration membership
//! ```
//!
//! Cancellation is channel closure: [`CheckEngine::stop`] closes the inbound
//! channel, the dispatcher closes every worker channel and waits for the
//! fleet to drain. Probes in flight finish or time out naturally.
//!
//! Workers prefer a pending schedule update over the next probe round, so a
//! reconfiguration is never starved by continuous probing, and they never
//! block on their update channel in steady state.

pub mod checker;
mod dispatcher;
pub mod engine;
pub mod error;
mod worker;

pub use engine::CheckEngine;
pub use error::{CheckEngineError, CheckEngineResult};
