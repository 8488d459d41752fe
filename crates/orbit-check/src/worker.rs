//! Per-service probe worker.
//!
//! One worker task owns the probe schedule and state machine for a single
//! service. Each loop iteration either ingests a pending schedule update or
//! runs one probe round, emits a state event, and sleeps for the round
//! delay. Closing the update channel terminates the worker.

use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info};

use orbit_state::{OrbitEvent, ServiceChecks, ServiceState, ServiceStateEvent};

use crate::checker::run_check;

pub(crate) async fn run_service_worker(
    mut updates: mpsc::Receiver<ServiceChecks>,
    events: mpsc::Sender<OrbitEvent>,
    endpoint_address: String,
    default_delay: Duration,
) {
    // Nothing to probe until the dispatcher sends the initial schedule.
    let Some(mut checks) = updates.recv().await else {
        return;
    };
    debug!(service = %checks.service_name, "check worker started");

    let mut delay = default_delay;
    let mut state = ServiceState::Unknown;
    let mut same_state_since = SystemTime::UNIX_EPOCH;

    loop {
        // A pending reconfiguration always wins over the next probe round.
        match updates.try_recv() {
            Ok(new_checks) => {
                debug!(service = %new_checks.service_name, "new check schedule");
                checks = new_checks;
                continue;
            }
            Err(TryRecvError::Disconnected) => {
                debug!(service = %checks.service_name, "check worker stopping");
                return;
            }
            Err(TryRecvError::Empty) => {}
        }

        let mut ok = true;
        for check in &checks.checks {
            // A positive per-check delay becomes the round delay from here
            // on, until another check overrides it.
            if let Some(ms) = check.delay.filter(|ms| *ms > 0) {
                delay = Duration::from_millis(ms);
            }
            if run_check(check).await == Some(false) {
                ok = false;
            }
        }

        let new_state = if ok { ServiceState::Up } else { ServiceState::Down };
        let state_changed = new_state != state;
        if state_changed {
            same_state_since = SystemTime::now();
            info!(service = %checks.service_name, up = ok, "service state changed");
        }
        state = new_state;

        let event = ServiceStateEvent {
            service: checks.service_name.clone(),
            endpoint: format!("{}:{}", endpoint_address, checks.endpoint_port),
            endpoint_info: checks.endpoint_info.clone(),
            is_up: ok,
            state_changed,
            same_state_since,
        };
        if events.send(OrbitEvent::ServiceState(event)).await.is_err() {
            debug!(service = %checks.service_name, "event sink closed, stopping worker");
            return;
        }

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_state::ServiceCheck;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn dummy_checks(name: &str, up: bool) -> ServiceChecks {
        ServiceChecks {
            service_name: name.to_string(),
            endpoint_port: 3500,
            checks: vec![ServiceCheck {
                check_type: "dummy".to_string(),
                dummy_result: up,
                ..Default::default()
            }],
            endpoint_info: None,
        }
    }

    fn spawn_worker(
        delay: Duration,
    ) -> (
        mpsc::Sender<ServiceChecks>,
        mpsc::Receiver<OrbitEvent>,
        tokio::task::JoinHandle<()>,
    ) {
        let (updates_tx, updates_rx) = mpsc::channel(1);
        let (events_tx, events_rx) = mpsc::channel(64);
        let handle = tokio::spawn(run_service_worker(
            updates_rx,
            events_tx,
            "10.0.0.1".to_string(),
            delay,
        ));
        (updates_tx, events_rx, handle)
    }

    async fn next_event(events: &mut mpsc::Receiver<OrbitEvent>) -> ServiceStateEvent {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed");
        let OrbitEvent::ServiceState(event) = event;
        event
    }

    #[tokio::test]
    async fn first_round_always_reports_state_change() {
        let (updates, mut events, _handle) = spawn_worker(Duration::from_millis(5));
        updates.send(dummy_checks("comet", true)).await.unwrap();

        let first = next_event(&mut events).await;
        assert!(first.is_up);
        assert!(first.state_changed);
        assert_eq!(first.service, "comet");
        assert_eq!(first.endpoint, "10.0.0.1:3500");

        let second = next_event(&mut events).await;
        assert!(second.is_up);
        assert!(!second.state_changed);
        assert_eq!(second.same_state_since, first.same_state_since);
    }

    #[tokio::test]
    async fn down_transition_advances_same_state_since() {
        let (updates, mut events, _handle) = spawn_worker(Duration::from_millis(5));
        updates.send(dummy_checks("comet", true)).await.unwrap();

        let up = next_event(&mut events).await;
        assert!(up.is_up);

        updates.send(dummy_checks("comet", false)).await.unwrap();
        // Skip any up rounds still in flight from before the update landed.
        let down = loop {
            let event = next_event(&mut events).await;
            assert!(event.same_state_since >= up.same_state_since);
            if !event.is_up {
                break event;
            }
        };
        assert!(down.state_changed);
        assert!(down.same_state_since > up.same_state_since);

        let still_down = next_event(&mut events).await;
        assert!(!still_down.is_up);
        assert!(!still_down.state_changed);
        assert_eq!(still_down.same_state_since, down.same_state_since);
    }

    #[tokio::test]
    async fn empty_check_list_counts_as_up() {
        let (updates, mut events, _handle) = spawn_worker(Duration::from_millis(5));
        updates
            .send(ServiceChecks {
                service_name: "comet".to_string(),
                endpoint_port: 3500,
                checks: Vec::new(),
                endpoint_info: None,
            })
            .await
            .unwrap();

        let event = next_event(&mut events).await;
        assert!(event.is_up);
    }

    #[tokio::test]
    async fn unrecognised_check_leaves_round_verdict_untouched() {
        let (updates, mut events, _handle) = spawn_worker(Duration::from_millis(5));
        updates
            .send(ServiceChecks {
                service_name: "comet".to_string(),
                endpoint_port: 3500,
                checks: vec![
                    ServiceCheck {
                        check_type: "dummy".to_string(),
                        dummy_result: false,
                        ..Default::default()
                    },
                    ServiceCheck {
                        check_type: "icmp".to_string(),
                        ..Default::default()
                    },
                ],
                endpoint_info: None,
            })
            .await
            .unwrap();

        // The failing dummy decides the round; the unknown check cannot
        // revive it.
        let event = next_event(&mut events).await;
        assert!(!event.is_up);
    }

    #[tokio::test]
    async fn worker_stops_when_update_channel_closes() {
        let (updates, mut events, handle) = spawn_worker(Duration::from_millis(5));
        updates.send(dummy_checks("comet", true)).await.unwrap();
        next_event(&mut events).await;

        drop(updates);
        timeout(WAIT, handle).await.expect("worker exits").unwrap();
    }

    #[tokio::test]
    async fn worker_stops_before_first_schedule_when_channel_closes() {
        let (updates, _events, handle) = spawn_worker(Duration::from_millis(5));
        drop(updates);
        timeout(WAIT, handle).await.expect("worker exits").unwrap();
    }

    #[tokio::test]
    async fn worker_stops_when_event_sink_closes() {
        let (updates, events, handle) = spawn_worker(Duration::from_millis(1));
        updates.send(dummy_checks("comet", true)).await.unwrap();
        drop(events);
        timeout(WAIT, handle).await.expect("worker exits").unwrap();
    }

    #[tokio::test]
    async fn per_check_delay_overrides_round_delay() {
        // Worker default would be one round per minute; the per-check delay
        // has to bring it down for this test to see a second event.
        let (updates, mut events, _handle) = spawn_worker(Duration::from_secs(60));
        updates
            .send(ServiceChecks {
                service_name: "comet".to_string(),
                endpoint_port: 3500,
                checks: vec![ServiceCheck {
                    check_type: "dummy".to_string(),
                    dummy_result: true,
                    delay: Some(5),
                    ..Default::default()
                }],
                endpoint_info: None,
            })
            .await
            .unwrap();

        next_event(&mut events).await;
        next_event(&mut events).await;
    }
}
