//! End-to-end tests running the coordinator against a fixture-backed mock
//! device, from raw report text to the published snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::dispatch::{Coordinator, OperationKind, OperationOutcome};
use crate::mutate::{ConfiguredMode, MutationKind, MutationRequest};
use crate::session::{CliConnector, CliSession};
use crate::setup_test_logging;
use crate::ssh::SshError;

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("src/tests/{}", name)).expect("Failed to read fixture")
}

struct MockDevice {
    reject_config: bool,
    applied_lines: Arc<Mutex<Vec<Vec<String>>>>,
    elevated: bool,
}

#[async_trait]
impl CliSession for MockDevice {
    async fn send_exec(&mut self, command: &str) -> Result<String, SshError> {
        match command {
            "show interface status" => Ok(fixture("status_report.txt")),
            "show interface switchport" => Ok(fixture("switchport_report.txt")),
            "show interface description" => Ok(fixture("descriptions.txt")),
            "show vlan brief" => Ok(fixture("vlan_brief.txt")),
            other => Err(SshError::Command(format!(
                "% Invalid input detected: {other}"
            ))),
        }
    }

    async fn send_config_set(&mut self, lines: &[String]) -> Result<String, SshError> {
        assert!(self.elevated, "config set reached an unelevated session");
        if self.reject_config {
            return Err(SshError::Command(
                "% Invalid input detected at '^' marker.".to_string(),
            ));
        }
        self.applied_lines
            .lock()
            .expect("lock poisoned")
            .push(lines.to_vec());
        Ok("switch01#".to_string())
    }

    async fn elevate(&mut self) -> Result<(), SshError> {
        self.elevated = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SshError> {
        Ok(())
    }
}

struct MockConnector {
    reject_config: bool,
    applied_lines: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockConnector {
    fn new(reject_config: bool) -> Self {
        Self {
            reject_config,
            applied_lines: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl CliConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn CliSession>, SshError> {
        Ok(Box::new(MockDevice {
            reject_config: self.reject_config,
            applied_lines: self.applied_lines.clone(),
            elevated: false,
        }))
    }
}

async fn next_outcome(outcomes_rx: &mut UnboundedReceiver<OperationOutcome>) -> OperationOutcome {
    tokio::time::timeout(Duration::from_secs(5), outcomes_rx.recv())
        .await
        .expect("timed out waiting for an operation outcome")
        .expect("outcome channel closed early")
}

async fn assert_quiescent(outcomes_rx: &mut UnboundedReceiver<OperationOutcome>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        outcomes_rx.try_recv().is_err(),
        "coordinator produced an unexpected extra outcome"
    );
}

#[tokio::test]
async fn test_refresh_builds_unified_snapshot_from_fixtures() {
    setup_test_logging();
    let connector = Arc::new(MockConnector::new(false));
    let (coordinator, snapshot_rx, mut outcomes_rx) = Coordinator::spawn(connector);

    let ids = coordinator.request_refresh();
    assert_eq!(ids.len(), 4);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let outcome = next_outcome(&mut outcomes_rx).await;
        assert!(outcome.result.is_ok());
        assert!(matches!(outcome.kind, OperationKind::Fetch(_)));
        assert!(ids.contains(&outcome.id), "outcome for an unknown id");
        assert!(!seen.contains(&outcome.id), "duplicate outcome for one id");
        seen.push(outcome.id);
    }
    assert_quiescent(&mut outcomes_rx).await;

    let snapshot = snapshot_rx.borrow().clone();
    assert!(snapshot.refreshed_at.is_some());
    // Gi1/0/5 and Gi1/0/6 appear only in the VLAN report and must not
    // surface; the status report drives the interface set
    assert_eq!(snapshot.interfaces.len(), 4);

    let names: Vec<&str> = snapshot
        .interfaces
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["Gi1/0/1", "Gi1/0/2", "Gi1/0/3", "Gi1/0/4"]);

    let uplink = &snapshot.interfaces[0];
    assert_eq!(uplink.link_status, "connected");
    assert_eq!(uplink.mode, "trunk");
    assert_eq!(uplink.vlan, "1");
    assert_eq!(uplink.description, "uplink to core");

    let workstation = &snapshot.interfaces[1];
    assert_eq!(workstation.link_status, "notconnect");
    assert_eq!(workstation.mode, "static access");
    assert_eq!(workstation.vlan, "10");
    assert_eq!(workstation.description, "Null");

    let printer = &snapshot.interfaces[2];
    assert_eq!(printer.link_status, "disabled");
    assert_eq!(printer.description, "printer bay");
}

#[tokio::test]
async fn test_mutation_applies_lines_then_refreshes_once() {
    setup_test_logging();
    let connector = Arc::new(MockConnector::new(false));
    let applied_lines = connector.applied_lines.clone();
    let (coordinator, snapshot_rx, mut outcomes_rx) = Coordinator::spawn(connector);

    let request = MutationRequest::new(
        ["gi1/0/1", "gi1/0/2"],
        MutationKind::SetMode(ConfiguredMode::Trunk),
    )
    .expect("valid request");
    let id = coordinator.request_mutation(request);

    let outcome = next_outcome(&mut outcomes_rx).await;
    assert_eq!(outcome.id, id);
    assert_eq!(outcome.kind, OperationKind::Mutation);
    assert!(outcome.result.is_ok());

    // the transaction carried the synthesized lines, normalized targets
    // included, as one batch
    let batches = applied_lines.lock().expect("lock poisoned").clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        vec![
            "interface Gi1/0/1",
            "switchport trunk encapsulation dot1q",
            "switchport mode trunk",
            "interface Gi1/0/2",
            "switchport trunk encapsulation dot1q",
            "switchport mode trunk",
        ]
    );

    // exactly one full refresh follows
    for _ in 0..4 {
        let outcome = next_outcome(&mut outcomes_rx).await;
        assert!(matches!(outcome.kind, OperationKind::Fetch(_)));
        assert!(outcome.result.is_ok());
    }
    assert_quiescent(&mut outcomes_rx).await;

    assert_eq!(snapshot_rx.borrow().interfaces.len(), 4);
}

#[tokio::test]
async fn test_rejected_mutation_reports_failure_without_refresh() {
    setup_test_logging();
    let connector = Arc::new(MockConnector::new(true));
    let (coordinator, snapshot_rx, mut outcomes_rx) = Coordinator::spawn(connector);

    let request = MutationRequest::new(["Gi1/0/1"], MutationKind::SetVlan("9999".to_string()))
        .expect("valid request");
    let id = coordinator.request_mutation(request);

    let outcome = next_outcome(&mut outcomes_rx).await;
    assert_eq!(outcome.id, id);
    assert_eq!(outcome.kind, OperationKind::Mutation);
    let err = outcome.result.expect_err("mutation should fail");
    assert!(err.contains("% Invalid input"), "device error lost: {err}");

    // no refresh, no state change
    assert_quiescent(&mut outcomes_rx).await;
    assert!(snapshot_rx.borrow().interfaces.is_empty());
    assert!(snapshot_rx.borrow().refreshed_at.is_none());
}

#[tokio::test]
async fn test_concurrent_refreshes_each_yield_four_outcomes() {
    setup_test_logging();
    let connector = Arc::new(MockConnector::new(false));
    let (coordinator, _snapshot_rx, mut outcomes_rx) = Coordinator::spawn(connector);

    let mut ids = coordinator.request_refresh();
    ids.extend(coordinator.request_refresh());
    assert_eq!(ids.len(), 8);

    let mut seen = Vec::new();
    for _ in 0..8 {
        let outcome = next_outcome(&mut outcomes_rx).await;
        assert!(ids.contains(&outcome.id));
        assert!(!seen.contains(&outcome.id));
        seen.push(outcome.id);
    }
    assert_quiescent(&mut outcomes_rx).await;
}
