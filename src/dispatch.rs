//! The coordinator: fans device interrogations and mutations out onto
//! worker tasks, funnels their results through a single consumer loop into
//! the state aggregator, and reports exactly one outcome per operation.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::mutate::{MutationRequest, synthesize};
use crate::session::{CliConnector, run_config_transaction, run_exec_commands};
use crate::state::{ReportUpdate, Snapshot, StateAggregator};

/// The four read-only reports one full refresh interrogates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Status,
    Switchport,
    Descriptions,
    VlanBrief,
}

impl FetchKind {
    pub const ALL: [FetchKind; 4] = [
        FetchKind::Status,
        FetchKind::Switchport,
        FetchKind::Descriptions,
        FetchKind::VlanBrief,
    ];

    pub fn command(self) -> &'static str {
        match self {
            FetchKind::Status => "show interface status",
            FetchKind::Switchport => "show interface switchport",
            FetchKind::Descriptions => "show interface description",
            FetchKind::VlanBrief => "show vlan brief",
        }
    }

    fn update(self, raw: &str) -> ReportUpdate {
        match self {
            FetchKind::Status => ReportUpdate::status(raw),
            FetchKind::Switchport => ReportUpdate::switchport(raw),
            FetchKind::Descriptions => ReportUpdate::descriptions(raw),
            FetchKind::VlanBrief => ReportUpdate::vlan_membership(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Fetch(FetchKind),
    Mutation,
}

/// Terminal result of one submitted operation. Every operation yields
/// exactly one of these, success or failure, fetch or mutation.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub id: Uuid,
    pub kind: OperationKind,
    pub result: Result<String, String>,
}

enum Event {
    FetchDone {
        id: Uuid,
        kind: FetchKind,
        result: Result<String, crate::ssh::SshError>,
    },
    MutationDone {
        id: Uuid,
        result: Result<String, crate::ssh::SshError>,
    },
}

/// Dispatches operations against one device and owns its aggregated state.
///
/// Worker tasks never touch the aggregator; they post completion events to
/// the consumer loop, which is the only writer. Readers observe state
/// through the watch channel returned by [`Coordinator::spawn`].
pub struct Coordinator {
    connector: Arc<dyn CliConnector>,
    events_tx: mpsc::UnboundedSender<Event>,
}

impl Coordinator {
    /// Start the consumer loop and hand back the coordinator plus its two
    /// output channels: the merged-state watch and the per-operation
    /// outcome stream.
    pub fn spawn(
        connector: Arc<dyn CliConnector>,
    ) -> (
        Self,
        watch::Receiver<Snapshot>,
        mpsc::UnboundedReceiver<OperationOutcome>,
    ) {
        let (mut aggregator, snapshot_rx) = StateAggregator::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        // the consumer loop is the only task that ever touches the
        // aggregator. It holds only a weak sender to its own receiver:
        // once the coordinator and any in-flight workers are gone,
        // recv() returns None and the loop winds down instead of
        // keeping itself alive through its own channel.
        let loop_events_tx = events_tx.downgrade();
        let loop_connector = connector.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                handle_event(
                    event,
                    &mut aggregator,
                    &loop_events_tx,
                    &outcomes_tx,
                    &loop_connector,
                );
            }
        });

        (
            Self {
                connector,
                events_tx,
            },
            snapshot_rx,
            outcomes_rx,
        )
    }

    /// Kick off one full refresh: all four reports fetched concurrently,
    /// each over its own session. Returns the operation ids in
    /// [`FetchKind::ALL`] order.
    pub fn request_refresh(&self) -> Vec<Uuid> {
        FetchKind::ALL
            .iter()
            .map(|kind| spawn_fetch(self.connector.clone(), *kind, self.events_tx.clone()))
            .collect()
    }

    /// Submit one mutation. Synthesis happens up front; the configuration
    /// transaction runs on its own task and session.
    pub fn request_mutation(&self, request: MutationRequest) -> Uuid {
        let id = Uuid::new_v4();
        let connector = self.connector.clone();
        let events_tx = self.events_tx.clone();

        debug!(
            "Dispatching mutation {} against {} interface(s)",
            id,
            request.targets().len()
        );
        tokio::spawn(async move {
            let lines = synthesize(&request);
            let result = run_config_transaction(connector.as_ref(), &lines).await;
            let _ = events_tx.send(Event::MutationDone { id, result });
        });
        id
    }
}

fn spawn_fetch(
    connector: Arc<dyn CliConnector>,
    kind: FetchKind,
    events_tx: mpsc::UnboundedSender<Event>,
) -> Uuid {
    let id = Uuid::new_v4();
    debug!("Dispatching fetch {} ({})", id, kind.command());
    tokio::spawn(async move {
        let result = run_exec_commands(connector.as_ref(), &[kind.command().to_string()]).await;
        let _ = events_tx.send(Event::FetchDone { id, kind, result });
    });
    id
}

fn handle_event(
    event: Event,
    aggregator: &mut StateAggregator,
    events_tx: &mpsc::WeakUnboundedSender<Event>,
    outcomes_tx: &mpsc::UnboundedSender<OperationOutcome>,
    connector: &Arc<dyn CliConnector>,
) {
    match event {
        Event::FetchDone { id, kind, result } => match result {
            Ok(raw) => {
                aggregator.apply(kind.update(&raw));
                let _ = outcomes_tx.send(OperationOutcome {
                    id,
                    kind: OperationKind::Fetch(kind),
                    result: Ok(raw),
                });
            }
            Err(err) => {
                // the previous map of this kind stays in place; stale
                // data beats a half-blanked view
                warn!("Fetch {} ({}) failed: {}", id, kind.command(), err);
                let _ = outcomes_tx.send(OperationOutcome {
                    id,
                    kind: OperationKind::Fetch(kind),
                    result: Err(err.to_string()),
                });
            }
        },
        Event::MutationDone { id, result } => match result {
            Ok(output) => {
                debug!("Mutation {} applied, refreshing device state", id);
                let _ = outcomes_tx.send(OperationOutcome {
                    id,
                    kind: OperationKind::Mutation,
                    result: Ok(output),
                });
                match events_tx.upgrade() {
                    Some(events_tx) => {
                        for kind in FetchKind::ALL {
                            spawn_fetch(connector.clone(), kind, events_tx.clone());
                        }
                    }
                    None => debug!("Coordinator dropped, skipping post-mutation refresh"),
                }
            }
            Err(err) => {
                // no refresh after a failed mutation; the device was not
                // (knowably) changed
                warn!("Mutation {} failed: {}", id, err);
                let _ = outcomes_tx.send(OperationOutcome {
                    id,
                    kind: OperationKind::Mutation,
                    result: Err(err.to_string()),
                });
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutate::MutationKind;
    use crate::session::CliSession;
    use crate::ssh::SshError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FakeSession {
        fail_config: bool,
    }

    #[async_trait]
    impl CliSession for FakeSession {
        async fn send_exec(&mut self, command: &str) -> Result<String, SshError> {
            let output = match command {
                "show interface status" => {
                    "Port      Name   Status       Vlan\nGi1/0/1          connected    trunk  a-full a-1000\n"
                }
                "show interface switchport" => {
                    "Name: Gi1/0/1\nAdministrative Mode: trunk\nAccess Mode VLAN: 1 (default)\n"
                }
                "show interface description" => {
                    "Interface Status Protocol Description\nGi1/0/1 up up uplink to core\n"
                }
                "show vlan brief" => {
                    "1    default    active    Gi1/0/2\n10   users      active    Gi1/0/1\n"
                }
                other => return Err(SshError::Command(format!("unexpected: {other}"))),
            };
            Ok(output.to_string())
        }

        async fn send_config_set(&mut self, _lines: &[String]) -> Result<String, SshError> {
            if self.fail_config {
                Err(SshError::Command("% Invalid input detected".to_string()))
            } else {
                Ok("applied".to_string())
            }
        }

        async fn elevate(&mut self) -> Result<(), SshError> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), SshError> {
            Ok(())
        }
    }

    struct FakeConnector {
        fail_config: bool,
    }

    #[async_trait]
    impl CliConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn CliSession>, SshError> {
            Ok(Box::new(FakeSession {
                fail_config: self.fail_config,
            }))
        }
    }

    async fn collect_outcomes(
        outcomes_rx: &mut mpsc::UnboundedReceiver<OperationOutcome>,
        count: usize,
    ) -> Vec<OperationOutcome> {
        let mut outcomes = Vec::with_capacity(count);
        for _ in 0..count {
            let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes_rx.recv())
                .await
                .expect("timed out waiting for an operation outcome")
                .expect("outcome channel closed early");
            outcomes.push(outcome);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_refresh_yields_four_outcomes_and_populates_state() {
        let (coordinator, snapshot_rx, mut outcomes_rx) =
            Coordinator::spawn(Arc::new(FakeConnector { fail_config: false }));

        let ids = coordinator.request_refresh();
        assert_eq!(ids.len(), 4);

        let outcomes = collect_outcomes(&mut outcomes_rx, 4).await;
        for outcome in &outcomes {
            assert!(outcome.result.is_ok());
            assert!(matches!(outcome.kind, OperationKind::Fetch(_)));
            assert!(ids.contains(&outcome.id));
        }

        let snapshot = snapshot_rx.borrow().clone();
        assert_eq!(snapshot.interfaces.len(), 1);
        let row = &snapshot.interfaces[0];
        assert_eq!(row.name, "Gi1/0/1");
        assert_eq!(row.link_status, "connected");
        assert_eq!(row.mode, "trunk");
        assert_eq!(row.description, "uplink to core");
        assert_eq!(row.vlan, "10");
    }

    #[tokio::test]
    async fn test_successful_mutation_triggers_one_refresh() {
        let (coordinator, _snapshot_rx, mut outcomes_rx) =
            Coordinator::spawn(Arc::new(FakeConnector { fail_config: false }));

        let request =
            MutationRequest::new(["Gi1/0/1"], MutationKind::SetVlan("10".to_string())).unwrap();
        let id = coordinator.request_mutation(request);

        // one mutation outcome, then exactly the four refresh fetches
        let outcomes = collect_outcomes(&mut outcomes_rx, 5).await;
        assert_eq!(outcomes[0].id, id);
        assert_eq!(outcomes[0].kind, OperationKind::Mutation);
        assert!(outcomes[0].result.is_ok());

        let fetched: Vec<FetchKind> = outcomes[1..]
            .iter()
            .map(|o| match o.kind {
                OperationKind::Fetch(kind) => kind,
                OperationKind::Mutation => panic!("unexpected second mutation outcome"),
            })
            .collect();
        for kind in FetchKind::ALL {
            assert!(fetched.contains(&kind));
        }

        // and nothing further
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(outcomes_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_consumer_loop_stops_after_coordinator_dropped() {
        let (coordinator, _snapshot_rx, mut outcomes_rx) =
            Coordinator::spawn(Arc::new(FakeConnector { fail_config: false }));

        let ids = coordinator.request_refresh();
        drop(coordinator);

        // in-flight fetches still run to completion and deliver outcomes
        let outcomes = collect_outcomes(&mut outcomes_rx, ids.len()).await;
        assert!(outcomes.iter().all(|o| o.result.is_ok()));

        // with the coordinator gone and no workers left, the loop winds
        // down and the outcome stream closes
        let end = tokio::time::timeout(Duration::from_secs(5), outcomes_rx.recv())
            .await
            .expect("consumer loop kept the outcome channel open");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_failed_mutation_triggers_no_refresh() {
        let (coordinator, snapshot_rx, mut outcomes_rx) =
            Coordinator::spawn(Arc::new(FakeConnector { fail_config: true }));

        let request = MutationRequest::new(["Gi1/0/1"], MutationKind::BringDown).unwrap();
        let id = coordinator.request_mutation(request);

        let outcomes = collect_outcomes(&mut outcomes_rx, 1).await;
        assert_eq!(outcomes[0].id, id);
        assert!(outcomes[0].result.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(outcomes_rx.try_recv().is_err());
        assert!(snapshot_rx.borrow().interfaces.is_empty());
    }
}
