//! The state aggregator: merges the four partial report maps into one
//! authoritative per-interface view and republishes it wholesale on every
//! refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::reports::{
    DescriptionMap, StatusMap, SwitchportMap, VlanIndex, parse_descriptions, parse_status,
    parse_switchport, parse_vlan_brief,
};

/// The merged, display-ready record for one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedInterfaceState {
    pub name: String,
    pub description: String,
    pub mode: String,
    pub vlan: String,
    pub link_status: String,
}

/// One published aggregate. Snapshots are immutable once published; a new
/// refresh replaces the whole vector rather than patching rows, so a reader
/// never observes fields from two different device interrogations.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub interfaces: Arc<Vec<UnifiedInterfaceState>>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// A freshly parsed report of one kind, replacing the previous map of that
/// kind wholesale.
#[derive(Debug, Clone)]
pub enum ReportUpdate {
    Status(StatusMap),
    Switchport(SwitchportMap),
    Descriptions(DescriptionMap),
    VlanMembership(VlanIndex),
}

impl ReportUpdate {
    pub fn status(raw: &str) -> Self {
        ReportUpdate::Status(parse_status(raw))
    }
    pub fn switchport(raw: &str) -> Self {
        ReportUpdate::Switchport(parse_switchport(raw))
    }
    pub fn descriptions(raw: &str) -> Self {
        ReportUpdate::Descriptions(parse_descriptions(raw))
    }
    pub fn vlan_membership(raw: &str) -> Self {
        ReportUpdate::VlanMembership(parse_vlan_brief(raw))
    }
}

/// Merge the four partial maps. The status map drives the key set: an
/// interface the status report does not mention is not shown, even if the
/// other reports know it. Missing lookups fall back to the documented
/// defaults and never fail.
pub fn merge(
    status: &StatusMap,
    switchport: &SwitchportMap,
    descriptions: &DescriptionMap,
    vlans: &VlanIndex,
) -> Vec<UnifiedInterfaceState> {
    let mut rows: Vec<UnifiedInterfaceState> = status
        .iter()
        .map(|(name, record)| {
            let description = descriptions
                .get(name)
                .map(|d| d.text.clone())
                .unwrap_or_else(|| "N/A".to_string());
            let mode = switchport
                .get(name)
                .map(|s| s.mode.clone())
                .unwrap_or_else(|| "unknown".to_string());
            let vlan = vlans
                .get(name)
                .map(|ids| ids.join(","))
                .unwrap_or_else(|| "N/A".to_string());

            UnifiedInterfaceState {
                name: name.clone(),
                description,
                mode,
                vlan,
                link_status: record.status.clone(),
            }
        })
        .collect();

    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Owns the four partial maps and the published snapshot. All updates
/// arrive through [`StateAggregator::apply`] on a single consumer task, so
/// the maps are never mutated concurrently; readers only ever see whole
/// snapshots through the watch channel.
pub struct StateAggregator {
    status: StatusMap,
    switchport: SwitchportMap,
    descriptions: DescriptionMap,
    vlans: VlanIndex,
    tx: watch::Sender<Snapshot>,
}

impl StateAggregator {
    pub fn new() -> (Self, watch::Receiver<Snapshot>) {
        let (tx, rx) = watch::channel(Snapshot::default());
        (
            Self {
                status: StatusMap::new(),
                switchport: SwitchportMap::new(),
                descriptions: DescriptionMap::new(),
                vlans: VlanIndex::new(),
                tx,
            },
            rx,
        )
    }

    /// Replace one source map and republish the merged view. Publication
    /// does not wait for all four reports; whichever have arrived so far
    /// contribute, the rest fall back to defaults.
    pub fn apply(&mut self, update: ReportUpdate) {
        match update {
            ReportUpdate::Status(map) => self.status = map,
            ReportUpdate::Switchport(map) => self.switchport = map,
            ReportUpdate::Descriptions(map) => self.descriptions = map,
            ReportUpdate::VlanMembership(map) => self.vlans = map,
        }

        let rows = merge(&self.status, &self.switchport, &self.descriptions, &self.vlans);
        debug!("Republishing merged state with {} interfaces", rows.len());
        self.tx.send_replace(Snapshot {
            interfaces: Arc::new(rows),
            refreshed_at: Some(Utc::now()),
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}
