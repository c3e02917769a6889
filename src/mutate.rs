//! Translates requested interface mutations into the ordered IOS
//! configuration lines that carry them out.

use serde::{Deserialize, Serialize};

use crate::SwitchHandError;
use crate::reports::normalize_interface_name;

/// Explicitly configurable switchport modes. Unlike
/// [`crate::reports::PortMode`] there is no unknown variant: a mutation
/// always names the mode it wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfiguredMode {
    Access,
    Trunk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    BringUp,
    BringDown,
    /// Access VLAN ID, accepted as an opaque string - VLAN existence is a
    /// device-side concern surfaced by the post-mutation refresh.
    SetVlan(String),
    SetMode(ConfiguredMode),
    SetDescription(String),
    /// Trunk allowed-VLAN list, verbatim ("1,10,20-29").
    SetAllowedVlans(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    targets: Vec<String>,
    pub kind: MutationKind,
}

impl MutationRequest {
    /// Build a request over one or more target interfaces. Target names are
    /// normalized on ingestion; an empty target set is rejected here so the
    /// synthesizer can stay infallible.
    pub fn new(
        targets: impl IntoIterator<Item = impl AsRef<str>>,
        kind: MutationKind,
    ) -> Result<Self, SwitchHandError> {
        let targets: Vec<String> = targets
            .into_iter()
            .map(|t| normalize_interface_name(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        if targets.is_empty() {
            return Err(SwitchHandError::NoTargetsSpecified);
        }
        Ok(Self { targets, kind })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

/// Produce the exact ordered command sequence for a mutation. Targets are
/// processed in request order, each scoped by its own `interface` line, all
/// within what will become a single configuration transaction.
pub fn synthesize(request: &MutationRequest) -> Vec<String> {
    let mut lines = Vec::with_capacity(request.targets.len() * 3);

    for target in &request.targets {
        lines.push(format!("interface {target}"));
        match &request.kind {
            MutationKind::BringUp => lines.push("no shutdown".to_string()),
            MutationKind::BringDown => lines.push("shutdown".to_string()),
            MutationKind::SetVlan(id) => {
                lines.push(format!("switchport access vlan {id}"));
            }
            MutationKind::SetMode(ConfiguredMode::Access) => {
                lines.push("switchport mode access".to_string());
            }
            MutationKind::SetMode(ConfiguredMode::Trunk) => {
                // encapsulation must be pinned before the mode flips, or
                // older IOS rejects the trunk line outright
                lines.push("switchport trunk encapsulation dot1q".to_string());
                lines.push("switchport mode trunk".to_string());
            }
            MutationKind::SetDescription(text) => {
                let text = if text.trim().is_empty() { "Null" } else { text };
                lines.push(format!("description {text}"));
            }
            MutationKind::SetAllowedVlans(list) => {
                lines.push(format!("switchport trunk allowed vlan {list}"));
            }
        }
    }

    lines
}
