//! Parsers for the four switch report families.
//!
//! Each parser is a pure function from one raw `show` output blob to a map
//! keyed by normalized interface name. Device text formats drift between
//! firmware versions, so every parser skips lines it does not recognize
//! rather than failing the whole report.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Forwarding mode of a switchport, classified from the Vlan column of
/// `show interface status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortMode {
    Access,
    Trunk,
    Unknown,
}

impl std::fmt::Display for PortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortMode::Access => write!(f, "access"),
            PortMode::Trunk => write!(f, "trunk"),
            PortMode::Unknown => write!(f, "unknown"),
        }
    }
}

impl PortMode {
    /// A purely numeric Vlan column means an access port, the literal
    /// `trunk` token means a trunk, anything else (`routed`, `unassigned`)
    /// is unknown.
    pub fn classify(vlan_field: &str) -> Self {
        if !vlan_field.is_empty() && vlan_field.chars().all(|c| c.is_ascii_digit()) {
            PortMode::Access
        } else if vlan_field.eq_ignore_ascii_case("trunk") {
            PortMode::Trunk
        } else {
            PortMode::Unknown
        }
    }
}

/// One row of `show interface status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatusRecord {
    /// Lower-cased status token, verbatim ("connected", "notconnect",
    /// "disabled", "err-disabled", ...)
    pub status: String,
    /// Raw Vlan column token ("10", "trunk", "routed", ...)
    pub vlan_field: String,
    pub mode: PortMode,
}

/// One interface block of `show interface switchport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchportRecord {
    pub mode: String,
    pub access_vlan: String,
}

impl Default for SwitchportRecord {
    fn default() -> Self {
        Self {
            mode: "unknown".to_string(),
            access_vlan: "N/A".to_string(),
        }
    }
}

/// One row of `show interface description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionRecord {
    pub text: String,
}

pub type StatusMap = HashMap<String, LinkStatusRecord>;
pub type SwitchportMap = HashMap<String, SwitchportRecord>;
pub type DescriptionMap = HashMap<String, DescriptionRecord>;
/// Inverse of the `show vlan brief` membership table: interface -> VLAN IDs.
pub type VlanIndex = HashMap<String, Vec<String>>;

/// Normalize an interface name for use as the join key across all four
/// reports: trim, then canonicalize the ASCII case of the two-letter vendor
/// prefix so `gi1/0/1` and `GI1/0/1` both become `Gi1/0/1`.
pub fn normalize_interface_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match i {
            0 => out.push(c.to_ascii_uppercase()),
            1 if c.is_ascii_alphabetic() => out.push(c.to_ascii_lowercase()),
            _ => out.push(c),
        }
    }
    out
}

static SEPARATOR_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[- ]+$").ok());

fn is_separator(line: &str) -> bool {
    SEPARATOR_LINE.as_ref().is_some_and(|re| re.is_match(line))
}

/// Parse `show interface status`.
///
/// Data lines carry at least interface, status and Vlan columns; the
/// remainder (duplex/speed/type) is ignored. Header and separator lines are
/// skipped by pattern, short lines are skipped silently.
pub fn parse_status(input: &str) -> StatusMap {
    let mut map = StatusMap::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Port") || is_separator(line) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let vlan_field = parts[2].to_string();
        let record = LinkStatusRecord {
            status: parts[1].to_lowercase(),
            mode: PortMode::classify(&vlan_field),
            vlan_field,
        };
        map.insert(normalize_interface_name(parts[0]), record);
    }

    map
}

/// Parse `show interface switchport`.
///
/// The report is block-structured: a `Name:` line opens an interface block,
/// and the mode / access-VLAN lines inside it fill the record. Interfaces
/// without an `Access Mode VLAN` line keep the "N/A" default.
pub fn parse_switchport(input: &str) -> SwitchportMap {
    let mut map = SwitchportMap::new();
    let mut current: Option<String> = None;

    for line in input.lines() {
        let line = line.trim();

        if let Some(name) = line.strip_prefix("Name:") {
            let key = normalize_interface_name(name);
            map.insert(key.clone(), SwitchportRecord::default());
            current = Some(key);
            continue;
        }

        let Some(key) = current.as_ref() else {
            continue;
        };

        if let Some(mode) = line.strip_prefix("Administrative Mode:") {
            if let Some(record) = map.get_mut(key) {
                record.mode = mode.trim().to_string();
            }
        } else if let Some(vlan) = line.strip_prefix("Access Mode VLAN:") {
            // "10 (VLAN0010)" - only the leading token is the VLAN ID
            if let Some(token) = vlan.split_whitespace().next()
                && let Some(record) = map.get_mut(key)
            {
                record.access_vlan = token.to_string();
            }
        }
    }

    map
}

/// Parse `show interface description`.
///
/// The interface is the first token; Status and Protocol occupy the second
/// and third columns, so the description is everything from the fourth
/// column onward. Rows with no description default to the "Null" sentinel.
pub fn parse_descriptions(input: &str) -> DescriptionMap {
    let mut map = DescriptionMap::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Interface") || is_separator(line) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(name) = parts.first() else {
            continue;
        };

        let text = if parts.len() > 3 {
            parts[3..].join(" ")
        } else {
            "Null".to_string()
        };

        map.insert(normalize_interface_name(name), DescriptionRecord { text });
    }

    map
}

/// A token that plausibly names a switchport: a short alphabetic vendor
/// prefix followed by a digit, with only slot/port punctuation after it.
/// This picks ports out of a `show vlan brief` row without relying on
/// column offsets, which drift between firmware versions.
static PORT_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,}\d[\d/.]*$").ok());

fn looks_like_port(token: &str) -> bool {
    PORT_TOKEN.as_ref().is_some_and(|re| re.is_match(token))
}

/// Parse `show vlan brief` into the inverse index (interface -> VLAN IDs).
///
/// A data row starts with a numeric VLAN ID; its port list is the
/// comma-separated tail of the row. Wrapped continuation lines (leading
/// whitespace, no VLAN ID) extend the previous row's membership.
pub fn parse_vlan_brief(input: &str) -> VlanIndex {
    let mut index = VlanIndex::new();
    let mut current_vlan: Option<String> = None;

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("VLAN") || is_separator(trimmed) {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let Some(first) = parts.first() else {
            continue;
        };

        let ports: &[&str] = if first.chars().all(|c| c.is_ascii_digit()) {
            current_vlan = Some((*first).to_string());
            &parts[1..]
        } else if line.starts_with(char::is_whitespace) && current_vlan.is_some() {
            // wrapped port list continuing the previous VLAN row
            &parts[..]
        } else {
            continue;
        };

        let Some(vlan) = current_vlan.clone() else {
            continue;
        };

        for token in ports {
            let token = token.trim_matches(',');
            if !looks_like_port(token) {
                continue;
            }
            index
                .entry(normalize_interface_name(token))
                .or_default()
                .push(vlan.clone());
        }
    }

    index
}
