use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device or virtual machine as reported by the inventory source.
/// Immutable once fetched; owned by the client for one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub name: String,
    pub kind: RecordKind,
    /// Lifecycle status as reported on the wire. Parsed (and rejected if
    /// unrecognized) by the classification policy, not at fetch time.
    pub status: String,
    pub primary_address: Option<IpAddr>,
    pub role_name: String,
    /// Hardware model; physical records only.
    pub type_model: Option<String>,
    pub tenant_name: Option<String>,
    /// API URL of the record, kept for provenance.
    pub source_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Physical,
    Virtual,
}

/// Operational lock state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminState {
    Unlocked,
    Locked,
    SouthboundLocked,
    /// The record must not be provisioned; an existing entry is stale.
    Excluded,
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdminState::Unlocked => "unlocked",
            AdminState::Locked => "locked",
            AdminState::SouthboundLocked => "southbound-locked",
            AdminState::Excluded => "excluded",
        };
        f.write_str(s)
    }
}

impl FromStr for AdminState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unlocked" => Ok(AdminState::Unlocked),
            "locked" => Ok(AdminState::Locked),
            "southbound-locked" => Ok(AdminState::SouthboundLocked),
            "excluded" => Ok(AdminState::Excluded),
            other => Err(format!("unknown admin-state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverFamily {
    Cli,
    Generic,
}

impl fmt::Display for DriverFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverFamily::Cli => f.write_str("cli"),
            DriverFamily::Generic => f.write_str("generic"),
        }
    }
}

/// Driver/protocol derivation for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub driver_id: String,
    pub family: DriverFamily,
    pub protocol: String,
    pub port: Option<u16>,
}

/// Where a registry entry came from: web and API URLs of the inventory
/// record plus the moment and configuration path that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub web: String,
    pub api: String,
    pub when: DateTime<Utc>,
    pub source: String,
}

impl Provenance {
    /// The web URL is the record's API URL with the `/api` segment removed,
    /// matching how the inventory source exposes its UI.
    pub fn from_record_url(api_url: &str, source: &str) -> Self {
        Self {
            web: api_url.replacen("/api", "", 1),
            api: api_url.to_string(),
            when: Utc::now(),
            source: source.to_string(),
        }
    }
}

/// Inventory source version details from the availability probe. `version`
/// is absent when the source lacks a status endpoint and reachability was
/// confirmed by a minimal record fetch instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: Option<String>,
    pub summary: String,
}

/// Output of every reconciliation operation: an overall outcome and an
/// ordered human-readable message log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub success: bool,
    pub messages: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            success: true,
            messages: Vec::new(),
        }
    }

    /// A report that failed before any processing happened.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            messages: vec![message.into()],
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Append a message and downgrade the overall outcome.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
        self.success = false;
    }

    pub fn render(&self) -> String {
        self.messages.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_state_round_trips_through_display() {
        for s in ["unlocked", "locked", "southbound-locked", "excluded"] {
            let state: AdminState = s.parse().unwrap();
            assert_eq!(state.to_string(), s);
        }
        assert!("online".parse::<AdminState>().is_err());
    }

    #[test]
    fn provenance_strips_api_segment_once() {
        let p = Provenance::from_record_url(
            "https://netbox.example.com/api/dcim/devices/17/",
            "/netsync/target{lab}",
        );
        assert_eq!(p.web, "https://netbox.example.com/dcim/devices/17/");
        assert_eq!(p.api, "https://netbox.example.com/api/dcim/devices/17/");
    }

    #[test]
    fn report_fail_downgrades_success() {
        let mut report = Report::new();
        report.push("ok line");
        assert!(report.success);
        report.fail("bad line");
        assert!(!report.success);
        assert_eq!(report.render(), "ok line\nbad line");
    }
}
