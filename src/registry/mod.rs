//! Managed-registry seam.
//!
//! The reconciliation engine only ever talks to the registry through the
//! [`Registry`] trait: read-only lookups, device actions, and a scoped
//! [`RegistryTxn`] for mutations with commit-or-rollback on every exit path.
//! `restconf` is the production pass-through client; `memory` backs tests
//! and dry runs.

pub mod memory;
pub mod restconf;

use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::types::{AdminState, DriverFamily, Provenance};
use crate::error::RegistryError;

/// A device entry as stored in (or intended for) the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    pub description: String,
    pub auth_group: String,
    pub driver_id: String,
    pub family: DriverFamily,
    pub protocol: String,
    pub admin_state: AdminState,
    pub provenance: Option<Provenance>,
    /// Driver-specific settings applied by post-configuration hooks.
    #[serde(default)]
    pub extra_settings: Vec<(String, String)>,
}

/// A connection descriptor declared by a driver package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub name: String,
}

/// What a driver package declares about how it connects. A driver exposing
/// a cli descriptor is family cli even if it also carries a generic one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverCapability {
    pub cli: Option<ConnectionDescriptor>,
    pub generic: Option<ConnectionDescriptor>,
}

impl DriverCapability {
    pub fn family(&self) -> Option<DriverFamily> {
        if self.cli.is_some() {
            Some(DriverFamily::Cli)
        } else if self.generic.is_some() {
            Some(DriverFamily::Generic)
        } else {
            None
        }
    }
}

/// Result of a registry device action (connect, fetch host keys, sync).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub result: bool,
    pub info: Option<String>,
}

impl ActionOutcome {
    pub fn describe(&self) -> String {
        match &self.info {
            Some(info) => format!("{} {}", self.result, info),
            None => self.result.to_string(),
        }
    }
}

/// The managed registry as seen by the reconciliation engine.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Look up an entry by name. Absence is a normal result, not an error.
    async fn lookup(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError>;

    /// Declared connection capability of a driver package.
    async fn driver_capability(&self, driver_id: &str)
        -> Result<DriverCapability, RegistryError>;

    /// Open a scoped transaction for mutations. Nothing reaches the registry
    /// before `commit`; dropping or rolling back discards all staged writes.
    async fn begin(&self) -> Result<Box<dyn RegistryTxn>, RegistryError>;

    async fn refresh_host_keys(&self, name: &str) -> Result<ActionOutcome, RegistryError>;

    async fn test_connectivity(&self, name: &str) -> Result<ActionOutcome, RegistryError>;

    async fn sync_state(&self, name: &str) -> Result<ActionOutcome, RegistryError>;
}

/// One bounded write operation against the registry.
#[async_trait]
pub trait RegistryTxn: Send {
    /// Add `device` to `group`, creating the group if needed. Adding the
    /// same member twice must not duplicate the membership.
    async fn ensure_group_membership(
        &mut self,
        group: &str,
        device: &str,
    ) -> Result<(), RegistryError>;

    async fn create_or_update(&mut self, entry: &RegistryEntry) -> Result<(), RegistryError>;

    async fn commit(self: Box<Self>) -> Result<(), RegistryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ConnectionDescriptor {
        ConnectionDescriptor {
            name: name.to_string(),
        }
    }

    #[test]
    fn cli_descriptor_takes_precedence() {
        let cap = DriverCapability {
            cli: Some(descriptor("cisco-ios-cli")),
            generic: Some(descriptor("cisco-ios-gnmi")),
        };
        assert_eq!(cap.family(), Some(DriverFamily::Cli));
    }

    #[test]
    fn generic_only_and_none() {
        let cap = DriverCapability {
            cli: None,
            generic: Some(descriptor("f5-bigip-gen")),
        };
        assert_eq!(cap.family(), Some(DriverFamily::Generic));
        assert_eq!(DriverCapability::default().family(), None);
    }
}
