//! In-memory registry with staged-commit transactions.
//!
//! Backs the engine tests and `--dry-run` style experimentation. Writes are
//! buffered in the transaction and only become visible on commit, the same
//! contract the RESTCONF client provides.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    ActionOutcome, DriverCapability, Registry, RegistryEntry, RegistryTxn,
};
use crate::error::RegistryError;

#[derive(Default)]
struct State {
    entries: HashMap<String, RegistryEntry>,
    groups: BTreeMap<String, BTreeSet<String>>,
    capabilities: HashMap<String, DriverCapability>,
    /// Per-device connectivity answer; devices not listed connect fine.
    connectivity: HashMap<String, bool>,
    /// When set, the next transaction commit is rejected wholesale.
    fail_next_commit: bool,
    action_log: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<State>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_capability(&self, driver_id: &str, capability: DriverCapability) {
        let mut state = self.state.lock().unwrap();
        state.capabilities.insert(driver_id.to_string(), capability);
    }

    pub fn seed_entry(&self, entry: RegistryEntry) {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(entry.name.clone(), entry);
    }

    pub fn set_connectivity(&self, name: &str, reachable: bool) {
        let mut state = self.state.lock().unwrap();
        state.connectivity.insert(name.to_string(), reachable);
    }

    /// Make the next commit fail without applying anything, like a registry
    /// rejecting a write batch.
    pub fn fail_next_commit(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_next_commit = true;
    }

    pub fn entry(&self, name: &str) -> Option<RegistryEntry> {
        self.state.lock().unwrap().entries.get(name).cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn group_members(&self, group: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.state.lock().unwrap().groups.keys().cloned().collect()
    }

    /// Ordered log of device actions, e.g. `connect sw1`, `sync-from sw1`.
    pub fn action_log(&self) -> Vec<String> {
        self.state.lock().unwrap().action_log.clone()
    }

    fn outcome_for(&self, action: &str, name: &str) -> ActionOutcome {
        let mut state = self.state.lock().unwrap();
        state.action_log.push(format!("{action} {name}"));

        if !state.entries.contains_key(name) {
            return ActionOutcome {
                result: false,
                info: Some(format!("no such device {name}")),
            };
        }
        let reachable = state.connectivity.get(name).copied().unwrap_or(true);
        ActionOutcome {
            result: reachable,
            info: if reachable {
                None
            } else {
                Some("connection refused".to_string())
            },
        }
    }
}

enum StagedOp {
    GroupMembership { group: String, device: String },
    Entry(RegistryEntry),
}

struct MemoryTxn {
    state: Arc<Mutex<State>>,
    staged: Vec<StagedOp>,
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn lookup(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        Ok(self.entry(name))
    }

    async fn driver_capability(
        &self,
        driver_id: &str,
    ) -> Result<DriverCapability, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state.capabilities.get(driver_id).cloned().unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn RegistryTxn>, RegistryError> {
        Ok(Box::new(MemoryTxn {
            state: self.state.clone(),
            staged: Vec::new(),
        }))
    }

    async fn refresh_host_keys(&self, name: &str) -> Result<ActionOutcome, RegistryError> {
        Ok(self.outcome_for("fetch-host-keys", name))
    }

    async fn test_connectivity(&self, name: &str) -> Result<ActionOutcome, RegistryError> {
        Ok(self.outcome_for("connect", name))
    }

    async fn sync_state(&self, name: &str) -> Result<ActionOutcome, RegistryError> {
        Ok(self.outcome_for("sync-from", name))
    }
}

#[async_trait]
impl RegistryTxn for MemoryTxn {
    async fn ensure_group_membership(
        &mut self,
        group: &str,
        device: &str,
    ) -> Result<(), RegistryError> {
        self.staged.push(StagedOp::GroupMembership {
            group: group.to_string(),
            device: device.to_string(),
        });
        Ok(())
    }

    async fn create_or_update(&mut self, entry: &RegistryEntry) -> Result<(), RegistryError> {
        self.staged.push(StagedOp::Entry(entry.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_commit {
            state.fail_next_commit = false;
            return Err(RegistryError::Transaction(
                "registry rejected the write batch".to_string(),
            ));
        }
        for op in self.staged {
            match op {
                StagedOp::GroupMembership { group, device } => {
                    // BTreeSet membership makes the repeat-add idempotent.
                    state.groups.entry(group).or_default().insert(device);
                }
                StagedOp::Entry(entry) => {
                    state.entries.insert(entry.name.clone(), entry);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RegistryError> {
        // Staged ops are simply dropped.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AdminState, DriverFamily};

    fn entry(name: &str) -> RegistryEntry {
        RegistryEntry {
            name: name.to_string(),
            address: None,
            port: Some(22),
            description: "access-switch".to_string(),
            auth_group: "default".to_string(),
            driver_id: "cisco-ios-cli-6.77".to_string(),
            family: DriverFamily::Cli,
            protocol: "ssh".to_string(),
            admin_state: AdminState::Unlocked,
            provenance: None,
            extra_settings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let registry = MemoryRegistry::new();
        let mut txn = registry.begin().await.unwrap();
        txn.create_or_update(&entry("sw1")).await.unwrap();
        assert_eq!(registry.entry_count(), 0);
        txn.commit().await.unwrap();
        assert_eq!(registry.entry_count(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let registry = MemoryRegistry::new();
        let mut txn = registry.begin().await.unwrap();
        txn.create_or_update(&entry("sw1")).await.unwrap();
        txn.ensure_group_membership("Inventory lab", "sw1")
            .await
            .unwrap();
        txn.rollback().await.unwrap();
        assert_eq!(registry.entry_count(), 0);
        assert!(registry.group_names().is_empty());
    }

    #[tokio::test]
    async fn repeated_group_membership_does_not_duplicate() {
        let registry = MemoryRegistry::new();
        let mut txn = registry.begin().await.unwrap();
        txn.ensure_group_membership("Inventory lab", "sw1")
            .await
            .unwrap();
        txn.ensure_group_membership("Inventory lab", "sw1")
            .await
            .unwrap();
        txn.commit().await.unwrap();
        assert_eq!(registry.group_members("Inventory lab"), vec!["sw1"]);
    }

    #[tokio::test]
    async fn rejected_commit_applies_nothing() {
        let registry = MemoryRegistry::new();
        registry.fail_next_commit();

        let mut txn = registry.begin().await.unwrap();
        txn.create_or_update(&entry("sw1")).await.unwrap();
        txn.ensure_group_membership("Inventory lab", "sw1")
            .await
            .unwrap();
        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, RegistryError::Transaction(_)));
        assert_eq!(registry.entry_count(), 0);
        assert!(registry.group_names().is_empty());

        // Only the one commit is rejected.
        let mut txn = registry.begin().await.unwrap();
        txn.create_or_update(&entry("sw1")).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(registry.entry_count(), 1);
    }

    #[tokio::test]
    async fn actions_report_missing_devices() {
        let registry = MemoryRegistry::new();
        let outcome = registry.test_connectivity("ghost").await.unwrap();
        assert!(!outcome.result);
        assert_eq!(registry.action_log(), vec!["connect ghost"]);
    }
}
