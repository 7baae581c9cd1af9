//! Reconciliation engine: build, connect, and verify a registry against
//! the inventory source.
//!
//! Every operation returns a [`Report`]; fatal conditions are converted at
//! the operation boundary into `success=false` plus the triggering message,
//! never a bare error. Build is strict (any resolution failure aborts the
//! whole batch before a single mutation); connect is best-effort per record;
//! verify accumulates every discrepancy in one pass.

use serde_json::json;
use tracing::{debug, info};

use crate::client::InventorySource;
use crate::config::TargetConfig;
use crate::domain::classify::classify;
use crate::domain::groups::compose_groups;
use crate::domain::resolve::{driver_for, resolve};
use crate::domain::types::{
    AdminState, DriverFamily, InventoryRecord, Provenance, RecordKind, Report, Resolution,
};
use crate::error::{EngineError, FetchError};
use crate::registry::{Registry, RegistryEntry, RegistryTxn};

/// Driver-specific post-configuration settings, keyed by driver id
/// substring. Extend as new driver families need extra knobs.
const POST_CONFIG_HOOKS: &[(&str, &str, &str)] = &[
    ("cisco-ios", "terminal-width", "0"),
    ("cisco-nx", "feature-check", "disabled"),
];

fn post_config_hooks(driver_id: &str) -> Vec<(String, String)> {
    POST_CONFIG_HOOKS
        .iter()
        .filter(|(needle, _, _)| driver_id.contains(needle))
        .map(|(_, key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Fully derived target state for one record, computed fresh each run.
struct EntryPlan {
    record: InventoryRecord,
    admin_state: AdminState,
    resolution: Resolution,
    groups: Vec<String>,
    provenance: Provenance,
}

impl EntryPlan {
    fn entry(&self, target: &TargetConfig) -> RegistryEntry {
        RegistryEntry {
            name: self.record.name.clone(),
            address: self.record.primary_address,
            port: self.resolution.port,
            description: self.record.role_name.clone(),
            auth_group: target.auth_group.clone(),
            driver_id: self.resolution.driver_id.clone(),
            family: self.resolution.family,
            protocol: self.resolution.protocol.clone(),
            admin_state: self.admin_state,
            provenance: Some(self.provenance.clone()),
            extra_settings: post_config_hooks(&self.resolution.driver_id),
        }
    }
}

pub struct Engine<'a> {
    source: &'a dyn InventorySource,
    registry: &'a dyn Registry,
    target: &'a TargetConfig,
}

impl<'a> Engine<'a> {
    pub fn new(
        source: &'a dyn InventorySource,
        registry: &'a dyn Registry,
        target: &'a TargetConfig,
    ) -> Self {
        Self {
            source,
            registry,
            target,
        }
    }

    /// Availability check against the inventory source, reported as-is.
    pub async fn verify_status(&self) -> Report {
        match self.source.probe().await {
            Ok(info) => Report {
                success: true,
                messages: vec![info.summary],
            },
            Err(e) => Report::failed(e.to_string()),
        }
    }

    /// Create or update registry entries for every provisionable record.
    /// `commit=false` still describes every intended entry but touches
    /// nothing and downgrades the outcome.
    pub async fn build(&self, commit: bool) -> Report {
        let mut report = Report::new();

        if !self.target.mutate_allowed {
            report.fail(format!(
                "Target {} has mutate-allowed set to false. No registry entries will be created.",
                self.target.name
            ));
        }
        if let Err(e) = self.source.probe().await {
            report.fail(e.to_string());
        }
        if !report.success {
            info!(report = %report.render(), "build pre-checks failed");
            return report;
        }

        if let Err(e) = self.build_inner(commit, &mut report).await {
            report.fail(e.to_string());
        }
        report
    }

    async fn build_inner(&self, commit: bool, report: &mut Report) -> Result<(), EngineError> {
        let records = self.fetch_all().await?;

        // Plan every record before touching the registry: the whole batch
        // must resolve cleanly or nothing is written.
        let mut plans = Vec::new();
        for record in records {
            debug!(record = %record.name, "planning record");
            let admin_state = classify(
                &record.name,
                &record.status,
                self.target.admin_state_override,
            )?;
            if admin_state == AdminState::Excluded {
                info!(
                    record = %record.name,
                    status = %record.status,
                    "record excluded from provisioning"
                );
                continue;
            }

            let driver_id = driver_for(&record, self.target)?;
            let capability = self.registry.driver_capability(&driver_id).await?;
            let resolution = resolve(&record, self.target, &capability)?;
            let groups = compose_groups(&record, self.target);
            let provenance =
                Provenance::from_record_url(&record.source_url, &self.target.source_path());

            plans.push(EntryPlan {
                record,
                admin_state,
                resolution,
                groups,
                provenance,
            });
        }

        report.push("# Adding devices to the registry from inventory.");
        report.push("devices: ");
        for plan in &plans {
            describe_plan(plan, self.target, report);
        }

        if !commit {
            report.fail(
                "\n# Commit not requested. Devices will NOT be added to the registry.",
            );
            return Ok(());
        }

        let mut txn = self.registry.begin().await?;
        let mut staged: Result<(), EngineError> = Ok(());
        'stage: for plan in &plans {
            for group in &plan.groups {
                if let Err(e) = txn.ensure_group_membership(group, &plan.record.name).await {
                    staged = Err(e.into());
                    break 'stage;
                }
            }
            if let Err(e) = txn.create_or_update(&plan.entry(self.target)).await {
                staged = Err(e.into());
                break 'stage;
            }
        }

        match staged {
            Ok(()) => {
                txn.commit().await?;
                info!(entries = plans.len(), "build committed");
                Ok(())
            }
            Err(e) => {
                // Best effort; staged writes are discarded either way.
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    /// Establish reachability for every provisionable record: host keys
    /// (ssh only), connectivity, and an optional state pull. Per-record
    /// failures are reported but never abort the run or flip the overall
    /// outcome; only the pre-checks do that.
    pub async fn connect(&self, sync_from: bool) -> Report {
        let mut report = Report::new();
        report.push(format!(
            "Connecting to devices from inventory target {}",
            self.target.name
        ));

        if !self.target.mutate_allowed {
            report.fail(format!(
                "Target {} has mutate-allowed set to false. No registry entries will be created.",
                self.target.name
            ));
        }
        if let Err(e) = self.source.probe().await {
            report.fail(e.to_string());
        }

        let records = match self.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                report.fail(e.to_string());
                return report;
            }
        };

        for record in records {
            let admin_state = match classify(
                &record.name,
                &record.status,
                self.target.admin_state_override,
            ) {
                Ok(state) => state,
                Err(e) => {
                    report.fail(e.to_string());
                    return report;
                }
            };
            if admin_state == AdminState::Excluded {
                continue;
            }

            report.push(format!("Connecting to device {}", record.name));

            if self.target.protocol == "ssh" {
                report.push("  - Fetching SSH host keys");
                let line = match self.registry.refresh_host_keys(&record.name).await {
                    Ok(outcome) => format!("    result: {}", outcome.describe()),
                    Err(e) => format!("    result: error {e}"),
                };
                report.push(line);
            }

            report.push("  - Testing connection to device");
            let connected = match self.registry.test_connectivity(&record.name).await {
                Ok(outcome) => {
                    report.push(format!("    result: {}", outcome.describe()));
                    outcome.result
                }
                Err(e) => {
                    report.push(format!("    result: error {e}"));
                    false
                }
            };

            if connected && sync_from {
                report.push("  - Performing state synchronization");
                let line = match self.registry.sync_state(&record.name).await {
                    Ok(outcome) => format!("    result: {}", outcome.describe()),
                    Err(e) => format!("    result: error {e}"),
                };
                report.push(line);
            }
        }

        report
    }

    /// Read-only diff of the registry against the inventory. Accumulates
    /// every discrepancy across every record; never mutates, never stops at
    /// the first mismatch.
    pub async fn verify(&self) -> Report {
        if let Err(e) = self.source.probe().await {
            return Report::failed(e.to_string());
        }
        let records = match self.fetch_all().await {
            Ok(records) => records,
            Err(e) => return Report::failed(e.to_string()),
        };

        let mut report = Report::new();
        for record in &records {
            if let Err(e) = self.verify_record(record, &mut report).await {
                report.fail(e.to_string());
                return report;
            }
        }
        report
    }

    async fn verify_record(
        &self,
        record: &InventoryRecord,
        report: &mut Report,
    ) -> Result<(), EngineError> {
        debug!(record = %record.name, "verifying record");
        let admin_state = classify(
            &record.name,
            &record.status,
            self.target.admin_state_override,
        )?;
        let excluded = admin_state == AdminState::Excluded;

        let Some(entry) = self.registry.lookup(&record.name).await? else {
            if excluded {
                // Absence is the desired state for excluded records.
                report.push(format!(
                    "Device {} has an inventory status of {}; it is not in the registry.",
                    record.name, record.status
                ));
            } else {
                report.fail(format!(
                    "Device {} not found in the registry.",
                    record.name
                ));
            }
            return Ok(());
        };

        if excluded {
            report.fail(format!(
                "Device {} has status {}; it should NOT be in the registry but it is.",
                record.name, record.status
            ));
        }

        // Admin state: an operator override is compared directly; otherwise
        // the status-derived state is expected (excluded records already
        // flagged above have no expected state).
        if let Some(override_state) = self.target.admin_state_override {
            if entry.admin_state != override_state {
                report.fail(format!(
                    "Device {} has an admin-state of {} which differs from the target override of {}",
                    record.name, entry.admin_state, override_state
                ));
            }
        } else if !excluded && entry.admin_state != admin_state {
            report.fail(format!(
                "Device {} has an admin-state of {} which differs from inventory status {}",
                record.name, entry.admin_state, record.status
            ));
        }

        if record.primary_address != entry.address {
            report.fail(format!(
                "Device {} has an inventory primary address of {}, the registry entry is configured for {}",
                record.name,
                display_addr(&record.primary_address),
                display_addr(&entry.address),
            ));
        }

        if record.role_name != entry.description {
            report.fail(format!(
                "Device {} has an inventory role of {}, which doesn't match the registry description of {}",
                record.name, record.role_name, entry.description
            ));
        }

        let driver_id = driver_for(record, self.target)?;
        let capability = self.registry.driver_capability(&driver_id).await?;
        let resolution = resolve(record, self.target, &capability)?;

        if entry.driver_id != resolution.driver_id {
            report.fail(format!(
                "Device {} should use driver {}, but is configured for {}",
                record.name, resolution.driver_id, entry.driver_id
            ));
        }

        if entry.protocol != resolution.protocol {
            report.fail(format!(
                "Device {} should use a connection protocol of {}, but is configured for {}",
                record.name, resolution.protocol, entry.protocol
            ));
        }
        // Port is a cli-family concern; generic drivers manage their own
        // transport endpoint.
        if resolution.family == DriverFamily::Cli && entry.port != resolution.port {
            report.fail(format!(
                "Device {} should use port {}, but is configured for {}",
                record.name,
                display_port(&resolution.port),
                display_port(&entry.port),
            ));
        }

        Ok(())
    }

    /// One record set per run: physical devices first, then virtual
    /// machines, in fetch order.
    async fn fetch_all(&self) -> Result<Vec<InventoryRecord>, FetchError> {
        let mut records = self
            .source
            .fetch(RecordKind::Physical, &self.target.filter)
            .await?;
        records.extend(
            self.source
                .fetch(RecordKind::Virtual, &self.target.filter)
                .await?,
        );
        Ok(records)
    }
}

fn display_addr(addr: &Option<std::net::IpAddr>) -> String {
    match addr {
        Some(a) => a.to_string(),
        None => "(none)".to_string(),
    }
}

fn display_port(port: &Option<u16>) -> String {
    match port {
        Some(p) => p.to_string(),
        None => "(none)".to_string(),
    }
}

/// Emit the YAML-list-shaped description of one intended registry entry,
/// readable by an operator even when nothing is committed.
fn describe_plan(plan: &EntryPlan, target: &TargetConfig, report: &mut Report) {
    report.push(format!("- device: {}", plan.record.name));
    if let Some(address) = plan.record.primary_address {
        report.push(format!("  address: {address}"));
    }
    if let Some(port) = plan.resolution.port {
        report.push(format!("  port: {port}"));
    }
    report.push(format!("  description: {}", plan.record.role_name));
    report.push(format!("  auth-group: {}", target.auth_group));
    report.push("  device-type: ");
    report.push(format!("    {}:", plan.resolution.family));
    report.push(format!("      ned-id: {}", plan.resolution.driver_id));
    report.push(format!("      protocol: {}", plan.resolution.protocol));
    report.push(format!("    state: {}", plan.admin_state));
    report.push("    source:");
    report.push(format!(
        "      context: {}",
        json!({ "web": plan.provenance.web, "api": plan.provenance.api })
    ));
    report.push(format!(
        "      when: {}",
        plan.provenance
            .when
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));
    report.push(format!("      source: {}", plan.provenance.source));
    report.push("  device-groups: ");
    for group in &plan.groups {
        report.push(format!("  - {group}:"));
    }
}
