//! RESTCONF pass-through client for an NSO-style managed registry.
//!
//! Every read and action maps onto one RESTCONF call against the registry's
//! existing API. Mutations are buffered in [`RestconfTxn`] and issued on
//! commit as a single YANG Patch request (RFC 8072), which the registry
//! applies atomically, so an aborted build never leaves a half-written
//! batch behind.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{
    ActionOutcome, ConnectionDescriptor, DriverCapability, Registry, RegistryEntry, RegistryTxn,
};
use crate::config::RegistryConfig;
use crate::domain::types::DriverFamily;
use crate::error::RegistryError;

pub struct RestconfRegistry {
    base_url: String,
    username: String,
    password: String,
    http: Client,
}

impl RestconfRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RegistryError::Transport {
                url: config.url.clone(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }

    /// GET a RESTCONF resource. `Ok(None)` on 404.
    async fn get(&self, path: &str) -> Result<Option<Value>, RegistryError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/yang-data+json")
            .send()
            .await
            .map_err(|e| RegistryError::Transport {
                url: url.clone(),
                cause: e.to_string(),
            })?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected { url, status, body });
        }

        let value = resp.json().await.map_err(|e| RegistryError::Transport {
            url,
            cause: e.to_string(),
        })?;
        Ok(Some(value))
    }

    /// POST a device action and decode its `{result, info}` output.
    async fn post_action(&self, path: &str) -> Result<ActionOutcome, RegistryError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/yang-data+json")
            .send()
            .await
            .map_err(|e| RegistryError::Transport {
                url: url.clone(),
                cause: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected { url, status, body });
        }

        let value: Value = resp.json().await.map_err(|e| RegistryError::Transport {
            url,
            cause: e.to_string(),
        })?;
        let output = &value["tailf-ncs:output"];
        Ok(ActionOutcome {
            result: output["result"].as_bool().unwrap_or(false),
            info: output["info"].as_str().map(|s| s.to_string()),
        })
    }
}

#[async_trait]
impl Registry for RestconfRegistry {
    async fn lookup(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        let path = format!("/data/tailf-ncs:devices/device={name}");
        let Some(value) = self.get(&path).await? else {
            return Ok(None);
        };
        let device = &value["tailf-ncs:device"][0];
        Ok(parse_device(device))
    }

    async fn driver_capability(
        &self,
        driver_id: &str,
    ) -> Result<DriverCapability, RegistryError> {
        let path = format!("/data/tailf-ncs:packages/package={driver_id}");
        let Some(value) = self.get(&path).await? else {
            // An uninstalled driver has no descriptors at all; resolution
            // turns that into its own typed error.
            return Ok(DriverCapability::default());
        };

        let mut capability = DriverCapability::default();
        let components = value["tailf-ncs:package"][0]["component"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        for component in components {
            let name = component["name"].as_str().unwrap_or(driver_id).to_string();
            if component["ned"].get("cli").is_some() {
                capability.cli = Some(ConnectionDescriptor { name });
            } else if component["ned"].get("generic").is_some() {
                capability.generic = Some(ConnectionDescriptor { name });
            }
        }
        Ok(capability)
    }

    async fn begin(&self) -> Result<Box<dyn RegistryTxn>, RegistryError> {
        Ok(Box::new(RestconfTxn {
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            http: self.http.clone(),
            staged: Vec::new(),
        }))
    }

    async fn refresh_host_keys(&self, name: &str) -> Result<ActionOutcome, RegistryError> {
        self.post_action(&format!(
            "/data/tailf-ncs:devices/device={name}/ssh/fetch-host-keys"
        ))
        .await
    }

    async fn test_connectivity(&self, name: &str) -> Result<ActionOutcome, RegistryError> {
        self.post_action(&format!("/data/tailf-ncs:devices/device={name}/connect"))
            .await
    }

    async fn sync_state(&self, name: &str) -> Result<ActionOutcome, RegistryError> {
        self.post_action(&format!("/data/tailf-ncs:devices/device={name}/sync-from"))
            .await
    }
}

enum StagedOp {
    GroupMembership { group: String, device: String },
    Entry(Box<RegistryEntry>),
}

pub struct RestconfTxn {
    base_url: String,
    username: String,
    password: String,
    http: Client,
    staged: Vec<StagedOp>,
}

impl RestconfTxn {
    async fn send_patch(&self, body: Value) -> Result<(), RegistryError> {
        let url = format!("{}/data", self.base_url);
        let resp = self
            .http
            .patch(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/yang-patch+json")
            .header("Accept", "application/yang-data+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistryError::Transport {
                url: url.clone(),
                cause: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected { url, status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryTxn for RestconfTxn {
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
        self.staged.push(StagedOp::Entry(Box::new(entry.clone())));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RegistryError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        // One request for the whole batch: the registry applies every edit
        // or rejects the patch, never a prefix of it.
        let body = yang_patch_body(&self.staged);
        self.send_patch(body).await
    }

    async fn rollback(self: Box<Self>) -> Result<(), RegistryError> {
        // Nothing was sent yet; dropping the staged ops is the rollback.
        Ok(())
    }
}

/// Assemble the staged ops into one RFC 8072 YANG Patch. `merge` keeps the
/// create-or-update semantics: missing nodes are created, leaf-list
/// membership is added without duplicating, and subtrees the body doesn't
/// name stay untouched.
fn yang_patch_body(staged: &[StagedOp]) -> Value {
    let edits: Vec<Value> = staged
        .iter()
        .enumerate()
        .map(|(i, op)| match op {
            StagedOp::GroupMembership { group, device } => json!({
                "edit-id": format!("edit-{i}"),
                "operation": "merge",
                "target": format!("/tailf-ncs:devices/device-group={group}"),
                "value": {
                    "tailf-ncs:device-group": {
                        "name": group,
                        "device-name": [device],
                    }
                }
            }),
            StagedOp::Entry(entry) => json!({
                "edit-id": format!("edit-{i}"),
                "operation": "merge",
                "target": format!("/tailf-ncs:devices/device={}", entry.name),
                "value": { "tailf-ncs:device": [device_body(entry)] }
            }),
        })
        .collect();

    json!({
        "ietf-yang-patch:yang-patch": {
            "patch-id": format!(
                "netsync-build-{}",
                chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
            ),
            "edit": edits,
        }
    })
}

fn parse_device(device: &Value) -> Option<RegistryEntry> {
    let name = device["name"].as_str()?.to_string();

    let (family, device_type) = if device["device-type"].get("cli").is_some() {
        (DriverFamily::Cli, &device["device-type"]["cli"])
    } else {
        (DriverFamily::Generic, &device["device-type"]["generic"])
    };

    // ned-id values are namespace-qualified, e.g.
    // "cisco-ios-cli-6.77:cisco-ios-cli-6.77".
    let driver_id = device_type["ned-id"]
        .as_str()
        .map(|s| s.rsplit(':').next().unwrap_or(s).to_string())
        .unwrap_or_default();

    let admin_state = device["state"]["admin-state"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(crate::domain::types::AdminState::Locked);

    Some(RegistryEntry {
        name,
        address: device["address"].as_str().and_then(|s| s.parse().ok()),
        port: device["port"].as_u64().and_then(|p| u16::try_from(p).ok()),
        description: device["description"].as_str().unwrap_or_default().to_string(),
        auth_group: device["authgroup"].as_str().unwrap_or_default().to_string(),
        driver_id,
        family,
        protocol: device_type["protocol"].as_str().unwrap_or_default().to_string(),
        admin_state,
        provenance: None,
        extra_settings: Vec::new(),
    })
}

fn device_body(entry: &RegistryEntry) -> Value {
    let device_type = match entry.family {
        DriverFamily::Cli => json!({
            "cli": { "ned-id": entry.driver_id, "protocol": entry.protocol }
        }),
        DriverFamily::Generic => json!({
            "generic": { "ned-id": entry.driver_id }
        }),
    };

    let mut body = json!({
        "name": entry.name,
        "description": entry.description,
        "authgroup": entry.auth_group,
        "device-type": device_type,
        "state": { "admin-state": entry.admin_state.to_string() },
    });

    if let Some(address) = entry.address {
        body["address"] = json!(address.to_string());
    }
    if let Some(port) = entry.port {
        body["port"] = json!(port);
    }
    if let Some(provenance) = &entry.provenance {
        body["netsync:source"] = json!({
            "context": { "web": provenance.web, "api": provenance.api },
            "when": provenance.when.to_rfc3339(),
            "source": provenance.source,
        });
    }
    if !entry.extra_settings.is_empty() {
        let settings: serde_json::Map<String, Value> = entry
            .extra_settings
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        body["netsync:driver-settings"] = Value::Object(settings);
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AdminState;

    #[test]
    fn parses_cli_device_payload() {
        let device = json!({
            "name": "sw1",
            "address": "10.0.0.5",
            "port": 22,
            "description": "access-switch",
            "authgroup": "default",
            "device-type": {
                "cli": {
                    "ned-id": "cisco-ios-cli-6.77:cisco-ios-cli-6.77",
                    "protocol": "ssh"
                }
            },
            "state": { "admin-state": "unlocked" }
        });
        let entry = parse_device(&device).unwrap();
        assert_eq!(entry.name, "sw1");
        assert_eq!(entry.driver_id, "cisco-ios-cli-6.77");
        assert_eq!(entry.family, DriverFamily::Cli);
        assert_eq!(entry.protocol, "ssh");
        assert_eq!(entry.admin_state, AdminState::Unlocked);
        assert_eq!(entry.port, Some(22));
    }

    #[test]
    fn device_body_includes_provenance_and_settings() {
        let entry = RegistryEntry {
            name: "sw1".to_string(),
            address: Some("10.0.0.5".parse().unwrap()),
            port: Some(22),
            description: "access-switch".to_string(),
            auth_group: "default".to_string(),
            driver_id: "cisco-ios-cli-6.77".to_string(),
            family: DriverFamily::Cli,
            protocol: "ssh".to_string(),
            admin_state: AdminState::Unlocked,
            provenance: Some(crate::domain::types::Provenance::from_record_url(
                "https://netbox.example.com/api/dcim/devices/1/",
                "/netsync:target{lab}",
            )),
            extra_settings: vec![("terminal-width".to_string(), "0".to_string())],
        };
        let body = device_body(&entry);
        assert_eq!(body["device-type"]["cli"]["ned-id"], "cisco-ios-cli-6.77");
        assert_eq!(body["state"]["admin-state"], "unlocked");
        assert_eq!(
            body["netsync:source"]["context"]["web"],
            "https://netbox.example.com/dcim/devices/1/"
        );
        assert_eq!(body["netsync:driver-settings"]["terminal-width"], "0");
    }

    #[test]
    fn out_of_range_port_parses_as_none() {
        let device = json!({
            "name": "sw1",
            "port": 99999,
            "device-type": {
                "cli": { "ned-id": "cisco-ios-cli-6.77", "protocol": "ssh" }
            },
            "state": { "admin-state": "unlocked" }
        });
        let entry = parse_device(&device).unwrap();
        assert_eq!(entry.port, None);
    }

    #[test]
    fn staged_batch_becomes_one_yang_patch() {
        let entry = RegistryEntry {
            name: "sw1".to_string(),
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
        };
        let staged = vec![
            StagedOp::GroupMembership {
                group: "Inventory lab".to_string(),
                device: "sw1".to_string(),
            },
            StagedOp::Entry(Box::new(entry)),
        ];

        let body = yang_patch_body(&staged);
        let patch = &body["ietf-yang-patch:yang-patch"];
        assert!(patch["patch-id"]
            .as_str()
            .unwrap()
            .starts_with("netsync-build-"));

        let edits = patch["edit"].as_array().unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0]["operation"], "merge");
        assert_eq!(
            edits[0]["target"],
            "/tailf-ncs:devices/device-group=Inventory lab"
        );
        assert_eq!(
            edits[0]["value"]["tailf-ncs:device-group"]["device-name"][0],
            "sw1"
        );
        assert_eq!(edits[1]["target"], "/tailf-ncs:devices/device=sw1");
        assert_eq!(
            edits[1]["value"]["tailf-ncs:device"][0]["device-type"]["cli"]["ned-id"],
            "cisco-ios-cli-6.77"
        );
    }
}
