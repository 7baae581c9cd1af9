//! TOML configuration for netsync.
//!
//! One file describes the inventory source, the managed registry, and the
//! reconciliation target. Default location is
//! `~/.config/netsync/config.toml`; every command accepts `--config` to
//! point elsewhere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::types::AdminState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub inventory: InventoryConfig,
    pub registry: RegistryConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Connection details for the inventory source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Base URL, e.g. `https://netbox.example.com`.
    pub url: String,
    /// API token, supplied pre-decrypted by the environment.
    pub api_token: String,
    /// Accept invalid TLS certificates when talking to the source.
    #[serde(default)]
    pub bypass_cert_verify: bool,
}

/// Connection details for the managed registry's RESTCONF API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// RESTCONF root, e.g. `http://nso.example.com:8080/restconf`.
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Operator configuration for one reconciliation target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Scope name; prefixes every derived group and the provenance path.
    pub name: String,

    #[serde(default)]
    pub filter: FilterConfig,

    /// When set, overrides the status-derived admin state for every record.
    #[serde(default)]
    pub admin_state_override: Option<AdminState>,

    /// Gates whether build may write to the registry at all. Off by default:
    /// an unconfigured target only describes what it would do.
    #[serde(default)]
    pub mutate_allowed: bool,

    /// device-type model → driver id, for physical records.
    #[serde(default)]
    pub device_type_drivers: HashMap<String, String>,

    /// role name → driver id, for virtual machines.
    #[serde(default)]
    pub vm_role_drivers: HashMap<String, String>,

    /// Connection protocol for every built entry.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Registry authentication group for built entries.
    #[serde(default = "default_auth_group")]
    pub auth_group: String,
}

impl TargetConfig {
    /// Group-name prefix shared by every group this target derives.
    pub fn scope_name(&self) -> String {
        format!("Inventory {}", self.name)
    }

    /// Provenance path recorded on built entries.
    pub fn source_path(&self) -> String {
        format!("/netsync:target{{{}}}", self.name)
    }
}

/// Scoping criteria for the inventory query. An empty list leaves that
/// dimension unfiltered; it never means "matches nothing".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub device_types: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            log_level: default_log_level(),
        }
    }
}

fn default_protocol() -> String {
    "ssh".to_string()
}

fn default_auth_group() -> String {
    "default".to_string()
}

fn default_http_addr() -> String {
    "127.0.0.1:9310".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("netsync").join("config.toml"))
    }
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::path()?,
    };
    let content =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXAMPLE: &str = r#"
[inventory]
url = "https://netbox.example.com"
api_token = "0123456789abcdef"
bypass_cert_verify = true

[registry]
url = "http://localhost:8080/restconf"
username = "admin"
password = "admin"

[target]
name = "lab"
protocol = "ssh"
mutate_allowed = true
admin_state_override = "locked"

[target.filter]
sites = ["RTP", "SJC"]
tenants = ["Engineering"]

[target.device_type_drivers]
"C9300-48P" = "cisco-ios-cli-6.77"

[target.vm_role_drivers]
"router" = "cisco-ios-cli-6.77"
"#;

    #[test]
    fn parses_full_example() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.target.name, "lab");
        assert!(config.target.mutate_allowed);
        assert_eq!(
            config.target.admin_state_override,
            Some(AdminState::Locked)
        );
        assert_eq!(config.target.filter.sites, vec!["RTP", "SJC"]);
        assert_eq!(
            config.target.device_type_drivers.get("C9300-48P").unwrap(),
            "cisco-ios-cli-6.77"
        );
        assert_eq!(config.target.auth_group, "default");
        assert_eq!(config.daemon.http_addr, "127.0.0.1:9310");
    }

    #[test]
    fn scope_and_source_derive_from_target_name() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.target.scope_name(), "Inventory lab");
        assert_eq!(config.target.source_path(), "/netsync:target{lab}");
    }

    #[test]
    fn mutate_allowed_defaults_off() {
        let minimal = r#"
[inventory]
url = "https://netbox.example.com"
api_token = "t"

[registry]
url = "http://localhost:8080/restconf"
username = "admin"
password = "admin"

[target]
name = "lab"
"#;
        let config: Config = toml::from_str(minimal).unwrap();
        assert!(!config.target.mutate_allowed);
        assert_eq!(config.target.protocol, "ssh");
        assert!(config.target.filter.sites.is_empty());
    }

    #[test]
    fn load_reads_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.inventory.url, "https://netbox.example.com");
        assert!(config.inventory.bypass_cert_verify);
    }
}
