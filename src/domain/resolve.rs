//! Resolution policy: record + target configuration → driver, family,
//! protocol, port.

use crate::config::TargetConfig;
use crate::domain::types::{InventoryRecord, RecordKind, Resolution};
use crate::error::EngineError;
use crate::registry::DriverCapability;

/// Default network ports per connection protocol. Unmapped protocols get no
/// port override, which is not an error.
const PROTOCOL_PORTS: &[(&str, u16)] = &[
    ("ssh", 22),
    ("telnet", 23),
    ("http", 80),
    ("https", 443),
];

pub fn default_port(protocol: &str) -> Option<u16> {
    PROTOCOL_PORTS
        .iter()
        .find(|(name, _)| *name == protocol)
        .map(|(_, port)| *port)
}

/// Pick the driver id for a record from the target's maps. Physical records
/// resolve by device-type model, virtual machines by role.
pub fn driver_for(record: &InventoryRecord, target: &TargetConfig) -> Result<String, EngineError> {
    match record.kind {
        RecordKind::Physical => {
            let type_model = record.type_model.as_deref().unwrap_or("");
            target
                .device_type_drivers
                .get(type_model)
                .cloned()
                .ok_or_else(|| EngineError::UnmappedType {
                    record: record.name.clone(),
                    type_model: type_model.to_string(),
                })
        }
        RecordKind::Virtual => target
            .vm_role_drivers
            .get(&record.role_name)
            .cloned()
            .ok_or_else(|| EngineError::UnmappedRole {
                record: record.name.clone(),
                role: record.role_name.clone(),
            }),
    }
}

/// Combine the driver id, its declared capability, and the target's protocol
/// into a full resolution. The driver id always comes from the configured
/// maps; it is never silently empty.
pub fn resolve(
    record: &InventoryRecord,
    target: &TargetConfig,
    capability: &DriverCapability,
) -> Result<Resolution, EngineError> {
    let driver_id = driver_for(record, target)?;
    let family = capability
        .family()
        .ok_or_else(|| EngineError::UnresolvableDriverFamily {
            driver_id: driver_id.clone(),
        })?;

    Ok(Resolution {
        driver_id,
        family,
        protocol: target.protocol.clone(),
        port: default_port(&target.protocol),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DriverFamily;
    use crate::registry::ConnectionDescriptor;

    fn target() -> TargetConfig {
        let toml = r#"
name = "lab"
protocol = "ssh"

[device_type_drivers]
"C9300-48P" = "cisco-ios-cli-6.77"

[vm_role_drivers]
"router" = "cisco-iosxr-cli-7.52"
"#;
        toml::from_str(toml).unwrap()
    }

    fn physical(name: &str, type_model: &str) -> InventoryRecord {
        InventoryRecord {
            name: name.to_string(),
            kind: RecordKind::Physical,
            status: "active".to_string(),
            primary_address: None,
            role_name: "access-switch".to_string(),
            type_model: Some(type_model.to_string()),
            tenant_name: None,
            source_url: "https://netbox.example.com/api/dcim/devices/1/".to_string(),
        }
    }

    fn cli_capability() -> DriverCapability {
        DriverCapability {
            cli: Some(ConnectionDescriptor {
                name: "cisco-ios-cli".to_string(),
            }),
            generic: None,
        }
    }

    #[test]
    fn port_table() {
        assert_eq!(default_port("ssh"), Some(22));
        assert_eq!(default_port("telnet"), Some(23));
        assert_eq!(default_port("http"), Some(80));
        assert_eq!(default_port("https"), Some(443));
        assert_eq!(default_port("netconf"), None);
    }

    #[test]
    fn physical_record_resolves_by_type_model() {
        let resolution = resolve(&physical("sw1", "C9300-48P"), &target(), &cli_capability())
            .unwrap();
        assert_eq!(resolution.driver_id, "cisco-ios-cli-6.77");
        assert_eq!(resolution.family, DriverFamily::Cli);
        assert_eq!(resolution.protocol, "ssh");
        assert_eq!(resolution.port, Some(22));
    }

    #[test]
    fn virtual_record_resolves_by_role() {
        let record = InventoryRecord {
            kind: RecordKind::Virtual,
            role_name: "router".to_string(),
            type_model: None,
            ..physical("vr1", "")
        };
        let driver = driver_for(&record, &target()).unwrap();
        assert_eq!(driver, "cisco-iosxr-cli-7.52");
    }

    #[test]
    fn unmapped_type_is_a_typed_error() {
        let err = driver_for(&physical("sw2", "WS-C2960"), &target()).unwrap_err();
        assert!(matches!(err, EngineError::UnmappedType { .. }));
    }

    #[test]
    fn capability_without_descriptors_fails_resolution() {
        let err = resolve(
            &physical("sw1", "C9300-48P"),
            &target(),
            &DriverCapability::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnresolvableDriverFamily { .. }));
    }
}
