//! Group composer: which registry device-groups a record belongs to.
//!
//! Order matters — it is the order groups appear in build output — and the
//! list is deliberately not de-duplicated: a record whose type model equals
//! its role name legitimately lists the same group twice.

use crate::config::TargetConfig;
use crate::domain::types::{InventoryRecord, RecordKind};

pub fn compose_groups(record: &InventoryRecord, target: &TargetConfig) -> Vec<String> {
    let scope = target.scope_name();
    let mut groups = vec![scope.clone()];

    if let Some(tenant) = &record.tenant_name {
        groups.push(format!("{scope} {tenant}"));
    }
    if record.kind == RecordKind::Physical {
        if let Some(type_model) = &record.type_model {
            groups.push(format!("{scope} {type_model}"));
        }
    }
    groups.push(format!("{scope} {}", record.role_name));

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetConfig {
        toml::from_str(r#"name = "lab""#).unwrap()
    }

    fn record(kind: RecordKind) -> InventoryRecord {
        InventoryRecord {
            name: "sw1".to_string(),
            kind,
            status: "active".to_string(),
            primary_address: None,
            role_name: "access-switch".to_string(),
            type_model: Some("C9300-48P".to_string()),
            tenant_name: Some("Engineering".to_string()),
            source_url: String::new(),
        }
    }

    #[test]
    fn physical_record_gets_all_four_groups_in_order() {
        let groups = compose_groups(&record(RecordKind::Physical), &target());
        assert_eq!(
            groups,
            vec![
                "Inventory lab",
                "Inventory lab Engineering",
                "Inventory lab C9300-48P",
                "Inventory lab access-switch",
            ]
        );
    }

    #[test]
    fn virtual_record_skips_type_model_group() {
        let groups = compose_groups(&record(RecordKind::Virtual), &target());
        assert_eq!(
            groups,
            vec![
                "Inventory lab",
                "Inventory lab Engineering",
                "Inventory lab access-switch",
            ]
        );
    }

    #[test]
    fn missing_tenant_drops_only_the_tenant_group() {
        let mut r = record(RecordKind::Physical);
        r.tenant_name = None;
        let groups = compose_groups(&r, &target());
        assert_eq!(
            groups,
            vec![
                "Inventory lab",
                "Inventory lab C9300-48P",
                "Inventory lab access-switch",
            ]
        );
    }

    #[test]
    fn duplicate_groups_are_preserved() {
        let mut r = record(RecordKind::Physical);
        r.type_model = Some("access-switch".to_string());
        let groups = compose_groups(&r, &target());
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[2], groups[3]);
    }
}
