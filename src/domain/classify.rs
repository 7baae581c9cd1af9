//! Classification policy: inventory lifecycle status → admin state.
//!
//! Status drives the lock state of the provisioned entry:
//!   active, staged                   → unlocked
//!   offline, failed, decommissioning → locked
//!   planned                          → southbound-locked
//!   inventory                        → excluded (not provisioned at all)
//!
//! An operator override bypasses the status table entirely.

use crate::domain::types::AdminState;
use crate::error::EngineError;

/// Map a record's lifecycle status (plus an optional operator override) to
/// an admin state. An unrecognized status is an error, never a default.
pub fn classify(
    record_name: &str,
    status: &str,
    override_state: Option<AdminState>,
) -> Result<AdminState, EngineError> {
    if let Some(state) = override_state {
        return Ok(state);
    }

    match status {
        "active" | "staged" => Ok(AdminState::Unlocked),
        "offline" | "failed" | "decommissioning" => Ok(AdminState::Locked),
        "planned" => Ok(AdminState::SouthboundLocked),
        "inventory" => Ok(AdminState::Excluded),
        other => Err(EngineError::UnknownStatus {
            record: record_name.to_string(),
            status: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_matches_policy() {
        let cases = [
            ("active", AdminState::Unlocked),
            ("staged", AdminState::Unlocked),
            ("offline", AdminState::Locked),
            ("failed", AdminState::Locked),
            ("decommissioning", AdminState::Locked),
            ("planned", AdminState::SouthboundLocked),
            ("inventory", AdminState::Excluded),
        ];
        for (status, expected) in cases {
            assert_eq!(classify("r1", status, None).unwrap(), expected, "{status}");
        }
    }

    #[test]
    fn override_wins_regardless_of_status() {
        for status in ["active", "planned", "inventory", "not-even-a-status"] {
            let state = classify("r1", status, Some(AdminState::Locked)).unwrap();
            assert_eq!(state, AdminState::Locked);
        }
    }

    #[test]
    fn unknown_status_is_an_error() {
        let err = classify("r1", "retired", None).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStatus { .. }));
        assert!(err.to_string().contains("retired"));
    }
}
