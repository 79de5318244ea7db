use serde_json::{Value, json};

use crate::crd::{PharePhase, PhareStatus};

pub const IN_SYNC_MESSAGE: &str = "All managed resources are in sync";

pub fn active() -> PhareStatus {
    PhareStatus {
        phase: Some(PharePhase::Active),
        message: Some(IN_SYNC_MESSAGE.to_string()),
    }
}

pub fn failed(error: &impl std::fmt::Display) -> PhareStatus {
    PhareStatus {
        phase: Some(PharePhase::Failed),
        message: Some(error.to_string()),
    }
}

/// Status writes are skipped when neither phase nor message changed.
pub fn should_patch(current: Option<&PhareStatus>, next: &PhareStatus) -> bool {
    match current {
        Some(current) => current.phase != next.phase || current.message != next.message,
        None => true,
    }
}

pub fn status_patch(status: &PhareStatus) -> Result<Value, serde_json::Error> {
    Ok(json!({ "status": serde_json::to_value(status)? }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_status_is_not_rewritten() {
        assert!(should_patch(None, &active()));
        assert!(!should_patch(Some(&active()), &active()));
        assert!(should_patch(Some(&active()), &failed(&"boom")));
        assert!(should_patch(Some(&failed(&"a")), &failed(&"b")));
    }

    #[test]
    fn patch_body() {
        let v = status_patch(&failed(&"unsupported workload kind")).unwrap();
        assert_eq!(v["status"]["phase"], "Failed");
        assert_eq!(v["status"]["message"], "unsupported workload kind");
    }
}
