//! Content-addressed fingerprints of normalized plans.
use sha2::{Digest, Sha256};

use super::Plan;
use crate::capability::Capabilities;
use crate::error::CompileError;

/// Stable SHA-256 digest of a normalized plan and the capability descriptor
/// it is compiled against.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    pub fn compute(plan: &Plan, capabilities: &Capabilities) -> Result<Self, CompileError> {
        let normalized = plan.normalized()?;
        let plan_bytes = serde_json::to_vec(&normalized)
            .map_err(|e| CompileError::InvalidPlan(format!("plan is not serializable: {}", e)))?;
        let caps_bytes = serde_json::to_vec(capabilities)
            .map_err(|e| CompileError::InvalidPlan(format!("capabilities: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(b"planfp:v1");
        hasher.update((plan_bytes.len() as u64).to_le_bytes());
        hasher.update(&plan_bytes);
        hasher.update(&caps_bytes);
        let digest = hasher.finalize();

        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(PlanFingerprint(out))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl std::fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Column, PlanBuilder};
    use crate::value::SemanticType;

    fn plan(table: &str) -> Plan {
        let mut b = PlanBuilder::new();
        let scan = b
            .index(table, vec![Column::new("id", SemanticType::Int64)], vec![])
            .unwrap();
        b.finish(scan).unwrap()
    }

    #[test]
    fn test_fingerprint_is_structural() {
        let caps = Capabilities::postgres();
        let a = PlanFingerprint::compute(&plan("items"), &caps).unwrap();
        let b = PlanFingerprint::compute(&plan("items"), &caps).unwrap();
        let c = PlanFingerprint::compute(&plan("orders"), &caps).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_hex().len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_capabilities() {
        let p = plan("items");
        let pg = PlanFingerprint::compute(&p, &Capabilities::postgres()).unwrap();
        let lite = PlanFingerprint::compute(&p, &Capabilities::sqlite()).unwrap();
        assert_ne!(pg, lite);
    }
}
