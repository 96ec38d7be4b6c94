//! Accounting enforcement.
//!
//! This is the trust boundary between model output and the ledger. The
//! model's numeric proposals are advisory: they are clamped, checked
//! against remaining pool capacity and the security policy, and only
//! committed when the final verdict is an approval. The enforcer's
//! verdict always wins over whatever the model's guard block claimed.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::decision::{DecisionRecord, ResourceRequest, StaffingRequest, Verdict};
use crate::types::{now_ms, AllocationEntry, AllocationKind, SovereignState};

pub const SECURITY_VIOLATION_FLAG: &str = "P7_SECURITY_VIOLATION";
pub const RESOURCE_EXCEEDED_FLAG: &str = "P2_RESOURCE_EXCEEDED";
pub const GUARD_OVERRIDE_FLAG: &str = "EDGE_GUARD_OVERRIDE";

pub const SECURITY_VIOLATION_REASON: &str = "P7 inside-the-fence violation (edge override)";
pub const RESOURCE_EXCEEDED_REASON: &str = "Resource request exceeds sovereign pools (edge override)";

const MAX_POWER_MW: f64 = 1e9;
const MAX_LAND_SQFT: f64 = 1e12;
const MAX_WATER_GPD: f64 = 1e12;
const MAX_HIRES: u64 = 1_000_000_000;
const MAX_MONTHS_TO_STAFF: f64 = 120.0;

/// Clamp a proposed amount into `0..=max`; non-finite input reads as zero.
pub fn clamp_amount(value: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, max)
}

/// Clamp a proposed head count into `0..=max`.
pub fn clamp_count(value: u64, max: u64) -> u64 {
    value.min(max)
}

/// Uncommitted capacity of each resource pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemainingCapacity {
    pub power_mw: f64,
    pub land_sqft: f64,
    pub water_gpd: f64,
}

impl RemainingCapacity {
    pub fn of(state: &SovereignState) -> Self {
        Self {
            power_mw: state.power.remaining(),
            land_sqft: state.land.remaining(),
            water_gpd: state.water.remaining(),
        }
    }

    /// Whether any part of the request exceeds what is left.
    pub fn is_exceeded_by(&self, request: &ResourceRequest) -> bool {
        request.power_mw > self.power_mw
            || request.land_sqft > self.land_sqft
            || request.water_gpd > self.water_gpd
    }
}

/// Result of one enforcement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementOutcome {
    /// Final, authoritative verdict
    pub approved: bool,
    /// Resource request after clamping
    pub resource_request: ResourceRequest,
    /// Staffing request after clamping
    pub staffing_request: StaffingRequest,
    /// A security violation forced a veto
    pub security_override: bool,
    /// A pool exceedance forced a veto
    pub exceedance_override: bool,
}

impl EnforcementOutcome {
    /// Whether the enforcer overrode the model's verdict for any reason.
    pub fn overridden(&self) -> bool {
        self.security_override || self.exceedance_override
    }

    pub fn verdict(&self) -> Verdict {
        if self.approved {
            Verdict::Approved
        } else {
            Verdict::Vetoed
        }
    }
}

/// Validates model proposals against the ledger and commits approvals.
pub struct AccountingEnforcer;

impl AccountingEnforcer {
    pub fn clamp_resources(request: &ResourceRequest) -> ResourceRequest {
        ResourceRequest {
            power_mw: clamp_amount(request.power_mw, MAX_POWER_MW),
            land_sqft: clamp_amount(request.land_sqft, MAX_LAND_SQFT),
            water_gpd: clamp_amount(request.water_gpd, MAX_WATER_GPD),
        }
    }

    pub fn clamp_staffing(request: &StaffingRequest) -> StaffingRequest {
        StaffingRequest {
            hires_local: clamp_count(request.hires_local, MAX_HIRES),
            hires_golden_visas: clamp_count(request.hires_golden_visas, MAX_HIRES),
            hires_global: clamp_count(request.hires_global, MAX_HIRES),
            time_to_staff_months: clamp_amount(request.time_to_staff_months, MAX_MONTHS_TO_STAFF),
        }
    }

    /// Whether the security-violation flag appears anywhere in the record.
    ///
    /// Checks the declared risk flags and then the whole record as the
    /// model wrote it, so a violation named outside the guard, or in a
    /// field lenient parsing discarded, still trips it.
    pub fn detects_security_violation(record: &DecisionRecord) -> bool {
        let declared = record
            .guard
            .as_ref()
            .map(|g| g.risk_flags.iter().any(|f| f.contains(SECURITY_VIOLATION_FLAG)))
            .unwrap_or(false);
        declared
            || record
                .inspection_value()
                .to_string()
                .contains(SECURITY_VIOLATION_FLAG)
    }

    /// Enforce the ledger's constraints on a decision record.
    ///
    /// Rewrites the record's requests with their clamped values and its
    /// guard block with any overrides, commits approved requests to the
    /// state, and logs the attempt either way.
    pub fn enforce(state: &mut SovereignState, record: &mut DecisionRecord) -> EnforcementOutcome {
        let remaining = RemainingCapacity::of(state);

        let resources = Self::clamp_resources(&record.planner.resource_request);
        let staffing = Self::clamp_staffing(&record.planner.staffing_request);
        record.planner.resource_request = resources;
        record.planner.staffing_request = staffing;

        // a missing guard becomes the MISSING_GUARD veto before the scan
        record.guard_mut();
        let security_override = Self::detects_security_violation(record);
        let exceedance_override = remaining.is_exceeded_by(&resources);

        let guard = record.guard_mut();
        if security_override {
            guard.verdict = Verdict::Vetoed;
            guard.risk_flags.push(SECURITY_VIOLATION_FLAG.to_string());
            guard.risk_flags.push(GUARD_OVERRIDE_FLAG.to_string());
            guard.reasons.push(SECURITY_VIOLATION_REASON.to_string());
        }
        if exceedance_override {
            guard.verdict = Verdict::Vetoed;
            guard.risk_flags.push(RESOURCE_EXCEEDED_FLAG.to_string());
            guard.risk_flags.push(GUARD_OVERRIDE_FLAG.to_string());
            guard.reasons.push(RESOURCE_EXCEEDED_REASON.to_string());
        }
        if security_override || exceedance_override {
            dedup_in_order(&mut guard.risk_flags);
            dedup_in_order(&mut guard.reasons);
            warn!(
                jurisdiction = %state.jurisdiction,
                flags = ?guard.risk_flags,
                "Guard verdict overridden"
            );
        }

        let approved = guard.verdict.is_approved();

        if approved {
            state.power.commit(resources.power_mw);
            state.land.commit(resources.land_sqft);
            state.water.commit(resources.water_gpd);
            state.talent_local_pool = state.talent_local_pool.saturating_sub(staffing.hires_local);
            state.golden_visas_pool = state
                .golden_visas_pool
                .saturating_sub(staffing.hires_golden_visas);
        }

        let mission_id = if record.mission_id.is_empty() {
            state.active_mission_id.clone().unwrap_or_default()
        } else {
            record.mission_id.clone()
        };

        state.record_allocation(AllocationEntry {
            ts: now_ms(),
            mission_id,
            phase: state.phase_cursor,
            kind: if approved {
                AllocationKind::Apply
            } else {
                AllocationKind::Blocked
            },
            power_mw: resources.power_mw,
            land_sqft: resources.land_sqft,
            water_gpd: resources.water_gpd,
            hires_local: staffing.hires_local,
            hires_golden_visas: staffing.hires_golden_visas,
            hires_global: staffing.hires_global,
        });

        debug!(
            jurisdiction = %state.jurisdiction,
            approved,
            power_mw = resources.power_mw,
            power_used = state.power.used,
            "Accounting applied"
        );

        EnforcementOutcome {
            approved,
            resource_request: resources,
            staffing_request: staffing,
            security_override,
            exceedance_override,
        }
    }
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::GuardBlock;
    use serde_json::json;

    fn record(value: serde_json::Value) -> DecisionRecord {
        DecisionRecord::from_value(value).unwrap()
    }

    fn approved_request(power_mw: f64) -> DecisionRecord {
        record(json!({
            "mission_id": "M-1",
            "planner": {
                "resource_request": {"power_mw": power_mw, "land_sqft": 0, "water_gpd": 0},
                "staffing_request": {"hires_local": 100, "hires_golden_visas": 20, "hires_global": 5}
            },
            "guard": {"verdict": "APPROVED", "reasons": [], "risk_flags": []}
        }))
    }

    #[test]
    fn test_clamp_amount() {
        assert_eq!(clamp_amount(-5.0, 10.0), 0.0);
        assert_eq!(clamp_amount(50.0, 10.0), 10.0);
        assert_eq!(clamp_amount(f64::NAN, 10.0), 0.0);
        assert_eq!(clamp_amount(f64::INFINITY, 10.0), 0.0);
        assert_eq!(clamp_amount(3.5, 10.0), 3.5);
    }

    #[test]
    fn test_exceedance_vetoes_and_commits_nothing() {
        let mut state = SovereignState::new("X");
        let mut rec = approved_request(700.0);

        let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);

        assert!(!outcome.approved);
        assert!(outcome.exceedance_override);
        assert!(!outcome.security_override);
        assert_eq!(state.power.used, 0.0);
        assert_eq!(state.talent_local_pool, 450_000);

        let guard = rec.guard.as_ref().unwrap();
        assert_eq!(guard.verdict, Verdict::Vetoed);
        assert!(guard.risk_flags.contains(&RESOURCE_EXCEEDED_FLAG.to_string()));
        assert!(guard.risk_flags.contains(&GUARD_OVERRIDE_FLAG.to_string()));
        assert_eq!(guard.reasons, vec![RESOURCE_EXCEEDED_REASON]);

        let entry = state.allocations.last().unwrap();
        assert_eq!(entry.kind, AllocationKind::Blocked);
        assert_eq!(entry.power_mw, 700.0);
        assert_eq!(entry.mission_id, "M-1");
    }

    #[test]
    fn test_approval_commits_resources_and_staff() {
        let mut state = SovereignState::new("X");
        let mut rec = approved_request(100.0);

        let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);

        assert!(outcome.approved);
        assert!(!outcome.overridden());
        assert_eq!(state.power.used, 100.0);
        assert_eq!(state.talent_local_pool, 449_900);
        assert_eq!(state.golden_visas_pool, 199_980);
        assert_eq!(state.allocations.last().unwrap().kind, AllocationKind::Apply);
    }

    #[test]
    fn test_used_is_monotonic_and_bounded() {
        let mut state = SovereignState::new("X");
        let mut last = 0.0;
        for _ in 0..10 {
            let mut rec = approved_request(100.0);
            AccountingEnforcer::enforce(&mut state, &mut rec);
            assert!(state.power.used >= last);
            assert!(state.power.used <= state.power.total);
            last = state.power.used;
        }
        assert_eq!(state.power.used, 600.0);
    }

    #[test]
    fn test_implicit_security_violation() {
        let mut state = SovereignState::new("X");
        let mut rec = record(json!({
            "planner": {
                "resource_request": {"power_mw": 1},
                "seven_pillar_pack": {"p7": {"note": "foreign cloud => P7_SECURITY_VIOLATION"}}
            },
            "guard": {"verdict": "APPROVED"}
        }));

        let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);
        assert!(!outcome.approved);
        assert!(outcome.security_override);
        assert_eq!(state.power.used, 0.0);
        let guard = rec.guard.unwrap();
        assert_eq!(guard.reasons, vec![SECURITY_VIOLATION_REASON]);
        assert_eq!(
            guard.risk_flags,
            vec![SECURITY_VIOLATION_FLAG, GUARD_OVERRIDE_FLAG]
        );
    }

    #[test]
    fn test_violation_in_discarded_fields_still_vetoes() {
        let placements = [
            json!({"state_update": {"power_mw_remaining": 1, "note": "P7_SECURITY_VIOLATION"}}),
            json!({"explorer": {"hs_codes": "8542.31 P7_SECURITY_VIOLATION"}}),
            json!({"explorer": {"leakage_usd": "P7_SECURITY_VIOLATION"}}),
            json!({"planner": {"staffing_request": {"hires_local": 1, "visa_note": "P7_SECURITY_VIOLATION"}}}),
            json!({"guard": {"verdict": "APPROVED", "note": "P7_SECURITY_VIOLATION"}}),
        ];

        for placement in placements {
            let mut value = json!({
                "mission_id": "M-1",
                "planner": {"resource_request": {"power_mw": 10}},
                "guard": {"verdict": "APPROVED", "reasons": [], "risk_flags": []}
            });
            for (key, block) in placement.as_object().unwrap() {
                match (value.get_mut(key).and_then(|v| v.as_object_mut()), block.as_object()) {
                    (Some(target), Some(fields)) => {
                        target.extend(fields.clone());
                    }
                    _ => {
                        value[key] = block.clone();
                    }
                }
            }

            let mut state = SovereignState::new("X");
            let mut rec = record(value.clone());
            let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);
            assert!(outcome.security_override, "not caught: {}", value);
            assert!(!outcome.approved);
            assert_eq!(state.power.used, 0.0);
        }
    }

    #[test]
    fn test_inspection_uses_clamped_requests() {
        // the raw request text is replaced by its clamped form before the scan
        let mut state = SovereignState::new("X");
        let mut rec = record(json!({
            "mission_id": "P7_SECURITY_VIOLATION",
            "planner": {"resource_request": {"power_mw": 10, "memo": "P7_SECURITY_VIOLATION"}},
            "guard": {"verdict": "APPROVED", "risk_flags": "P7_SECURITY_VIOLATION"}
        }));
        rec.mission_id = "M-1".to_string();

        let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);
        assert!(!outcome.security_override);
        assert!(outcome.approved);
        assert_eq!(state.power.used, 10.0);
    }

    #[test]
    fn test_both_overrides_are_additive_and_deduplicated() {
        let mut state = SovereignState::new("X");
        let mut rec = approved_request(5000.0);
        rec.guard = Some(GuardBlock {
            verdict: Verdict::Approved,
            reasons: vec![],
            risk_flags: vec![SECURITY_VIOLATION_FLAG.to_string()],
            extra: Default::default(),
        });

        let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);
        assert!(outcome.security_override && outcome.exceedance_override);

        let guard = rec.guard.unwrap();
        assert_eq!(
            guard.risk_flags,
            vec![SECURITY_VIOLATION_FLAG, GUARD_OVERRIDE_FLAG, RESOURCE_EXCEEDED_FLAG]
        );
        assert_eq!(
            guard.reasons,
            vec![SECURITY_VIOLATION_REASON, RESOURCE_EXCEEDED_REASON]
        );
    }

    #[test]
    fn test_missing_guard_blocks() {
        let mut state = SovereignState::new("X");
        state.active_mission_id = Some("ACTIVE".to_string());
        let mut rec = record(json!({"planner": {"resource_request": {"power_mw": 10}}}));

        let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);
        assert!(!outcome.approved);
        assert_eq!(rec.guard.unwrap().reasons, vec!["MISSING_GUARD"]);
        assert_eq!(state.allocations[0].mission_id, "ACTIVE");
    }

    #[test]
    fn test_adversarial_numbers_are_clamped_into_record() {
        let mut state = SovereignState::new("X");
        let mut rec = record(json!({
            "planner": {
                "resource_request": {"power_mw": -50, "land_sqft": "1e400", "water_gpd": 1e15},
                "staffing_request": {"hires_local": 5e12, "time_to_staff_months": 999}
            },
            "guard": {"verdict": "VETOED"}
        }));

        let outcome = AccountingEnforcer::enforce(&mut state, &mut rec);
        assert_eq!(outcome.resource_request.power_mw, 0.0);
        assert_eq!(outcome.resource_request.land_sqft, 0.0);
        assert_eq!(outcome.resource_request.water_gpd, MAX_WATER_GPD);
        assert_eq!(outcome.staffing_request.hires_local, MAX_HIRES);
        assert_eq!(outcome.staffing_request.time_to_staff_months, 120.0);
        assert_eq!(rec.planner.resource_request, outcome.resource_request);
    }
}
