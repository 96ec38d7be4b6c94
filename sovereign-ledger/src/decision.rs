//! The Decision Record.
//!
//! A Decision Record is the structured output of one pipeline run. It is
//! authored by an untrusted model, so every field is read leniently and
//! anything unrecognized is carried along untouched. Only what the
//! accounting enforcer commits ever reaches the ledger.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::{Phase, SovereignState};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Fact a model (or the pipeline) uses to mark non-conformant output.
pub const NON_JSON_SENTINEL: &str = "NON_JSON_MODEL_OUTPUT";

/// Reasoning order every record declares.
pub const BRAIN_ORDER: [&str; 3] = ["EXPLORER", "PLANNER", "GUARD"];

/// Guard-block identifiers of the seven policy pillars.
pub const PILLARS: [&str; 7] = ["p1", "p2", "p3", "p4", "p5", "p6", "p7"];

/// Timeline carried by stub records.
const STUB_TIMELINE_MONTHS: f64 = 12.0;

/// Policy gate on committing resource and staffing changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum Verdict {
    #[serde(rename = "APPROVED")]
    Approved,
    #[default]
    #[serde(rename = "VETOED")]
    Vetoed,
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved)
    }
}

impl<'de> Deserialize<'de> for Verdict {
    /// Case-insensitive; anything other than `APPROVED` is a veto.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) if s.trim().eq_ignore_ascii_case("APPROVED") => Verdict::Approved,
            _ => Verdict::Vetoed,
        })
    }
}

/// Evidence gathered by the explorer stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(default)]
pub struct ExplorerBlock {
    #[serde(deserialize_with = "crate::lenient::number")]
    pub leakage_usd: f64,
    #[serde(deserialize_with = "crate::lenient::string_list")]
    pub hs_codes: Vec<String>,
    #[serde(deserialize_with = "crate::lenient::string_list")]
    pub facts: Vec<String>,
    #[serde(deserialize_with = "crate::lenient::number")]
    pub dataset_rows_used: f64,
    #[serde(flatten)]
    #[cfg_attr(feature = "typescript", ts(skip))]
    pub extra: Map<String, Value>,
}

/// Proposed draw on the resource pools.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(default)]
pub struct ResourceRequest {
    #[serde(deserialize_with = "crate::lenient::number")]
    pub power_mw: f64,
    #[serde(deserialize_with = "crate::lenient::number")]
    pub land_sqft: f64,
    #[serde(deserialize_with = "crate::lenient::number")]
    pub water_gpd: f64,
}

/// Proposed draw on the staffing pools.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(default)]
pub struct StaffingRequest {
    #[serde(deserialize_with = "crate::lenient::count")]
    pub hires_local: u64,
    #[serde(deserialize_with = "crate::lenient::count")]
    pub hires_golden_visas: u64,
    #[serde(deserialize_with = "crate::lenient::count")]
    pub hires_global: u64,
    #[serde(deserialize_with = "crate::lenient::number")]
    pub time_to_staff_months: f64,
}

/// The planner stage's proposal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(default)]
pub struct PlannerBlock {
    #[serde(deserialize_with = "crate::lenient::block")]
    pub resource_request: ResourceRequest,
    #[serde(deserialize_with = "crate::lenient::block")]
    pub staffing_request: StaffingRequest,
    /// Per-pillar policy objects, kept verbatim
    #[serde(deserialize_with = "crate::lenient::object")]
    #[cfg_attr(feature = "typescript", ts(type = "Record<string, unknown>"))]
    pub seven_pillar_pack: Map<String, Value>,
    #[serde(deserialize_with = "crate::lenient::number_list")]
    pub capex_usd_range: Vec<f64>,
    #[serde(deserialize_with = "crate::lenient::number")]
    pub timeline_months: f64,
    #[serde(deserialize_with = "crate::lenient::string_list")]
    pub next_actions: Vec<String>,
    #[serde(deserialize_with = "crate::lenient::string_list")]
    pub kpis: Vec<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "typescript", ts(skip))]
    pub extra: Map<String, Value>,
}

/// The guard stage's verdict.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(default)]
pub struct GuardBlock {
    pub verdict: Verdict,
    #[serde(deserialize_with = "crate::lenient::string_list")]
    pub reasons: Vec<String>,
    #[serde(deserialize_with = "crate::lenient::string_list")]
    pub risk_flags: Vec<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "typescript", ts(skip))]
    pub extra: Map<String, Value>,
}

impl GuardBlock {
    /// A guard block that vetoes with the given reason and flag.
    pub fn veto(reason: &str, flag: &str) -> Self {
        Self {
            verdict: Verdict::Vetoed,
            reasons: vec![reason.to_string()],
            risk_flags: vec![flag.to_string()],
            extra: Map::new(),
        }
    }
}

/// Remaining capacity echoed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(default)]
pub struct StateUpdate {
    #[serde(deserialize_with = "crate::lenient::number")]
    pub power_mw_remaining: f64,
    #[serde(deserialize_with = "crate::lenient::number")]
    pub land_sqft_remaining: f64,
    #[serde(deserialize_with = "crate::lenient::number")]
    pub water_gpd_remaining: f64,
    #[serde(deserialize_with = "crate::lenient::count")]
    pub talent_local_pool: u64,
    #[serde(deserialize_with = "crate::lenient::count")]
    pub golden_visas_pool: u64,
    pub phase_cursor: Phase,
}

impl StateUpdate {
    /// Snapshot the remaining capacity of a ledger.
    pub fn from_state(state: &SovereignState) -> Self {
        Self {
            power_mw_remaining: state.power.remaining(),
            land_sqft_remaining: state.land.remaining(),
            water_gpd_remaining: state.water.remaining(),
            talent_local_pool: state.talent_local_pool,
            golden_visas_pool: state.golden_visas_pool,
            phase_cursor: state.phase_cursor,
        }
    }
}

/// Structured output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct DecisionRecord {
    #[serde(deserialize_with = "crate::lenient::string")]
    pub mission_id: String,
    #[serde(deserialize_with = "crate::lenient::string")]
    pub objective: String,
    pub phase_cursor: Phase,
    #[serde(deserialize_with = "crate::lenient::string_list")]
    pub brain_order: Vec<String>,
    #[serde(deserialize_with = "crate::lenient::block")]
    pub explorer: ExplorerBlock,
    #[serde(deserialize_with = "crate::lenient::block")]
    pub planner: PlannerBlock,
    /// `None` when the model omitted the guard block entirely
    #[serde(deserialize_with = "crate::lenient::optional_block")]
    pub guard: Option<GuardBlock>,
    #[serde(deserialize_with = "crate::lenient::block")]
    pub state_update: StateUpdate,
    #[serde(flatten)]
    #[cfg_attr(feature = "typescript", ts(skip))]
    pub extra: Map<String, Value>,
    /// Model output as extracted, before lenient parsing
    #[serde(skip)]
    #[cfg_attr(feature = "typescript", ts(skip))]
    pub source: Option<Value>,
}

/// Why a stub record replaced model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubReason {
    /// Every inference attempt failed.
    InferenceFailure { timed_out: bool },
    /// Neither extraction nor repair produced a usable record.
    NonConformantOutput,
}

impl DecisionRecord {
    /// Read a record from an extracted JSON value.
    ///
    /// Only objects qualify; any other shape is treated as "not found".
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let mut record: Self = serde_json::from_value(value.clone()).ok()?;
        record.source = Some(value);
        Some(record)
    }

    /// Serialize into a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Serialize into compact JSON text.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The record as the enforcer inspects it.
    ///
    /// Starts from the model's raw output, so content that lenient parsing
    /// dropped is still visible, and overlays the fields the pipeline has
    /// rewritten: header fields, clamped requests and the guard block.
    /// Records without a raw source serialize as-is.
    pub fn inspection_value(&self) -> Value {
        let Some(Value::Object(raw)) = &self.source else {
            return self.to_value();
        };
        let mut value = raw.clone();

        value.insert("mission_id".to_string(), Value::String(self.mission_id.clone()));
        value.insert("objective".to_string(), Value::String(self.objective.clone()));
        value.insert(
            "phase_cursor".to_string(),
            serde_json::to_value(&self.phase_cursor).unwrap_or(Value::Null),
        );

        let requests = [
            ("resource_request", serde_json::to_value(self.planner.resource_request)),
            ("staffing_request", serde_json::to_value(self.planner.staffing_request)),
        ];
        let planner = value
            .entry("planner")
            .or_insert_with(|| Value::Object(Map::new()));
        if planner.is_null() {
            *planner = Value::Object(Map::new());
        }
        if let Value::Object(planner) = planner {
            for (key, request) in requests {
                planner.insert(key.to_string(), request.unwrap_or(Value::Null));
            }
        }

        match (value.get_mut("guard"), &self.guard) {
            (Some(Value::Object(guard)), _) => {
                // non-list flags and reasons read as empty
                for key in ["risk_flags", "reasons"] {
                    if !matches!(guard.get(key), Some(Value::Array(_))) {
                        guard.insert(key.to_string(), Value::Array(Vec::new()));
                    }
                }
            }
            (_, Some(guard)) => {
                let guard = serde_json::to_value(guard).unwrap_or(Value::Null);
                value.insert("guard".to_string(), guard);
            }
            (_, None) => {}
        }

        Value::Object(value)
    }

    /// Whether the explorer facts flag the output as non-conformant.
    pub fn has_non_json_sentinel(&self) -> bool {
        self.explorer.facts.iter().any(|f| f == NON_JSON_SENTINEL)
    }

    /// The guard verdict, reading a missing guard as a veto.
    pub fn verdict(&self) -> Verdict {
        self.guard.as_ref().map(|g| g.verdict).unwrap_or(Verdict::Vetoed)
    }

    /// Mutable guard block, materializing a format-failure veto when absent.
    pub fn guard_mut(&mut self) -> &mut GuardBlock {
        self.guard
            .get_or_insert_with(|| GuardBlock::veto("MISSING_GUARD", "FORMAT_FAILURE"))
    }

    /// Build the always well-formed, always vetoed fallback record.
    ///
    /// The state update mirrors the ledger as it stood before the request,
    /// so a stub never implies any mutation.
    pub fn stub(
        reason: StubReason,
        mission_id: &str,
        objective: &str,
        state: &SovereignState,
    ) -> Self {
        let (fact, reasons, flag, next_action, kpi) = match reason {
            StubReason::InferenceFailure { timed_out } => (
                "EDGE_TIMEOUT_OR_AI_FAILURE",
                vec![
                    "EDGE_TIMEOUT_OR_AI_FAILURE".to_string(),
                    if timed_out {
                        "INFERENCE_TIMEOUT".to_string()
                    } else {
                        "INFERENCE_ERROR".to_string()
                    },
                ],
                "EDGE_FAILURE",
                "RETRY_REQUEST",
                "RECOVER_EDGE",
            ),
            StubReason::NonConformantOutput => (
                NON_JSON_SENTINEL,
                vec!["NON_JSON_OUTPUT".to_string()],
                "FORMAT_FAILURE",
                "FIX_OUTPUT_FORMAT",
                "FORMAT_COMPLIANCE",
            ),
        };

        let seven_pillar_pack = PILLARS
            .iter()
            .map(|p| (p.to_string(), Value::Object(Map::new())))
            .collect();

        Self {
            mission_id: mission_id.to_string(),
            objective: objective.to_string(),
            phase_cursor: state.phase_cursor,
            brain_order: BRAIN_ORDER.iter().map(|s| s.to_string()).collect(),
            explorer: ExplorerBlock {
                facts: vec![fact.to_string()],
                ..Default::default()
            },
            planner: PlannerBlock {
                seven_pillar_pack,
                capex_usd_range: vec![0.0, 0.0],
                timeline_months: STUB_TIMELINE_MONTHS,
                next_actions: vec![next_action.to_string()],
                kpis: vec![kpi.to_string()],
                ..Default::default()
            },
            guard: Some(GuardBlock {
                verdict: Verdict::Vetoed,
                reasons,
                risk_flags: vec![flag.to_string()],
                extra: Map::new(),
            }),
            state_update: StateUpdate::from_state(state),
            extra: Map::new(),
            source: None,
        }
    }
}
