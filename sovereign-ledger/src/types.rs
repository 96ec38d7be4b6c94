//! Core ledger types.
//!
//! The Sovereign State is the authoritative per-jurisdiction record of
//! resource pools, staffing pools and the mission phase cursor. Mission
//! packets are externally authored objective definitions referenced by id.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Schema version stamped on every state record.
pub const STATE_VERSION: &str = "3.2.1";

/// Most recent allocation events retained on a state record.
pub const ALLOCATION_LOG_CAPACITY: usize = 60;

const POOL_FIELDS: [&str; 3] = ["power", "land", "water"];

/// Normalize a caller-supplied jurisdiction into its partition key.
pub fn jurisdiction_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Mission lifecycle phase.
///
/// Ordered and terminal at [`Phase::Dominion`]. Unknown values read from
/// storage or from a caller reset to [`Phase::Feasibility`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum Phase {
    #[default]
    #[serde(rename = "PHASE_1_FEASIBILITY")]
    Feasibility,
    #[serde(rename = "PHASE_2_SANDBOX")]
    Sandbox,
    #[serde(rename = "PHASE_3_SCALE")]
    Scale,
    #[serde(rename = "PHASE_4_DOMINION")]
    Dominion,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Phase; 4] = [
        Phase::Feasibility,
        Phase::Sandbox,
        Phase::Scale,
        Phase::Dominion,
    ];

    /// Wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Feasibility => "PHASE_1_FEASIBILITY",
            Phase::Sandbox => "PHASE_2_SANDBOX",
            Phase::Scale => "PHASE_3_SCALE",
            Phase::Dominion => "PHASE_4_DOMINION",
        }
    }

    /// Parse an exact wire name.
    pub fn parse(raw: &str) -> Option<Phase> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw.trim())
    }

    /// Parse a wire name, resetting anything unrecognized to the initial phase.
    pub fn parse_or_initial(raw: &str) -> Phase {
        Self::parse(raw).unwrap_or_default()
    }

    /// Position in the lifecycle (0-based).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The following phase, saturating at the terminal phase.
    pub fn next(self) -> Phase {
        Self::ALL[(self.index() + 1).min(Self::ALL.len() - 1)]
    }

    /// Whether no further advance is possible.
    pub fn is_terminal(&self) -> bool {
        *self == Phase::Dominion
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Phase::parse_or_initial(&s),
            _ => Phase::default(),
        })
    }
}

/// A finite, non-negative resource pool.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct ResourcePool {
    /// Pool capacity
    #[serde(deserialize_with = "crate::lenient::number")]
    pub total: f64,
    /// Amount already committed
    #[serde(deserialize_with = "crate::lenient::number")]
    pub used: f64,
}

impl ResourcePool {
    /// Create a fresh, unused pool.
    pub fn with_total(total: f64) -> Self {
        Self { total, used: 0.0 }
    }

    /// Uncommitted capacity, floored at zero.
    pub fn remaining(&self) -> f64 {
        (self.total - self.used).max(0.0)
    }

    /// Commit an amount, never exceeding the pool total.
    pub fn commit(&mut self, amount: f64) {
        self.used = (self.used + amount).min(self.total);
    }

    /// Repair a pool read from storage so that `0 <= used <= total`.
    fn normalize(&mut self) {
        if !self.total.is_finite() || self.total < 0.0 {
            self.total = 0.0;
        }
        if !self.used.is_finite() || self.used < 0.0 {
            self.used = 0.0;
        }
        self.used = self.used.min(self.total);
    }
}

/// Whether an allocation attempt was committed or blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum AllocationKind {
    #[serde(rename = "accounting_apply")]
    Apply,
    #[serde(rename = "accounting_blocked")]
    Blocked,
}

/// One entry of the bounded allocation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AllocationEntry {
    pub ts: i64,
    pub mission_id: String,
    pub phase: Phase,
    #[serde(rename = "type")]
    pub kind: AllocationKind,
    pub power_mw: f64,
    pub land_sqft: f64,
    pub water_gpd: f64,
    pub hires_local: u64,
    pub hires_golden_visas: u64,
    pub hires_global: u64,
}

/// Authoritative ledger for one jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct SovereignState {
    /// Record schema version
    pub version: String,
    /// Upper-cased jurisdiction key
    pub jurisdiction: String,
    /// Mission currently driving this jurisdiction
    pub active_mission_id: Option<String>,
    /// Lifecycle cursor
    pub phase_cursor: Phase,
    /// Power pool (MW)
    pub power: ResourcePool,
    /// Land pool (square feet)
    pub land: ResourcePool,
    /// Water pool (gallons per day)
    pub water: ResourcePool,
    /// Local talent available for hire
    pub talent_local_pool: u64,
    /// Visa-eligible talent available for hire
    pub golden_visas_pool: u64,
    /// Sector focus of the most recent request
    pub last_focus: Option<String>,
    /// Last save time (ms since epoch)
    pub last_updated_ts: i64,
    /// Recent allocation/block events, oldest first
    pub allocations: Vec<AllocationEntry>,
}

impl Default for SovereignState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            jurisdiction: String::new(),
            active_mission_id: None,
            phase_cursor: Phase::Feasibility,
            power: ResourcePool::with_total(680.0),
            land: ResourcePool::with_total(450_000_000.0),
            water: ResourcePool::with_total(10_000_000.0),
            talent_local_pool: 450_000,
            golden_visas_pool: 200_000,
            last_focus: None,
            last_updated_ts: now_ms(),
            allocations: Vec::new(),
        }
    }
}

impl SovereignState {
    /// Fresh state for a jurisdiction.
    pub fn new(jurisdiction: &str) -> Self {
        Self {
            jurisdiction: jurisdiction_key(jurisdiction),
            ..Default::default()
        }
    }

    /// Decode a stored record over the defaults.
    ///
    /// Missing fields take their defaults. A pool that names only some of
    /// its fields keeps the default pool's value for the rest.
    pub fn from_stored(mut value: Value) -> Result<Self, serde_json::Error> {
        let defaults = serde_json::to_value(Self::default())?;
        if let Value::Object(stored) = &mut value {
            for field in POOL_FIELDS {
                if let (Some(Value::Object(pool)), Some(Value::Object(default_pool))) =
                    (stored.get_mut(field), defaults.get(field))
                {
                    for (key, default) in default_pool {
                        pool.entry(key.clone()).or_insert_with(|| default.clone());
                    }
                }
            }
        }
        serde_json::from_value(value)
    }

    /// Set the phase cursor from a raw wire value.
    ///
    /// Unrecognized values reset the cursor to the initial phase.
    pub fn set_phase(&mut self, raw: &str) {
        self.phase_cursor = Phase::parse_or_initial(raw);
    }

    /// Append an allocation event, keeping only the most recent entries.
    pub fn record_allocation(&mut self, entry: AllocationEntry) {
        self.allocations.push(entry);
        if self.allocations.len() > ALLOCATION_LOG_CAPACITY {
            let excess = self.allocations.len() - ALLOCATION_LOG_CAPACITY;
            self.allocations.drain(..excess);
        }
    }

    /// Restore structural invariants on a record read from storage.
    pub(crate) fn normalize(&mut self, jurisdiction: &str) {
        self.jurisdiction = jurisdiction_key(jurisdiction);
        if self.version.is_empty() {
            self.version = STATE_VERSION.to_string();
        }
        self.power.normalize();
        self.land.normalize();
        self.water.normalize();
        if self.allocations.len() > ALLOCATION_LOG_CAPACITY {
            let excess = self.allocations.len() - ALLOCATION_LOG_CAPACITY;
            self.allocations.drain(..excess);
        }
    }
}

/// One phase of a mission packet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct MissionPhase {
    #[serde(deserialize_with = "crate::lenient::string")]
    pub focus: String,
    #[serde(deserialize_with = "crate::lenient::string")]
    pub action: String,
    #[serde(deserialize_with = "crate::lenient::string")]
    pub result: String,
}

/// Externally authored mission definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MissionPacket {
    pub mission_id: String,
    pub objective: String,
    pub status: String,
    pub phases: BTreeMap<String, MissionPhase>,
}

/// Why a mission packet was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MissionError {
    #[error("mission packet must be a JSON object")]
    NotAnObject,

    #[error("mission packet field `{0}` must be a non-empty string")]
    MissingField(&'static str),

    #[error("mission packet `phases` must be an object of {{focus, action, result}} entries")]
    InvalidPhases,
}

impl MissionPacket {
    /// Validate an untrusted JSON value and convert it into a packet.
    pub fn from_value(value: &Value) -> Result<Self, MissionError> {
        let obj = value.as_object().ok_or(MissionError::NotAnObject)?;

        let field = |name: &'static str| -> Result<String, MissionError> {
            match obj.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
                _ => Err(MissionError::MissingField(name)),
            }
        };

        let mission_id = field("mission_id")?;
        let objective = field("objective")?;
        let status = field("status")?;

        let phases_obj = obj
            .get("phases")
            .and_then(Value::as_object)
            .ok_or(MissionError::InvalidPhases)?;

        let mut phases = BTreeMap::new();
        for (name, entry) in phases_obj {
            if !entry.is_object() {
                return Err(MissionError::InvalidPhases);
            }
            let phase: MissionPhase =
                serde_json::from_value(entry.clone()).map_err(|_| MissionError::InvalidPhases)?;
            phases.insert(name.clone(), phase);
        }

        Ok(Self {
            mission_id,
            objective,
            status,
            phases,
        })
    }
}
