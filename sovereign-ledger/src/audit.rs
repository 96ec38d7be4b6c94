//! Tamper-evident audit chain.
//!
//! Each event commits to its predecessor's hash, so any edit to a stored
//! event (or any reordering) breaks every link after it. The verifier is
//! pure and works on any ordered slice of events, independent of storage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Root of every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Pipeline stage an event was recorded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStage {
    Ingest,
    LeakDetect,
    Plan,
    GuardCheck,
    Publish,
    AuditAppend,
}

impl AuditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStage::Ingest => "INGEST",
            AuditStage::LeakDetect => "LEAK_DETECT",
            AuditStage::Plan => "PLAN",
            AuditStage::GuardCheck => "GUARD_CHECK",
            AuditStage::Publish => "PUBLISH",
            AuditStage::AuditAppend => "AUDIT_APPEND",
        }
    }
}

impl std::fmt::Display for AuditStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AuditEvent {
    /// Event identifier (not covered by the digest)
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub stage: AuditStage,
    /// Human-readable label (not covered by the digest)
    pub event: String,
    #[cfg_attr(feature = "typescript", ts(type = "unknown"))]
    pub payload: Value,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    pub hash: String,
}

/// Outcome of walking a chain from genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ChainValidation {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    /// Index of the first event failing either check
    #[serde(rename = "brokenAt")]
    pub broken_at: Option<usize>,
}

impl ChainValidation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            broken_at: None,
        }
    }

    pub fn broken_at(index: usize) -> Self {
        Self {
            is_valid: false,
            broken_at: Some(index),
        }
    }
}

/// Rebuild a JSON value with every object's keys in lexicographic order.
pub fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonical_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

/// Serialize a payload into its unique canonical text.
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(&canonical_value(value)).unwrap_or_default()
}

/// Compute SHA256 hash of content.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Digest of one link: `prevHash|timestamp|stage|canonical(payload)`.
pub fn event_hash(prev_hash: &str, timestamp: i64, stage: AuditStage, payload: &Value) -> String {
    let material = format!(
        "{}|{}|{}|{}",
        prev_hash,
        timestamp,
        stage.as_str(),
        canonicalize(payload)
    );
    compute_hash(material.as_bytes())
}

/// Create the event that follows `prev_hash`.
pub fn append(
    prev_hash: &str,
    timestamp: i64,
    stage: AuditStage,
    event: &str,
    payload: Value,
) -> AuditEvent {
    let hash = event_hash(prev_hash, timestamp, stage, &payload);
    AuditEvent {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp,
        stage,
        event: event.to_string(),
        payload,
        prev_hash: prev_hash.to_string(),
        hash,
    }
}

/// Walk a chain from genesis, stopping at the first broken link.
pub fn validate(events: &[AuditEvent]) -> ChainValidation {
    let mut running = GENESIS_HASH.to_string();
    for (index, event) in events.iter().enumerate() {
        if event.prev_hash != running {
            return ChainValidation::broken_at(index);
        }
        let expected = event_hash(&event.prev_hash, event.timestamp, event.stage, &event.payload);
        if event.hash != expected {
            return ChainValidation::broken_at(index);
        }
        running = expected;
    }
    ChainValidation::valid()
}

/// An append-only chain of audit events.
///
/// A chain loaded from storage keeps every record from the first one that
/// does not decode as an [`AuditEvent`] verbatim in `undecoded`. Such a chain
/// is not intact: it validates as broken at that record and must not be
/// written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditChain {
    events: Vec<AuditEvent>,
    undecoded: Vec<Value>,
    damaged: bool,
}

impl AuditChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap previously persisted events.
    pub fn from_events(events: Vec<AuditEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Decode stored records one by one, stopping at the first failure.
    pub fn from_stored(records: Vec<Value>) -> Self {
        let mut events = Vec::with_capacity(records.len());
        let mut records = records.into_iter();
        while let Some(record) = records.next() {
            match serde_json::from_value::<AuditEvent>(record.clone()) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(index = events.len(), error = %e, "Stored audit event does not decode");
                    let mut undecoded = vec![record];
                    undecoded.extend(records);
                    return Self {
                        events,
                        undecoded,
                        damaged: true,
                    };
                }
            }
        }
        Self::from_events(events)
    }

    /// A stored chain that could not be read at all.
    pub fn unreadable(records: Vec<Value>) -> Self {
        Self {
            events: Vec::new(),
            undecoded: records,
            damaged: true,
        }
    }

    /// Whether the stored chain loaded in full.
    pub fn is_intact(&self) -> bool {
        !self.damaged
    }

    /// Stored records from the first one that failed to decode.
    pub fn undecoded(&self) -> &[Value] {
        &self.undecoded
    }

    /// Hash the next event must link to.
    pub fn head_hash(&self) -> &str {
        self.events
            .last()
            .map(|e| e.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Append an event stamped with the current time.
    pub fn record(&mut self, stage: AuditStage, event: &str, payload: Value) -> &AuditEvent {
        self.record_at(crate::types::now_ms(), stage, event, payload)
    }

    /// Append an event with an explicit timestamp.
    pub fn record_at(
        &mut self,
        timestamp: i64,
        stage: AuditStage,
        event: &str,
        payload: Value,
    ) -> &AuditEvent {
        let next = append(self.head_hash(), timestamp, stage, event, payload);
        tracing::debug!(stage = %stage, hash = %next.hash, "Audit event appended");
        self.events.push(next);
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<AuditEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Validate the decoded events; a damaged chain breaks where decoding stopped.
    pub fn validate(&self) -> ChainValidation {
        let validation = validate(&self.events);
        if validation.is_valid && self.damaged {
            return ChainValidation::broken_at(self.events.len());
        }
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain_of(n: usize) -> AuditChain {
        let mut chain = AuditChain::new();
        for i in 0..n {
            chain.record_at(
                1_700_000_000_000 + i as i64,
                AuditStage::Plan,
                "step",
                json!({"i": i, "nested": {"b": 2, "a": 1}}),
            );
        }
        chain
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_canonicalize_sorts_recursively() {
        let a = json!({"b": 1, "a": {"d": [{"z": 1, "y": 2}], "c": null}});
        assert_eq!(
            canonicalize(&a),
            r#"{"a":{"c":null,"d":[{"y":2,"z":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_genesis_link() {
        let chain = chain_of(1);
        assert_eq!(chain.events()[0].prev_hash, GENESIS_HASH);
        assert_eq!(chain.head_hash(), chain.events()[0].hash);
    }

    #[test]
    fn test_untampered_chain_is_valid() {
        assert_eq!(chain_of(0).validate(), ChainValidation::valid());
        assert_eq!(chain_of(5).validate(), ChainValidation::valid());
    }

    #[test]
    fn test_tampering_any_hashed_field_breaks_at_k() {
        let n = 5;
        for k in 0..n {
            let tampers: Vec<Box<dyn Fn(&mut AuditEvent)>> = vec![
                Box::new(|e: &mut AuditEvent| e.timestamp += 1),
                Box::new(|e: &mut AuditEvent| e.stage = AuditStage::Publish),
                Box::new(|e: &mut AuditEvent| e.payload = json!({"i": 999})),
                Box::new(|e: &mut AuditEvent| e.prev_hash = "f".repeat(64)),
                Box::new(|e: &mut AuditEvent| e.hash = "0".repeat(64)),
            ];
            for tamper in tampers {
                let mut events = chain_of(n).into_events();
                tamper(&mut events[k]);
                assert_eq!(validate(&events), ChainValidation::broken_at(k));
            }
        }
    }

    #[test]
    fn test_undecodable_event_breaks_at_k() {
        let tampers: Vec<(&str, Value)> = vec![
            ("stage", json!("TAMPERED")),
            ("timestamp", json!("1700000000002")),
            ("hash", Value::Null),
        ];
        for (field, value) in tampers {
            let mut records: Vec<Value> = chain_of(5)
                .events()
                .iter()
                .map(|e| serde_json::to_value(e).unwrap())
                .collect();
            records[2][field] = value;

            let chain = AuditChain::from_stored(records.clone());
            assert!(!chain.is_intact(), "field: {}", field);
            assert_eq!(chain.len(), 2);
            assert_eq!(chain.undecoded(), &records[2..]);
            assert_eq!(chain.validate(), ChainValidation::broken_at(2));
        }
    }

    #[test]
    fn test_hash_failure_before_decode_failure_wins() {
        let mut records: Vec<Value> = chain_of(4)
            .events()
            .iter()
            .map(|e| serde_json::to_value(e).unwrap())
            .collect();
        records[1]["payload"] = json!({"i": 7});
        records[3]["stage"] = json!("TAMPERED");
        assert_eq!(
            AuditChain::from_stored(records).validate(),
            ChainValidation::broken_at(1)
        );
    }

    #[test]
    fn test_stored_chain_round_trips_intact() {
        let records: Vec<Value> = chain_of(3)
            .events()
            .iter()
            .map(|e| serde_json::to_value(e).unwrap())
            .collect();
        let chain = AuditChain::from_stored(records);
        assert!(chain.is_intact());
        assert_eq!(chain.len(), 3);
        assert!(chain.undecoded().is_empty());
        assert!(chain.validate().is_valid);

        let unreadable = AuditChain::unreadable(vec![json!("not a chain")]);
        assert!(!unreadable.is_intact());
        assert_eq!(unreadable.validate(), ChainValidation::broken_at(0));
    }

    #[test]
    fn test_reordering_breaks_chain() {
        let mut events = chain_of(3).into_events();
        events.swap(1, 2);
        assert_eq!(validate(&events).broken_at, Some(1));
    }

    #[test]
    fn test_key_order_does_not_change_hash() {
        let h1 = event_hash(GENESIS_HASH, 1, AuditStage::Ingest, &json!({"a": 1, "b": 2}));
        let h2 = event_hash(GENESIS_HASH, 1, AuditStage::Ingest, &json!({"b": 2, "a": 1}));
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_serialized_field_names() {
        let chain = chain_of(1);
        let value = serde_json::to_value(&chain.events()[0]).unwrap();
        assert!(value.get("prevHash").is_some());
        assert_eq!(value["stage"], "PLAN");

        let validation = serde_json::to_value(ChainValidation::broken_at(2)).unwrap();
        assert_eq!(validation, json!({"isValid": false, "brokenAt": 2}));
    }
}
