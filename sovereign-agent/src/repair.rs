//! Decision record recovery.
//!
//! Turns raw model text into a [`DecisionRecord`]: extract, repair through a
//! second inference call when needed, and fall back to a vetoed stub.

use serde::Serialize;
use tracing::{info, warn};

use sovereign_ledger::{DecisionRecord, Phase, SovereignState, StubReason};

use crate::config::SamplingConfig;
use crate::extract::extract_structured;
use crate::gateway::InferenceGateway;
use crate::prompt::PromptAssembler;

/// Where the final record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Parsed directly from the model's answer
    Extracted,
    /// Parsed from the repair call's answer
    Repaired,
    /// Neither produced a usable record
    Stub,
}

/// A recovered record and its provenance.
#[derive(Debug, Clone)]
pub struct Recovered {
    pub record: DecisionRecord,
    pub source: RecordSource,
    /// A repair call was issued
    pub repair_attempted: bool,
}

/// Authoritative values the repair prompt is anchored to.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub mission_id: &'a str,
    pub objective: &'a str,
    pub phase: Phase,
}

/// Parse text as a decision record; non-object structures do not count.
pub fn parse_record(text: &str) -> Option<DecisionRecord> {
    extract_structured(text).and_then(DecisionRecord::from_value)
}

/// Recovers decision records from model output.
pub struct OutputRepairer<'a> {
    gateway: &'a InferenceGateway,
    sampling: SamplingConfig,
}

impl<'a> OutputRepairer<'a> {
    pub fn new(gateway: &'a InferenceGateway, sampling: SamplingConfig) -> Self {
        Self { gateway, sampling }
    }

    /// Recover a record from `raw`.
    ///
    /// Repair runs when extraction finds nothing or the record carries the
    /// non-JSON sentinel. A failed repair call keeps the extracted record
    /// if there was one; unparsable repair output yields the stub.
    pub async fn recover(
        &self,
        raw: &str,
        context: RepairContext<'_>,
        state: &SovereignState,
    ) -> Recovered {
        let extracted = parse_record(raw);
        if let Some(record) = &extracted {
            if !record.has_non_json_sentinel() {
                return Recovered {
                    record: record.clone(),
                    source: RecordSource::Extracted,
                    repair_attempted: false,
                };
            }
        }

        info!(
            mission_id = context.mission_id,
            found = extracted.is_some(),
            raw_len = raw.len(),
            "Model output not conformant, running repair pass"
        );

        let prompt = PromptAssembler::repair_prompt(
            context.mission_id,
            context.objective,
            context.phase,
            raw,
        );
        let stub = || {
            DecisionRecord::stub(
                StubReason::NonConformantOutput,
                context.mission_id,
                context.objective,
                state,
            )
        };

        match self
            .gateway
            .invoke(&prompt, self.sampling.max_tokens, self.sampling.temperature)
            .await
        {
            Ok(text) => match parse_record(&text) {
                Some(record) => Recovered {
                    record,
                    source: RecordSource::Repaired,
                    repair_attempted: true,
                },
                None => {
                    warn!(mission_id = context.mission_id, "Repair output unusable, using stub");
                    Recovered {
                        record: stub(),
                        source: RecordSource::Stub,
                        repair_attempted: true,
                    }
                }
            },
            Err(e) => {
                warn!(mission_id = context.mission_id, error = %e, "Repair call failed");
                match extracted {
                    Some(record) => Recovered {
                        record,
                        source: RecordSource::Extracted,
                        repair_attempted: true,
                    },
                    None => Recovered {
                        record: stub(),
                        source: RecordSource::Stub,
                        repair_attempted: true,
                    },
                }
            }
        }
    }
}
