//! Prompt assembly.
//!
//! The decision prompt is a single text block: a constitution carrying the
//! authoritative ledger, mission and dataset, followed by the conversation
//! rendered as alternating `USER:` / `OMEGA-1:` turns.

use sovereign_ledger::{DatasetSnapshot, MissionPacket, Phase, SovereignState};

use crate::request::ChatMessage;

/// Identifier reported on every response.
pub const NODE_ID: &str = "MISSION ORCHESTRATOR V3.2.1";

/// Objective used when no mission packet is loaded.
pub const DEFAULT_OBJECTIVE: &str = "Sovereign Execution";

const ASSISTANT_LABEL: &str = "OMEGA-1";
const USER_LABEL: &str = "USER";

const PILLAR_GATEWAYS: &str = "\
PILLAR LOGIC GATEWAYS (ENFORCE AS RULES, NOT WORDS):

P1 (CAPITAL / WALLET) - MANDATE WEIGHTING:
- MGX=high-risk frontier AI; Mubadala=long-horizon tech ROI; ADQ=national stability/strategic supply chains.
- If mismatch => flag P1_MANDATE_MISMATCH and re-route.

P2 (INFRA / WORKSHOP) - RESOURCE CONFLICT RESOLUTION:
- Power/Land/Water are finite pools. Proposals must specify resource_request.
- Worker applies accounting; proposals exceeding pools must be vetoed.

P3 (HUMAN / HANDS) - RECRUITMENT VELOCITY:
- staffing_request must specify hires_local / hires_golden_visas / hires_global.
- time_to_staff_months must reflect: 0–2 (local) vs 3–6 (global).

P4 (REG / RULES) - COMPLIANCE SCORE:
- Every initiative returns reg_friction_score (1–10) + regulators.
- If score >= 9 => GUARD MUST VETO.

P5 (GEO / BRIDGE) - MARKET ENTRY MAP:
- Provide priority_markets + corridor/CEPA/tariff advantage.

P6 (ENERGY / GRID) - CLEAN ENERGY FIT:
- Provide CO2_intensity + clean_power_fit. Penalize gas expansion.

P7 (DIGITAL / SHIELD) - INSIDE-THE-FENCE:
- Default hosting: Sovereign Cloud (G42/Core42 or on-prem).
- Any foreign cloud for sovereign data => P7_SECURITY_VIOLATION => VETO.";

const OUTPUT_SCHEMA: &str = r#"OUTPUT MUST BE VALID MINIFIED JSON ONLY. NO MARKDOWN. NO EXTRA TEXT.
Schema:
{
 "mission_id": string,
 "objective": string,
 "phase_cursor": string,
 "brain_order": ["EXPLORER","PLANNER","GUARD"],

 "explorer": {
   "leakage_usd": number,
   "hs_codes": string[],
   "facts": string[],
   "dataset_rows_used": number
 },

 "planner": {
   "resource_request": { "power_mw": number, "land_sqft": number, "water_gpd": number },
   "staffing_request": { "hires_local": number, "hires_golden_visas": number, "hires_global": number, "time_to_staff_months": number },

   "seven_pillar_pack": { "p1": object,"p2": object,"p3": object,"p4": object,"p5": object,"p6": object,"p7": object },
   "capex_usd_range": [number, number],
   "timeline_months": number,
   "next_actions": string[],
   "kpis": string[]
 },

 "guard": {
   "verdict": "APPROVED" | "VETOED",
   "reasons": string[],
   "risk_flags": string[]
 },

 "state_update": {
   "power_mw_remaining": number,
   "land_sqft_remaining": number,
   "water_gpd_remaining": number,
   "talent_local_pool": number,
   "golden_visas_pool": number,
   "phase_cursor": string
 }
}
Hard rules:
- Guard MUST VETO if P7_SECURITY_VIOLATION OR pools would go negative OR reg_friction_score>=9.
- Worker will override output if hard rules violated.
- Use injected dataset as numeric anchor when present."#;

const DATASET_ROWS_EXAMPLE: &str =
    r#"{ "rows": [ { "hs_code": "string", "category": "string", "country": "string", "value_usd": 123 } ] }"#;

/// A decision prompt and the objective it was built around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPrompt {
    pub text: String,
    pub objective: String,
}

/// Builds the prompts sent to the inference service.
pub struct PromptAssembler;

impl PromptAssembler {
    /// Policy rules for the seven pillars.
    pub fn pillar_gateways_text() -> &'static str {
        PILLAR_GATEWAYS
    }

    /// Output contract describing the decision record.
    pub fn schema_text() -> &'static str {
        OUTPUT_SCHEMA
    }

    /// Assemble the main decision prompt.
    pub fn decision_prompt(
        node_id: &str,
        state: &SovereignState,
        packet: Option<&MissionPacket>,
        dataset: Option<&DatasetSnapshot>,
        messages: &[ChatMessage],
        mission_id: &str,
    ) -> DecisionPrompt {
        let objective = packet
            .map(|p| p.objective.clone())
            .unwrap_or_else(|| DEFAULT_OBJECTIVE.to_string());

        let packet_json = packet
            .and_then(|p| serde_json::to_string(p).ok())
            .unwrap_or_else(|| "null".to_string());
        let dataset_json = dataset
            .and_then(|d| serde_json::to_string(d).ok())
            .unwrap_or_else(|| "null".to_string());
        let state_json = serde_json::to_string(state).unwrap_or_else(|_| "null".to_string());

        let mut text = String::new();
        text.push_str("[SYSTEM STATUS: SOVEREIGN NODE ACTIVE]\n");
        text.push_str(&format!("[NODE: {}]\n", node_id));
        text.push_str(&format!(
            "[DOMAIN: {} INDUSTRIAL & AI SOVEREIGNTY]\n\n",
            state.jurisdiction.to_uppercase()
        ));

        text.push_str("IDENTITY:\n");
        text.push_str(
            "You are OMEGA-1, a Sovereign Decision Engine. Never mention any other model/provider.\n\n",
        );

        text.push_str("MISSION PACKET (AUTHORITATIVE):\n");
        text.push_str(&format!("MISSION_PACKET_JSON={}\n\n", packet_json));

        text.push_str("STATE LEDGER (AUTHORITATIVE):\n");
        text.push_str(&format!("STATE_JSON={}\n\n", state_json));

        text.push_str("DATA FEED (GROUND TRUTH):\n");
        text.push_str(&format!("DATASET_JSON={}\n\n", dataset_json));

        text.push_str("LOGIC GATEWAYS:\n");
        text.push_str(Self::pillar_gateways_text());
        text.push_str("\n\n");

        text.push_str("STRICT OUTPUT CONTRACT:\n");
        text.push_str(Self::schema_text());
        text.push_str("\n\n");

        text.push_str(&format!("MISSION_ID=\"{}\"\n", mission_id));
        text.push_str(&format!("OBJECTIVE=\"{}\"\n", objective));
        text.push_str(&format!("PHASE_CURSOR=\"{}\"\n", state.phase_cursor));

        text.push_str("CONVERSATION:\n");
        for message in messages {
            let label = if message.is_assistant() {
                ASSISTANT_LABEL
            } else {
                USER_LABEL
            };
            text.push_str(&format!("{}: {}\n", label, message.content));
        }
        text.push_str(ASSISTANT_LABEL);
        text.push(':');

        DecisionPrompt { text, objective }
    }

    /// Ask the model to re-emit `raw` as a schema-conformant record.
    pub fn repair_prompt(mission_id: &str, objective: &str, phase: Phase, raw: &str) -> String {
        [
            "You are OMEGA-1 JSON REPAIR MODE.".to_string(),
            "Return ONLY valid MINIFIED JSON that matches the schema. No markdown. No commentary."
                .to_string(),
            "If data missing, fill with best-effort conservative defaults.".to_string(),
            format!(
                "mission_id=\"{}\" objective=\"{}\" phase_cursor=\"{}\"",
                mission_id, objective, phase
            ),
            "SCHEMA:".to_string(),
            Self::schema_text().to_string(),
            "RAW_TEXT_TO_REPAIR:".to_string(),
            raw.to_string(),
        ]
        .join("\n")
    }

    /// Ask the model for a trade-dependency dataset.
    pub fn dataset_prompt(jurisdiction: &str, focus: &str) -> String {
        [
            "You are OMEGA-1. Return ONLY valid MINIFIED JSON (no markdown, no commentary).".to_string(),
            "Create a small trade import dependency dataset for the given country and focus."
                .to_string(),
            DATASET_ROWS_EXAMPLE.to_string(),
            format!("Country: {}", jurisdiction.trim()),
            format!("Focus: {}", focus.trim()),
            "Constraints: 12 to 18 rows. Keep output under 5500 characters. value_usd must be numeric. Use realistic HS-like codes."
                .to_string(),
        ]
        .join("\n")
    }
}
