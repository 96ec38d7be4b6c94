//! Phase automaton.
//!
//! The cursor moves forward exactly one phase, and only when the
//! enforcer approved the request and the caller asked to advance. The
//! model's own phase proposal never moves it.

use tracing::info;

use crate::types::{Phase, SovereignState};

/// Phrases that signal intent to advance (matched case-insensitively).
pub const ADVANCE_LEXICON: [&str; 14] = [
    "advance",
    "next phase",
    "proceed",
    "move to",
    "go to phase",
    "phase 2",
    "phase_2",
    "sandbox",
    "phase 3",
    "phase_3",
    "scale",
    "phase 4",
    "phase_4",
    "dominion",
];

/// Whether a user message asks to advance the mission phase.
pub fn wants_advance(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ADVANCE_LEXICON.iter().any(|term| lowered.contains(term))
}

/// A phase change applied to a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

pub struct PhaseAutomaton;

impl PhaseAutomaton {
    /// Advance the ledger's cursor if both preconditions hold.
    ///
    /// Returns the transition when the cursor actually moved. At the
    /// terminal phase an approved advance request is a no-op.
    pub fn apply(
        state: &mut SovereignState,
        approved: bool,
        last_user_text: &str,
    ) -> Option<PhaseTransition> {
        if !approved || !wants_advance(last_user_text) {
            return None;
        }

        let from = state.phase_cursor;
        let to = from.next();
        if to == from {
            return None;
        }

        state.phase_cursor = to;
        info!(
            jurisdiction = %state.jurisdiction,
            from = %from,
            to = %to,
            "Phase advanced"
        );
        Some(PhaseTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicon() {
        assert!(wants_advance("Please ADVANCE the mission"));
        assert!(wants_advance("ok, go to phase 2"));
        assert!(wants_advance("time to Scale up"));
        assert!(!wants_advance("what is our power budget?"));
        assert!(!wants_advance(""));
    }

    #[test]
    fn test_requires_approval() {
        let mut state = SovereignState::new("X");
        assert!(PhaseAutomaton::apply(&mut state, false, "advance").is_none());
        assert_eq!(state.phase_cursor, Phase::Feasibility);
    }

    #[test]
    fn test_requires_intent() {
        let mut state = SovereignState::new("X");
        assert!(PhaseAutomaton::apply(&mut state, true, "status report").is_none());
        assert_eq!(state.phase_cursor, Phase::Feasibility);
    }

    #[test]
    fn test_advances_one_step_at_a_time() {
        let mut state = SovereignState::new("X");
        // naming a far phase still moves only one step
        let t = PhaseAutomaton::apply(&mut state, true, "go straight to dominion").unwrap();
        assert_eq!(t, PhaseTransition { from: Phase::Feasibility, to: Phase::Sandbox });
        assert_eq!(state.phase_cursor, Phase::Sandbox);
    }

    #[test]
    fn test_terminal_is_noop() {
        let mut state = SovereignState::new("X");
        state.phase_cursor = Phase::Dominion;
        assert!(PhaseAutomaton::apply(&mut state, true, "advance").is_none());
        assert_eq!(state.phase_cursor, Phase::Dominion);
    }
}
