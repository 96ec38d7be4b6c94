//! Sovereign resource ledger.
//!
//! The deterministic core of the decision pipeline:
//!
//! - **State**: per-jurisdiction resource pools, staffing pools and the
//!   mission phase cursor ([`SovereignState`])
//! - **Decision Record**: the leniently parsed, model-authored proposal
//!   ([`DecisionRecord`])
//! - **Accounting**: the trust boundary that clamps proposals, vetoes
//!   violations and commits approvals ([`AccountingEnforcer`])
//! - **Phases**: the bounded, monotonic lifecycle cursor ([`PhaseAutomaton`])
//! - **Audit**: a hash-linked, append-only event log ([`AuditChain`])
//! - **Store**: typed persistence over a key-value backend ([`LedgerStore`])
//!
//! Nothing here talks to a model or a network; everything is synchronous
//! except the storage backends.
//!
//! # Example
//!
//! ```ignore
//! use sovereign_ledger::{AccountingEnforcer, DecisionRecord, LedgerStore, PhaseAutomaton};
//!
//! let store = LedgerStore::in_memory();
//! let mut state = store.load_state("United Arab Emirates").await;
//! let mut record = DecisionRecord::from_value(extracted).unwrap();
//!
//! let outcome = AccountingEnforcer::enforce(&mut state, &mut record);
//! PhaseAutomaton::apply(&mut state, outcome.approved, "advance to sandbox");
//! store.save_state(&mut state).await?;
//! ```

pub mod accounting;
pub mod audit;
pub mod dataset;
pub mod decision;
pub mod lenient;
pub mod phase;
pub mod store;
pub mod types;

pub use accounting::{AccountingEnforcer, EnforcementOutcome, RemainingCapacity};
pub use audit::{AuditChain, AuditEvent, AuditStage, ChainValidation, GENESIS_HASH};
pub use dataset::{fallback_rows, rows_from_value, DatasetRow, DatasetSnapshot};
pub use decision::{
    DecisionRecord, ExplorerBlock, GuardBlock, PlannerBlock, ResourceRequest, StaffingRequest,
    StateUpdate, StubReason, Verdict,
};
pub use phase::{wants_advance, PhaseAutomaton, PhaseTransition};
pub use store::{KvBackend, LedgerStore, MemoryKv, SqliteKv, StoreError};
pub use types::*;
