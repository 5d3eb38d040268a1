//! Session Orchestrator
//!
//! The state machine behind a practice conversation:
//!
//! ```text
//! Idle --select_scenario--> Active --submit_user_turn--> TurnPending
//!   ^                         ^                              |
//!   |                         +-------- reply appended ------+
//!   +------------------- reset (from any state) ------------------
//! ```
//!
//! - `message`: message identity, senders and presentation snapshots.
//! - `orchestrator`: the `SessionOrchestrator` and its change events.

mod message;
mod orchestrator;

pub use message::{Message, MessageId, MessageSnapshot, Sender};
pub use orchestrator::{
    SessionEvent, SessionOrchestrator, SessionPhase, SessionSnapshot, SpeechServices, TurnOutcome,
};
