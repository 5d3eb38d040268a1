//! Orchestration core for the SPARC-P communication trainer.
//!
//! A trainee picks a scenario, exchanges turns with a simulated parent or
//! agent persona, and gets C-LEAR feedback tags on what they said. Persona
//! replies come from an OpenAI-compatible chat backend and are optionally
//! spoken through a text-to-speech provider.

pub mod feedback;
pub mod health;
pub mod llm_client;
pub mod prompts;
pub mod scenario;
pub mod session;
pub mod speech;

pub use feedback::{ClearTag, FeedbackTagger, KeywordTagger};
pub use scenario::{Scenario, ScenarioRegistry};
pub use session::{SessionEvent, SessionOrchestrator, SessionSnapshot};
