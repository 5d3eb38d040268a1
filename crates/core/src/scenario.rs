//! Scenario Registry
//!
//! The static catalog of practice scenarios. Each scenario pairs a persona
//! profile (a parent, or a coaching "agent") with the learning objectives the
//! trainee is working on. The catalog is built once at startup and shared
//! read-only by every session.

use crate::speech::Voice;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The scenario used when a caller asks for something the catalog does not know.
pub const DEFAULT_SCENARIO_ID: &str = "hpv-initial";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Scenario '{0}' not found")]
    NotFound(String),
}

/// How challenging a scenario is for the trainee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

/// The simulated counterpart the trainee talks to.
///
/// An `age` of zero marks a non-parent persona (a coach or supervisor agent),
/// which is greeted with a different opening line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaProfile {
    pub name: String,
    pub age: u32,
    pub child_age: u32,
    pub background: String,
    pub concerns: Vec<String>,
}

impl PersonaProfile {
    /// Returns `true` for coach/supervisor personas rather than parents.
    pub fn is_agent(&self) -> bool {
        self.age == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    /// Expected length of a practice session, for display (e.g. "10-15 min").
    pub duration: String,
    pub objectives: Vec<String>,
    pub persona: PersonaProfile,
    /// The synthesized voice for this persona, if it has one.
    pub voice: Option<Voice>,
}

impl Scenario {
    /// The persona's first line, seeded into every new session.
    pub fn opening_line(&self) -> String {
        let persona = &self.persona;
        if persona.is_agent() {
            format!(
                "Hello, I'm {}. I'm here to help you practice your vaccine conversations. Share a response you would give a parent and I'll walk through it with you.",
                persona.name
            )
        } else {
            format!(
                "Hi Doctor, I'm {}. I'm here with my {}-year-old for their check-up. I have some questions about vaccines...",
                persona.name, persona.child_age
            )
        }
    }
}

/// An ordered, immutable collection of scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    scenarios: Vec<Arc<Scenario>>,
}

impl ScenarioRegistry {
    /// Creates a registry over the given scenarios, preserving their order.
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self {
            scenarios: scenarios.into_iter().map(Arc::new).collect(),
        }
    }

    /// The catalog shipped with the trainer.
    pub fn builtin() -> Self {
        Self::new(builtin_scenarios())
    }

    pub fn list_scenarios(&self) -> &[Arc<Scenario>] {
        &self.scenarios
    }

    pub fn get_scenario(&self, id: &str) -> Result<Arc<Scenario>, ScenarioError> {
        self.scenarios
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| ScenarioError::NotFound(id.to_string()))
    }

    /// Iterates over every scenario id in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().map(|s| s.id.as_str())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            id: "hpv-initial".into(),
            title: "Initial HPV Discussion".into(),
            description:
                "First-time conversation about HPV vaccination with a concerned parent".into(),
            difficulty: Difficulty::Beginner,
            duration: "10-15 min".into(),
            objectives: strings(&[
                "Build rapport",
                "Address safety concerns",
                "Provide clear recommendation",
            ]),
            persona: PersonaProfile {
                name: "Anne Palmer".into(),
                age: 37,
                child_age: 10,
                background: "First-time parent, researched online".into(),
                concerns: strings(&["vaccine safety", "necessity at young age", "side effects"]),
            },
            voice: Some(Voice::Anne),
        },
        Scenario {
            id: "vaccine-hesitant".into(),
            title: "Vaccine Hesitant Parent".into(),
            description: "Parent with strong reservations about vaccines in general".into(),
            difficulty: Difficulty::Intermediate,
            duration: "15-20 min".into(),
            objectives: strings(&[
                "Practice active listening",
                "Address misinformation",
                "Find common ground",
            ]),
            persona: PersonaProfile {
                name: "Maya Pena".into(),
                age: 38,
                child_age: 12,
                background: "Previous negative vaccine experience".into(),
                concerns: strings(&[
                    "side effects",
                    "too many vaccines",
                    "natural immunity",
                    "government trust",
                ]),
            },
            voice: Some(Voice::Maya),
        },
        Scenario {
            id: "religious-objection".into(),
            title: "Religious/Cultural Concerns".into(),
            description: "Family with religious or cultural objections to HPV vaccination".into(),
            difficulty: Difficulty::Advanced,
            duration: "20-25 min".into(),
            objectives: strings(&[
                "Respect cultural values",
                "Separate medical from moral issues",
                "Find acceptable solutions",
            ]),
            persona: PersonaProfile {
                name: "Fatima Al-Rashid".into(),
                age: 35,
                child_age: 13,
                background: "Conservative religious family".into(),
                concerns: strings(&[
                    "religious beliefs",
                    "cultural values",
                    "community pressure",
                    "appropriateness",
                ]),
            },
            voice: None,
        },
        Scenario {
            id: "research-heavy".into(),
            title: "The Research-Heavy Parent".into(),
            description:
                "Parent who has done extensive research and challenges medical recommendations"
                    .into(),
            difficulty: Difficulty::Expert,
            duration: "25-30 min".into(),
            objectives: strings(&[
                "Handle challenging questions",
                "Maintain authority while respecting research",
                "Guide to evidence-based conclusions",
            ]),
            persona: PersonaProfile {
                name: "Dr. Jennifer Martinez".into(),
                age: 45,
                child_age: 11,
                background: "PhD in Biology, questions everything".into(),
                concerns: strings(&[
                    "study limitations",
                    "long-term data",
                    "alternative approaches",
                    "risk-benefit analysis",
                ]),
            },
            voice: None,
        },
        Scenario {
            id: "clear-coach".into(),
            title: "C-LEAR Coach".into(),
            description: "Individual feedback on a single response using the C-LEAR approach"
                .into(),
            difficulty: Difficulty::Beginner,
            duration: "5-10 min".into(),
            objectives: strings(&[
                "Counsel with a clear recommendation",
                "Listen and empathize before answering",
            ]),
            persona: PersonaProfile {
                name: "C-LEAR Coach".into(),
                age: 0,
                child_age: 0,
                background: "Communication coach".into(),
                concerns: Vec::new(),
            },
            voice: None,
        },
        Scenario {
            id: "sparc-supervisor".into(),
            title: "SPARC-P Supervisor".into(),
            description: "Supervisor review of how a conversation was handled".into(),
            difficulty: Difficulty::Intermediate,
            duration: "5-10 min".into(),
            objectives: strings(&["Reflect on the conversation", "Plan the next visit"]),
            persona: PersonaProfile {
                name: "SPARC-P Supervisor".into(),
                age: 0,
                child_age: 0,
                background: "Clinical supervisor".into(),
                concerns: Vec::new(),
            },
            voice: None,
        },
    ]
}
