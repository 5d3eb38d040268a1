//! API Models
//!
//! This module defines the REST payloads served by the handlers, with `utoipa`
//! schemas for the generated OpenAPI documentation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sparc_core::{
    health::ConnectionStatus,
    scenario::{Difficulty, PersonaProfile, Scenario},
    speech::Voice,
};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Persona {
    #[schema(example = "Anne Palmer")]
    pub name: String,
    /// Zero for coach and supervisor personas.
    pub age: u32,
    pub child_age: u32,
    pub background: String,
    pub concerns: Vec<String>,
    pub is_agent: bool,
}

impl From<&PersonaProfile> for Persona {
    fn from(profile: &PersonaProfile) -> Self {
        Self {
            name: profile.name.clone(),
            age: profile.age,
            child_age: profile.child_age,
            background: profile.background.clone(),
            concerns: profile.concerns.clone(),
            is_agent: profile.is_agent(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ScenarioInfo {
    #[schema(example = "hpv-initial")]
    pub id: String,
    pub title: String,
    pub description: String,
    #[schema(value_type = String, example = "Beginner")]
    pub difficulty: Difficulty,
    #[schema(example = "10-15 min")]
    pub duration: String,
    pub objectives: Vec<String>,
    pub persona: Persona,
    #[schema(value_type = Option<String>, example = "anne")]
    pub voice: Option<Voice>,
    /// The persona's first line in a new session.
    pub opening_line: String,
}

impl From<&Scenario> for ScenarioInfo {
    fn from(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id.clone(),
            title: scenario.title.clone(),
            description: scenario.description.clone(),
            difficulty: scenario.difficulty,
            duration: scenario.duration.clone(),
            objectives: scenario.objectives.clone(),
            persona: Persona::from(&scenario.persona),
            voice: scenario.voice,
            opening_line: scenario.opening_line(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub is_connected: bool,
    #[schema(example = "gpt-oss-120b")]
    pub model: String,
    pub base_url: String,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `live` or `scripted`.
    #[schema(example = "live")]
    pub response_mode: String,
}

impl StatusReport {
    pub fn new(status: ConnectionStatus, response_mode: &str) -> Self {
        Self {
            is_connected: status.is_connected,
            model: status.model,
            base_url: status.base_url,
            last_checked: status.last_checked,
            error: status.error,
            response_mode: response_mode.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
