//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the services every
//! practice session shares: the scenario catalog, the reply source, the
//! feedback tagger, text-to-speech and the backend connection monitor.

use crate::config::{Config, ResponseMode};
use anyhow::Context;
use sparc_core::{
    feedback::{FeedbackTagger, KeywordTagger},
    health::ConnectionMonitor,
    llm_client::{
        ChatBackend, LiveResponder, OpenAICompatibleBackend, ResponseService, ScriptedResponder,
    },
    prompts::PromptStore,
    scenario::ScenarioRegistry,
    session::{SessionOrchestrator, SpeechServices},
    speech::{AudioOutput, AudioPlayer, ElevenLabsSynthesizer, SpeechSynthesizer},
};
use std::sync::Arc;
use tracing::info;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub scenarios: Arc<ScenarioRegistry>,
    pub responder: Arc<dyn ResponseService>,
    pub tagger: Arc<dyn FeedbackTagger>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub monitor: Arc<ConnectionMonitor>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the production services from configuration.
    ///
    /// Prompts are only read in live mode; the scripted responder never
    /// needs them.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend: Arc<dyn ChatBackend> = Arc::new(OpenAICompatibleBackend::new(
            config.navigator_api_key.clone(),
            config.navigator_base_url.clone(),
            config.model_name.clone(),
        ));

        let responder: Arc<dyn ResponseService> = match config.response_mode {
            ResponseMode::Live => {
                let prompts = PromptStore::load_dir(&config.prompts_path).with_context(|| {
                    format!("Failed to load prompts from {}", config.prompts_path.display())
                })?;
                info!(model = %config.model_name, "Using live persona replies.");
                Arc::new(LiveResponder::new(backend.clone(), Arc::new(prompts)))
            }
            ResponseMode::Scripted => {
                info!("Using scripted persona replies.");
                Arc::new(ScriptedResponder::default())
            }
        };

        let synthesizer = Arc::new(ElevenLabsSynthesizer::new(
            config.elevenlabs_api_key.clone(),
            config.elevenlabs_base_url.clone(),
        ));

        Ok(Self {
            scenarios: Arc::new(ScenarioRegistry::builtin()),
            responder,
            tagger: Arc::new(KeywordTagger::default()),
            synthesizer,
            monitor: Arc::new(ConnectionMonitor::new(backend)),
            config: Arc::new(config),
        })
    }

    /// A fresh session over the shared services. Without an `output` the
    /// session stays text-only.
    pub fn orchestrator(&self, output: Option<Arc<dyn AudioOutput>>) -> SessionOrchestrator {
        let speech = output.map(|output| SpeechServices {
            synthesizer: self.synthesizer.clone(),
            player: AudioPlayer::new(output),
        });
        SessionOrchestrator::new(self.responder.clone(), self.tagger.clone(), speech)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_scripted_mode_skips_prompt_loading() {
        let state = AppState::from_config(scripted_config()).unwrap();
        assert_eq!(state.scenarios.list_scenarios().len(), 6);
    }

    #[test]
    fn test_live_mode_requires_prompts() {
        let mut config = scripted_config();
        config.response_mode = ResponseMode::Live;
        let err = AppState::from_config(config).err().unwrap();
        assert!(err.to_string().contains("Failed to load prompts"));
    }

    #[test]
    fn test_live_mode_with_shipped_prompts() {
        let mut config = scripted_config();
        config.response_mode = ResponseMode::Live;
        config.prompts_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../prompts");
        assert!(AppState::from_config(config).is_ok());
    }
}
