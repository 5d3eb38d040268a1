//! Prompt Resolver
//!
//! Maps a scenario id to the system prompt that shapes the persona's replies.
//! Prompts live in a directory of text files, one per scenario, and are read
//! once at startup.

use crate::scenario::DEFAULT_SCENARIO_ID;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("No system prompt available for scenario '{0}'")]
    Unavailable(String),
    #[error("Failed to read prompt store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can produce a system prompt for a scenario.
pub trait PromptResolver: Send + Sync {
    fn resolve(&self, scenario_id: &str) -> Result<String, PromptError>;
}

/// An in-memory prompt table with a designated fallback persona.
#[derive(Debug, Clone)]
pub struct PromptStore {
    prompts: HashMap<String, String>,
    default_id: String,
}

impl PromptStore {
    /// Creates a store whose unknown ids fall back to the default scenario's prompt.
    pub fn new(prompts: HashMap<String, String>) -> Self {
        Self {
            prompts,
            default_id: DEFAULT_SCENARIO_ID.to_string(),
        }
    }

    /// Loads every `.md` and `.txt` file in `dir`, keyed by file stem.
    pub fn load_dir(dir: &Path) -> Result<Self, PromptError> {
        let io_err = |source| PromptError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut prompts = HashMap::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_prompt = matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("md") | Some("txt")
            );
            if !path.is_file() || !is_prompt {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping prompt file with a non UTF-8 name");
                continue;
            };
            let content = fs::read_to_string(&path).map_err(|source| PromptError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(scenario_id = %key, "Loaded system prompt");
            prompts.insert(key.to_string(), content);
        }
        Ok(Self::new(prompts))
    }

    fn lookup(&self, scenario_id: &str) -> Option<&str> {
        self.prompts
            .get(scenario_id)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
    }
}

impl PromptResolver for PromptStore {
    fn resolve(&self, scenario_id: &str) -> Result<String, PromptError> {
        if let Some(prompt) = self.lookup(scenario_id) {
            return Ok(prompt.to_string());
        }
        match self.lookup(&self.default_id) {
            Some(prompt) => {
                debug!(%scenario_id, default = %self.default_id, "Using default persona prompt");
                Ok(prompt.to_string())
            }
            None => Err(PromptError::Unavailable(scenario_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioRegistry;

    fn store() -> PromptStore {
        let mut prompts = HashMap::new();
        prompts.insert("hpv-initial".to_string(), "You are Anne Palmer.".to_string());
        prompts.insert("vaccine-hesitant".to_string(), "You are Maya Pena.".to_string());
        prompts.insert("clear-coach".to_string(), "   ".to_string());
        PromptStore::new(prompts)
    }

    #[test]
    fn test_resolve_known_id() {
        assert_eq!(
            store().resolve("vaccine-hesitant").unwrap(),
            "You are Maya Pena."
        );
    }

    #[test]
    fn test_unknown_and_blank_ids_fall_back_to_default() {
        let store = store();
        assert_eq!(store.resolve("no-such-id").unwrap(), "You are Anne Palmer.");
        assert_eq!(store.resolve("clear-coach").unwrap(), "You are Anne Palmer.");
    }

    #[test]
    fn test_missing_default_is_unavailable() {
        let store = PromptStore::new(HashMap::new());
        let err = store.resolve("hpv-initial").unwrap_err();
        assert!(matches!(err, PromptError::Unavailable(id) if id == "hpv-initial"));
    }

    #[test]
    fn test_load_dir_reads_md_and_txt_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hpv-initial.md"), "Anne prompt").unwrap();
        fs::write(dir.path().join("clear-coach.txt"), "Coach prompt").unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let store = PromptStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.resolve("hpv-initial").unwrap(), "Anne prompt");
        assert_eq!(store.resolve("clear-coach").unwrap(), "Coach prompt");
        assert_eq!(store.resolve("notes").unwrap(), "Anne prompt");
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let err = PromptStore::load_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, PromptError::Io { .. }));
    }

    #[test]
    fn test_shipped_prompts_cover_every_scenario() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../prompts");
        let store = PromptStore::load_dir(&dir).unwrap();
        for id in ScenarioRegistry::builtin().ids() {
            let prompt = store.resolve(id).unwrap();
            assert!(!prompt.is_empty(), "empty prompt for {id}");
            assert!(store.prompts.contains_key(id), "no prompt file for {id}");
        }
    }
}
