use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::{ info, warn };
use thiserror::Error;

use crate::context::compaction::CompactionSettings;
use crate::context::relevance::RelevanceSettings;
use crate::models::guide::GuideCatalog;

pub const DEFAULT_TRACK: &str = "local-problem";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_MODEL_ALIAS: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template '{0}' not found")] TemplateNotFound(String),
    #[error("Prompt file IO error: {0}")] IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")] JsonError(#[from] serde_json::Error),
}

fn default_track() -> String {
    DEFAULT_TRACK.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_model_alias() -> String {
    DEFAULT_MODEL_ALIAS.to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    /// Persona instructions. `{category_list}` and `{guide_ids}` are filled
    /// from the guide catalog.
    pub base_system_prompt: String,
    /// Per-track procedural scripts keyed by track id.
    #[serde(default)]
    pub tracks: HashMap<String, String>,
    #[serde(default = "default_track")]
    pub default_track: String,
    /// Trigger phrase -> guide ids.
    #[serde(default)]
    pub semantic_map: HashMap<String, Vec<String>>,
    /// Client-facing model alias -> provider model id.
    #[serde(default)]
    pub allowed_models: HashMap<String, String>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_model_alias")]
    pub default_model_alias: String,
    pub title_system_prompt: String,
    #[serde(default)]
    pub relevance: RelevanceSettings,
    #[serde(default)]
    pub compaction: CompactionSettings,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.base_system_prompt.trim().is_empty() {
            return Err(PromptError::TemplateNotFound("base_system_prompt".to_string()));
        }
        if self.title_system_prompt.trim().is_empty() {
            return Err(PromptError::TemplateNotFound("title_system_prompt".to_string()));
        }
        if !self.tracks.contains_key(&self.default_track) {
            warn!("Default track '{}' has no script; unknown tracks get none", self.default_track);
        }
        Ok(())
    }

    /// Script for `track`, falling back to the default track's script.
    pub fn track_prompt(&self, track: Option<&str>) -> &str {
        let requested = track.filter(|t| !t.is_empty()).unwrap_or(&self.default_track);
        self.tracks
            .get(requested)
            .or_else(|| self.tracks.get(&self.default_track))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Provider model id for a requested alias; anything not allow-listed
    /// gets the default model.
    pub fn resolve_model(&self, requested: Option<&str>) -> &str {
        requested
            .and_then(|alias| self.allowed_models.get(alias))
            .map(|s| s.as_str())
            .unwrap_or(&self.default_model)
    }

    pub fn base_prompt(&self, catalog: &GuideCatalog) -> String {
        self.base_system_prompt
            .replace("{category_list}", &catalog.category_list())
            .replace("{guide_ids}", &catalog.ids().join(", "))
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let mut config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let config = load_prompts_from_str(&file_content)?;
    info!(
        "Loaded prompts from {} ({} tracks, {} semantic keywords)",
        path.as_ref().display(),
        config.tracks.len(),
        config.semantic_map.len()
    );
    Ok(config)
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        if let Some(last_loaded) = current_config.last_loaded {
            if modified > last_loaded {
                info!("Prompts file changed, reloading...");
                return load_prompts(path).map(Some);
            }
        } else {
            info!("No last_loaded timestamp, reloading prompts...");
            return load_prompts(path).map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::guide::{ GuideCategory, GuideDocument };
    use std::io::Write;

    const SAMPLE: &str =
        r#"{
        "base_system_prompt": "멘토입니다.\n{category_list}\nids: {guide_ids}",
        "tracks": {"local-problem": "LOCAL", "startup": "STARTUP"},
        "semantic_map": {"쇼핑몰": ["cards"]},
        "allowed_models": {"gpt-4o": "openai/gpt-4o"},
        "title_system_prompt": "제목만",
        "relevance": {"top_n": 3}
    }"#;

    #[test]
    fn loads_with_defaults() {
        let config = load_prompts_from_str(SAMPLE).unwrap();
        assert_eq!(config.default_track, "local-problem");
        assert_eq!(config.default_model, "openai/gpt-4o-mini");
        assert_eq!(config.relevance.top_n, 3);
        assert_eq!(config.relevance.recent_window, 12);
        assert_eq!(config.compaction.keep_recent, 14);
        assert!(config.last_loaded.is_some());
    }

    #[test]
    fn unknown_track_falls_back_to_default() {
        let config = load_prompts_from_str(SAMPLE).unwrap();
        assert_eq!(config.track_prompt(Some("startup")), "STARTUP");
        assert_eq!(config.track_prompt(Some("shopping")), "LOCAL");
        assert_eq!(config.track_prompt(None), "LOCAL");
        assert_eq!(config.track_prompt(Some("")), "LOCAL");
    }

    #[test]
    fn model_allowlist_is_enforced() {
        let config = load_prompts_from_str(SAMPLE).unwrap();
        assert_eq!(config.resolve_model(Some("gpt-4o")), "openai/gpt-4o");
        assert_eq!(config.resolve_model(Some("gpt-5-ultra")), "openai/gpt-4o-mini");
        assert_eq!(config.resolve_model(None), "openai/gpt-4o-mini");
    }

    #[test]
    fn base_prompt_fills_catalog_placeholders() {
        let config = load_prompts_from_str(SAMPLE).unwrap();
        let catalog = GuideCatalog {
            categories: vec![GuideCategory {
                id: "ui".into(),
                label: "UI".into(),
                items: vec![GuideDocument {
                    id: "cards".into(),
                    title: "카드".into(),
                    description: "상품 카드".into(),
                    tags: vec![],
                    body: String::new(),
                    example: None,
                }],
            }],
        };
        assert_eq!(
            config.base_prompt(&catalog),
            "멘토입니다.\n### UI\n- **카드** (id: cards): 상품 카드\nids: cards"
        );
    }

    #[test]
    fn empty_base_prompt_is_rejected() {
        let err = load_prompts_from_str(r#"{"base_system_prompt": " ", "title_system_prompt": "t"}"#).unwrap_err();
        assert!(matches!(err, PromptError::TemplateNotFound(ref k) if k == "base_system_prompt"));
    }

    #[test]
    fn reload_detects_newer_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let mut stale = (*load_prompts(file.path()).unwrap()).clone();
        stale.last_loaded = Some(SystemTime::UNIX_EPOCH);
        let reloaded = reload_prompts_if_changed(file.path(), &Arc::new(stale)).unwrap();
        assert!(reloaded.is_some());

        let fresh = load_prompts(file.path()).unwrap();
        let mut future = (*fresh).clone();
        future.last_loaded = Some(SystemTime::now() + std::time::Duration::from_secs(3600));
        assert!(reload_prompts_if_changed(file.path(), &Arc::new(future)).unwrap().is_none());
    }
}
