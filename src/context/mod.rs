pub mod compaction;
pub mod markers;
pub mod relevance;

use crate::config::prompt::PromptConfig;
use crate::models::chat::{ ChatTurn, UiMessage };
use crate::models::guide::GuideCatalog;

/// System instructions and message list handed to the model for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub system_prompt: String,
    pub messages: Vec<UiMessage>,
}

impl PromptContext {
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.messages.iter().map(ChatTurn::from).collect()
    }
}

/// Base persona, then the track script, then the relevant-guide block.
pub fn build_system_prompt(
    config: &PromptConfig,
    catalog: &GuideCatalog,
    track: Option<&str>,
    messages: &[UiMessage]
) -> String {
    let guide_context = relevance::relevant_guide_context(
        messages,
        catalog,
        &config.semantic_map,
        &config.relevance
    );
    let mut prompt = config.base_prompt(catalog);
    prompt.push_str(config.track_prompt(track));
    prompt.push_str(&guide_context);
    prompt
}

/// Scores guides over the full history, then compacts it.
pub fn prepare_context(
    config: &PromptConfig,
    catalog: &GuideCatalog,
    track: Option<&str>,
    messages: Vec<UiMessage>
) -> PromptContext {
    let system_prompt = build_system_prompt(config, catalog, track, &messages);
    let messages = compaction::compact(messages, &config.compaction);
    PromptContext { system_prompt, messages }
}
