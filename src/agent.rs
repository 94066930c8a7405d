use futures::StreamExt;
use log::{ debug, error, info, warn };
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::cli::Args;
use crate::config::guides::{ self, GuideError };
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::context::{ self, markers, PromptContext };
use crate::llm::{ parse_llm_type, LlmConfig };
use crate::llm::chat::{
    create_streaming_response,
    new_client as new_chat_client,
    ChatChunk,
    ChatClient,
    ChatCompletionRequest,
    ChunkStream,
    TokenUsage,
};
use crate::models::api::{ ChatRequest, UsageResponse };
use crate::models::chat::{ extract_text, ChatTurn, Role, UiMessage };
use crate::models::guide::GuideCatalog;
use crate::usage::{ create_usage_store, UsageError, UsageRecord, UsageStore, UsageTotals };

const TITLE_SOURCE_MESSAGES: usize = 6;
const TITLE_SOURCE_CHARS: usize = 500;
const TITLE_MAX_CHARS: usize = 20;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Conversation has no messages")] EmptyConversation,
    #[error("Conversation has no text to title")] NothingToTitle,
    #[error("Model provider error: {0}")] Provider(String),
    #[error(transparent)] Prompt(#[from] PromptError),
    #[error(transparent)] Guide(#[from] GuideError),
    #[error(transparent)] Usage(#[from] UsageError),
}

/// The model id plus the context sent for one chat request, all taken from
/// one prompt config snapshot.
#[derive(Debug, Clone)]
pub struct PreparedChat {
    pub model: String,
    /// Model name written to the usage log.
    pub usage_label: String,
    pub context: PromptContext,
}

fn provider_error(e: Box<dyn Error + Send + Sync>) -> AgentError {
    AgentError::Provider(e.to_string())
}

/// Model reply cleaned into a short tab title.
pub fn clean_title(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '\'' && *c != '"')
        .take(TITLE_MAX_CHARS)
        .collect()
}

/// Text of the opening messages a title is generated from.
pub fn title_source(messages: &[UiMessage]) -> String {
    let joined = messages
        .iter()
        .take(TITLE_SOURCE_MESSAGES)
        .map(extract_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    joined.chars().take(TITLE_SOURCE_CHARS).collect()
}

#[derive(Clone)]
pub struct MentorAgent {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<RwLock<Arc<PromptConfig>>>,
    catalog: Arc<GuideCatalog>,
    usage_store: Arc<dyn UsageStore>,
    prompts_path: PathBuf,
}

impl MentorAgent {
    fn initialize_chat_client(
        args: &Args
    ) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
        let chat_llm_type = parse_llm_type(&args.chat_llm_type)?;
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: chat_llm_type,
            base_url: args.chat_base_url.clone(),
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={:?}, BaseURL={:?}",
            args.chat_llm_type,
            chat_config.completion_model.as_deref().unwrap_or("adapter default"),
            chat_config.base_url.as_deref().unwrap_or("adapter default")
        );
        Ok(chat_client)
    }

    pub async fn new(args: Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_client = Self::initialize_chat_client(&args)?;
        let prompt_config = prompt::load_prompts(&args.prompts_path)?;
        let catalog = guides::load_catalog(&args.guides_path)?;
        info!("Guide catalog loaded: {} guides", catalog.len());
        let usage_store = create_usage_store(&args)?;

        Ok(Self::with_parts(
            chat_client,
            prompt_config,
            catalog,
            usage_store,
            PathBuf::from(&args.prompts_path)
        ))
    }

    pub fn with_parts(
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        catalog: Arc<GuideCatalog>,
        usage_store: Arc<dyn UsageStore>,
        prompts_path: PathBuf
    ) -> Self {
        Self {
            chat_client,
            prompt_config: Arc::new(RwLock::new(prompt_config)),
            catalog,
            usage_store,
            prompts_path,
        }
    }

    pub async fn prompt_config(&self) -> Arc<PromptConfig> {
        Arc::clone(&*self.prompt_config.read().await)
    }

    pub fn catalog(&self) -> &GuideCatalog {
        &self.catalog
    }

    pub async fn prepare_chat(&self, request: &ChatRequest) -> PreparedChat {
        let config = self.prompt_config().await;
        self.prepare_with(&config, request)
    }

    fn prepare_with(&self, config: &PromptConfig, request: &ChatRequest) -> PreparedChat {
        let model = config.resolve_model(request.model.as_deref()).to_string();
        let usage_label = request.model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| config.default_model_alias.clone());
        let context = context::prepare_context(
            config,
            &self.catalog,
            request.track.as_deref(),
            request.messages.clone()
        );
        debug!(
            "Prepared chat: model={}, {} of {} messages kept, system prompt {} chars",
            model,
            context.messages.len(),
            request.messages.len(),
            context.system_prompt.chars().count()
        );
        PreparedChat { model, usage_label, context }
    }

    /// Streams the reply text. The usage record is written once the model
    /// finishes; a client that disconnects early leaves no record.
    pub async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, AgentError> {
        if request.messages.is_empty() {
            return Err(AgentError::EmptyConversation);
        }
        let prepared = self.prepare_chat(&request).await;
        let completion = ChatCompletionRequest::new(
            prepared.context.system_prompt.clone(),
            prepared.context.turns()
        ).with_model(prepared.model.clone());

        let mut upstream = self.chat_client.stream_completion(&completion).await.map_err(|e| {
            error!("Chat stream failed to start: {}", e);
            provider_error(e)
        })?;

        let usage_store = Arc::clone(&self.usage_store);
        let model_label = prepared.usage_label.clone();
        let username = request.username
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let message_count = request.messages.len();

        Ok(
            create_streaming_response(move |tx| async move {
                let mut reply = String::new();
                let mut usage = TokenUsage::default();

                while let Some(item) = upstream.next().await {
                    match item {
                        Ok(ChatChunk::Text(text)) => {
                            reply.push_str(&text);
                            if tx.send(Ok(ChatChunk::Text(text))).await.is_err() {
                                info!("Client disconnected mid-stream; usage not recorded");
                                return;
                            }
                        }
                        Ok(ChatChunk::Usage(u)) => {
                            usage = u;
                        }
                        Err(e) => {
                            error!("Chat stream error: {}", e);
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
                drop(tx);

                let record = UsageRecord::new(
                    model_label,
                    usage,
                    message_count,
                    username,
                    markers::guide_ids(&reply)
                ).with_learning_paths(
                    markers::learning_paths(&reply)
                        .into_iter()
                        .map(|path| path.title)
                        .collect()
                );
                info!(
                    "Chat finished: model={}, prompt={}, completion={}",
                    record.model,
                    record.prompt_tokens,
                    record.completion_tokens
                );
                if let Err(e) = usage_store.record(record).await {
                    warn!("Usage log write failed: {}", e);
                }
            })
        )
    }

    pub async fn generate_title(&self, messages: &[UiMessage]) -> Result<String, AgentError> {
        let source = title_source(messages);
        if source.is_empty() {
            return Err(AgentError::NothingToTitle);
        }
        let config = self.prompt_config().await;
        let request = ChatCompletionRequest::new(
            config.title_system_prompt.clone(),
            vec![ChatTurn { role: Role::User.as_str().to_string(), content: source }]
        ).with_model(config.default_model.clone());

        let response = self.chat_client.complete(&request).await.map_err(provider_error)?;
        Ok(clean_title(&response.response))
    }

    /// Swaps in the prompt file when it changed since the last load.
    pub async fn reload_prompts_if_changed(&self) -> Result<bool, AgentError> {
        let mut guard = self.prompt_config.write().await;
        match prompt::reload_prompts_if_changed(&self.prompts_path, &guard)? {
            Some(new_config) => {
                *guard = new_config;
                info!("Prompts successfully reloaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn usage_report(&self, limit: usize) -> Result<UsageResponse, AgentError> {
        let records = self.usage_store.recent(limit).await?;
        let totals = UsageTotals::from_records(&records);
        Ok(UsageResponse { records, totals })
    }
}
