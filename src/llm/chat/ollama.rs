use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use std::error::Error as StdError;
use super::{
    http_stream_generate,
    ChatChunk,
    ChatClient,
    ChatCompletionRequest,
    ChunkStream,
    CompletionResponse,
    TokenUsage,
};
use crate::llm::LlmConfig;
use crate::models::chat::ChatTurn;
use log::debug;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatTurn>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl OllamaChatResponse {
    fn usage(&self) -> Option<TokenUsage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        Some(TokenUsage {
            prompt_tokens: self.prompt_eval_count.unwrap_or(0),
            completion_tokens: self.eval_count.unwrap_or(0),
        })
    }
}

/// Parses one NDJSON line of a streamed `/api/chat` reply.
pub(crate) fn parse_ndjson_line(line: &str) -> Option<ChatChunk> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<OllamaChatResponse>(line) {
        Ok(resp) => {
            if resp.done {
                return resp.usage().map(ChatChunk::Usage);
            }
            resp.message
                .map(|m| m.content)
                .filter(|c| !c.is_empty())
                .map(ChatChunk::Text)
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            None
        }
    }
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| "llama3.1".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != crate::llm::LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }

    fn build_request(&self, request: &ChatCompletionRequest, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: request.model.clone().unwrap_or_else(|| self.completion_model.clone()),
            messages: request.wire_messages(),
            stream,
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(
        &self,
        request: &ChatCompletionRequest
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/api/chat", self.base_url);
        let req = self.build_request(request, false);
        let resp = self.http
            .post(&url)
            .json(&req)
            .send().await?
            .error_for_status()?
            .json::<OllamaChatResponse>().await?;
        let usage = resp.usage();
        Ok(CompletionResponse {
            response: resp.message.map(|m| m.content).unwrap_or_default(),
            usage,
        })
    }

    async fn stream_completion(
        &self,
        request: &ChatCompletionRequest
    ) -> Result<ChunkStream, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/api/chat", self.base_url);
        let req = self.build_request(request, true);
        Ok(http_stream_generate(self.http.clone(), url, req, parse_ndjson_line, None))
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }
}
