pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ stream, Future, Stream, StreamExt };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatTurn;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type ChunkStream = Pin<
    Box<dyn Stream<Item = Result<ChatChunk, Box<dyn StdError + Send + Sync>>> + Send>
>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    Text(String),
    Usage(TokenUsage),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatCompletionRequest {
    /// Overrides the client's configured model when set.
    pub model: Option<String>,
    pub system: Option<String>,
    pub messages: Vec<ChatTurn>,
}

impl ChatCompletionRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self { model: None, system: Some(system.into()), messages }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Messages with the system instructions, if any, as the first turn.
    pub fn wire_messages(&self) -> Vec<ChatTurn> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = self.system.as_ref().filter(|s| !s.is_empty()) {
            out.push(ChatTurn { role: "system".to_string(), content: system.clone() });
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        request: &ChatCompletionRequest
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    /// Clients without native streaming deliver the whole reply as one chunk.
    async fn stream_completion(
        &self,
        request: &ChatCompletionRequest
    ) -> Result<ChunkStream, Box<dyn StdError + Send + Sync>> {
        let response = self.complete(request).await?;
        Ok(full_response_as_stream(response))
    }

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
    fn supports_native_streaming(&self) -> bool {
        false
    }
}

pub fn full_response_as_stream(response: CompletionResponse) -> ChunkStream {
    let mut chunks = vec![Ok(ChatChunk::Text(response.response))];
    if let Some(usage) = response.usage {
        chunks.push(Ok(ChatChunk::Usage(usage)));
    }
    Box::pin(stream::iter(chunks))
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> ChunkStream
    where
        F: FnOnce(mpsc::Sender<Result<ChatChunk, Box<dyn StdError + Send + Sync>>>) -> Fut +
            Send +
            'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// POSTs `payload` and feeds every complete line of the response body
/// through `line_parser`. Lines split across network chunks are joined
/// before parsing.
pub fn http_stream_generate(
    client: reqwest::Client,
    url: String,
    payload: impl Serialize + Send + 'static,
    line_parser: fn(&str) -> Option<ChatChunk>,
    headers: Option<Vec<(String, String)>>
) -> ChunkStream {
    create_streaming_response(move |tx| async move {
        let mut req = client.post(&url).json(&payload);

        if let Some(header_list) = headers {
            for (name, value) in header_list {
                req = req.header(name, value);
            }
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };
        if let Err(e) = resp.error_for_status_ref() {
            let _ = tx.send(Err(Box::new(e) as _)).await;
            return;
        }

        let mut bytes = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    pending.extend_from_slice(&buf);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line);
                        if let Some(tok) = line_parser(line.trim_end()) {
                            if tx.send(Ok(tok)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
            }
        }
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending);
            if let Some(tok) = line_parser(line.trim_end()) {
                let _ = tx.send(Ok(tok)).await;
            }
        }
    })
}
