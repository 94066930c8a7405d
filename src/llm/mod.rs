pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Ollama,
    OpenAI,
}

#[derive(Debug, PartialEq, Eq, Error)]
#[error("Invalid LLM type: '{0}'")]
pub struct ParseLlmTypeError(String);

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(LlmType::Ollama),
            // the hosted gateway speaks the OpenAI wire format
            "openai" | "gateway" => Ok(LlmType::OpenAI),
            _ => Err(ParseLlmTypeError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::OpenAI,
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

pub fn parse_llm_type(type_str: &str) -> Result<LlmType, String> {
    type_str.parse().map_err(|e: ParseLlmTypeError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        assert_eq!(parse_llm_type("OpenAI"), Ok(LlmType::OpenAI));
        assert_eq!(parse_llm_type("gateway"), Ok(LlmType::OpenAI));
        assert_eq!(parse_llm_type("ollama"), Ok(LlmType::Ollama));
        assert_eq!(parse_llm_type("gemini"), Err("Invalid LLM type: 'gemini'".to_string()));
    }
}
