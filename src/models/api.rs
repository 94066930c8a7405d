use serde::{ Deserialize, Serialize };

use crate::models::chat::UiMessage;
use crate::usage::{ UsageRecord, UsageTotals };

#[derive(Deserialize, Debug, Clone)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<UiMessage>,
    pub model: Option<String>,
    pub track: Option<String>,
    pub username: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TitleRequest {
    #[serde(default)]
    pub messages: Vec<UiMessage>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TitleResponse {
    pub title: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct UsageQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize, Debug)]
pub struct UsageResponse {
    pub records: Vec<UsageRecord>,
    pub totals: UsageTotals,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
