mod redis;

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use serde::{ Deserialize, Serialize };
use std::collections::VecDeque;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cli::Args;
use crate::llm::chat::TokenUsage;

pub use self::redis::RedisUsageStore;

pub const DEFAULT_USAGE_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Usage store backend error: {0}")] Backend(#[from] ::redis::RedisError),
    #[error("Usage record serialization error: {0}")] Json(#[from] serde_json::Error),
    #[error("Unsupported usage store type: {0}")] UnsupportedStore(String),
}

/// One finished chat request, as shown on the admin dashboard.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub message_count: usize,
    pub username: String,
    #[serde(default)]
    pub recommended_guides: Vec<String>,
    /// Titles of the learning paths proposed in the reply.
    #[serde(default)]
    pub learning_paths: Vec<String>,
}

impl UsageRecord {
    pub fn new(
        model: impl Into<String>,
        usage: TokenUsage,
        message_count: usize,
        username: impl Into<String>,
        recommended_guides: Vec<String>
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            model: model.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total(),
            message_count,
            username: username.into(),
            recommended_guides,
            learning_paths: Vec::new(),
        }
    }

    pub fn with_learning_paths(mut self, titles: Vec<String>) -> Self {
        self.learning_paths = titles;
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub requests: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageTotals {
    pub fn from_records(records: &[UsageRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, r| {
            acc.requests += 1;
            acc.prompt_tokens += r.prompt_tokens;
            acc.completion_tokens += r.completion_tokens;
            acc.total_tokens += r.total_tokens;
            acc
        })
    }
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageError>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>, UsageError>;
}

/// Bounded in-process log; the oldest record is dropped once full.
pub struct MemoryUsageStore {
    records: Mutex<VecDeque<UsageRecord>>,
    capacity: usize,
}

impl MemoryUsageStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))), capacity }
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageError> {
        let mut records = self.records.lock().await;
        records.push_front(record);
        records.truncate(self.capacity);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>, UsageError> {
        let records = self.records.lock().await;
        Ok(records.iter().take(limit).cloned().collect())
    }
}

pub fn create_usage_store(
    args: &Args
) -> Result<Arc<dyn UsageStore>, Box<dyn Error + Send + Sync>> {
    match args.usage_store_type.to_lowercase().as_str() {
        "redis" => {
            info!("Usage records will be stored in redis at {}", args.usage_redis_url);
            let store = RedisUsageStore::new(
                &args.usage_redis_url,
                &args.usage_redis_prefix,
                args.usage_max_records
            )?;
            Ok(Arc::new(store))
        }
        "memory" => {
            info!("Usage records will be kept in memory (capacity {})", args.usage_max_records);
            Ok(Arc::new(MemoryUsageStore::new(args.usage_max_records)))
        }
        other => Err(Box::new(UsageError::UnsupportedStore(other.to_string()))),
    }
}
