use async_trait::async_trait;
use log::error;
use redis::{ AsyncCommands, Client };

use super::{ UsageError, UsageRecord, UsageStore };

const RECORDS_KEY: &str = "records";

/// Stop index for `LRANGE`/`LTRIM` covering the first `count` entries.
fn last_index(count: usize) -> isize {
    (count.min(isize::MAX as usize) as isize) - 1
}

/// Usage log kept in one Redis list, newest at the head, trimmed to
/// `max_records` on every write.
pub struct RedisUsageStore {
    client: Client,
    key: String,
    max_records: usize,
}

impl RedisUsageStore {
    pub fn new(url: &str, key_prefix: &str, max_records: usize) -> Result<Self, UsageError> {
        Ok(Self {
            client: Client::open(url)?,
            key: format!("{}{}", key_prefix, RECORDS_KEY),
            max_records: max_records.max(1),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageError> {
        let mut conn = self.get_connection().await?;
        let json_record = serde_json::to_string(&record)?;
        let _: i64 = conn.lpush(&self.key, &json_record).await?;
        let _: () = conn.ltrim(&self.key, 0, last_index(self.max_records)).await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>, UsageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn.lrange(&self.key, 0, last_index(limit)).await?;
        let mut records = Vec::with_capacity(json_entries.len());

        for json_entry in &json_entries {
            match serde_json::from_str::<UsageRecord>(json_entry) {
                Ok(record) => records.push(record),
                Err(e) => error!("Error parsing usage entry: {}", e),
            }
        }

        Ok(records)
    }
}
