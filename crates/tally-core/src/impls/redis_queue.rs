//! RedisVoteQueue - 本番用の配送キュー
//!
//! list 1 本を FIFO として使います。
//! - enqueue: `RPUSH <list> <entry>`
//! - dequeue: `BLPOP <list> <timeout>`（`(key, value)` か nil）

use crate::domain::QueueEntry;
use crate::ports::{QueueError, VoteQueue};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;

/// BLPOP の timeout 0 は「無期限」なので、それより短くはしない
const MIN_BLOCK_SECS: f64 = 0.01;

/// blocking pop がクライアント側の response timeout で切られないための余裕
const RESPONSE_TIMEOUT_SLACK: Duration = Duration::from_secs(2);

pub struct RedisVoteQueue {
    conn: ConnectionManager,
    list: String,
}

impl RedisVoteQueue {
    /// `url` に接続する。`max_block` は dequeue に渡す最大の timeout。
    pub async fn connect(url: &str, list: &str, max_block: Duration) -> Result<Self, QueueError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_secs(2))
            .set_response_timeout(max_block + RESPONSE_TIMEOUT_SLACK);

        let client = Client::open(url).map_err(connection_error)?;
        let conn = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(connection_error)?;

        Ok(Self {
            conn,
            list: list.to_string(),
        })
    }

    pub fn list(&self) -> &str {
        &self.list
    }
}

fn connection_error(e: RedisError) -> QueueError {
    QueueError::Connection(e.to_string())
}

#[async_trait]
impl VoteQueue for RedisVoteQueue {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .rpush(&self.list, entry.into_bytes())
            .await
            .map_err(connection_error)?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, Vec<u8>)> = conn
            .blpop(&self.list, timeout.as_secs_f64().max(MIN_BLOCK_SECS))
            .await
            .map_err(connection_error)?;

        Ok(popped.map(|(_key, value)| QueueEntry::from_bytes(value)))
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(connection_error)?;
        Ok(())
    }
}
