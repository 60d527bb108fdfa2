//! VoteQueue port - 配送キュー（Redis または InMemory）
//!
//! 名前付きの list 1 本に QueueEntry を流します。

use crate::domain::QueueEntry;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unreachable: {0}")]
    Connection(String),
}

/// VoteQueue は共有 FIFO
///
/// # 設計原則
/// - `dequeue` は head から pop した時点でキューから消える（peek/ack の分離なし）
/// - pop の排他性はキューサービス側が保証する（複数 worker で競合しない）
/// - blocking pop（timeout 付き）。timeout はエラーではなく `None`
#[async_trait]
pub trait VoteQueue: Send + Sync {
    /// tail に追加する。consumer を待たない。
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError>;

    /// head から pop する。`timeout` 以内に届かなければ `Ok(None)`。
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError>;

    /// 起動時の疎通確認
    async fn ping(&self) -> Result<(), QueueError>;
}
