//! InMemoryVoteQueue - 開発用・テスト用の配送キュー
//!
//! # 実装詳細
//! - Mutex + Condvar による blocking pop
//! - async context からは spawn_blocking で呼ぶ
//! - `set_unavailable(true)` でキューサービスの停止を再現できる

use crate::domain::QueueEntry;
use crate::ports::{QueueError, VoteQueue};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// InMemoryVoteQueue はプロセス内の FIFO
///
/// `Clone` は同じキューを共有する（producer と worker で同じものを使える）。
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryVoteQueue::new();
/// queue.enqueue(entry).await?;
/// let entry = queue.dequeue(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryVoteQueue {
    entries: Arc<Mutex<VecDeque<QueueEntry>>>,
    /// enqueue 時の通知用
    condvar: Arc<Condvar>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryVoteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// true の間、すべての操作が `QueueError::Connection` を返す
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Connection("in-memory queue marked unavailable".into()));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> QueueError {
    QueueError::Connection("in-memory queue lock poisoned".into())
}

#[async_trait]
impl VoteQueue for InMemoryVoteQueue {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        self.check_available()?;
        let entries = self.entries.clone();
        let condvar = self.condvar.clone();

        tokio::task::spawn_blocking(move || -> Result<(), QueueError> {
            let mut entries = entries.lock().map_err(poisoned)?;
            entries.push_back(entry);
            condvar.notify_one();
            Ok(())
        })
        .await
        .map_err(|e| QueueError::Connection(format!("enqueue task failed: {e}")))?
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        self.check_available()?;
        let entries = self.entries.clone();
        let condvar = self.condvar.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<QueueEntry>, QueueError> {
            let start = Instant::now();
            let mut guard = entries.lock().map_err(poisoned)?;
            loop {
                if let Some(entry) = guard.pop_front() {
                    return Ok(Some(entry));
                }
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Ok(None);
                }
                let (next, _) = condvar
                    .wait_timeout(guard, timeout - elapsed)
                    .map_err(poisoned)?;
                guard = next;
            }
        })
        .await
        .map_err(|e| QueueError::Connection(format!("dequeue task failed: {e}")))?
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check_available()
    }
}
