//! Startup - 依存サービスの待機、接続、スキーマ作成
//!
//! ここでの失敗は fatal です（プロセスは終了し、外側のオーケストレーションが再起動する）。

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::config::TallyConfig;
use super::shutdown::ShutdownListener;
use super::worker_loop::WorkerLoop;
use crate::impls::{PostgresVoteStore, RedisVoteQueue};
use crate::ports::{QueueError, StoreError, VoteQueue, VoteStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("queue not ready: {0}")]
    Queue(#[from] QueueError),

    #[error("store not ready: {0}")]
    Store(#[from] StoreError),

    #[error("shutdown requested during startup")]
    Cancelled,
}

/// `check` が成功するまで最大 `attempts` 回試す。試行の間は `delay` 待つ。
pub async fn wait_for<T, E, F, Fut>(
    service: &str,
    attempts: u32,
    delay: Duration,
    shutdown: &mut ShutdownListener,
    mut check: F,
) -> Result<T, StartupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<StartupError> + Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match check().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(service, attempt, attempts, error = %e, "service not reachable yet");
            }
            Err(e) => return Err(e.into()),
        }
        if !shutdown.sleep(delay).await {
            return Err(StartupError::Cancelled);
        }
        attempt += 1;
    }
}

/// 疎通確認とスキーマ作成。何度呼んでもよい。
pub async fn prepare(queue: &dyn VoteQueue, store: &dyn VoteStore) -> Result<(), StartupError> {
    queue.ping().await?;
    store.ping().await?;
    store.ensure_schema().await?;
    Ok(())
}

/// Redis と PostgreSQL に接続し、ループを組み立てる。
pub async fn start(
    config: &TallyConfig,
    shutdown: &mut ShutdownListener,
) -> Result<WorkerLoop, StartupError> {
    info!(
        redis_host = %config.redis_host,
        postgres_host = %config.postgres_host,
        queue = %config.queue_name,
        "worker starting"
    );

    let redis_url = config.redis_url();
    let (redis_url, list) = (redis_url.as_str(), config.queue_name.as_str());
    let queue = wait_for("redis", config.startup_attempts, config.startup_delay, shutdown, move || {
        RedisVoteQueue::connect(redis_url, list, config.dequeue_timeout)
    })
    .await?;

    let database_url = config.database_url();
    let database_url = database_url.as_str();
    let store = wait_for("postgres", config.startup_attempts, config.startup_delay, shutdown, move || {
        PostgresVoteStore::connect(database_url)
    })
    .await?;

    let queue: Arc<dyn VoteQueue> = Arc::new(queue);
    let store: Arc<dyn VoteStore> = Arc::new(store);
    prepare(queue.as_ref(), store.as_ref()).await?;

    info!("worker ready, processing votes");
    Ok(WorkerLoop::from_config(queue, store, config))
}
