//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **TallyConfig**: 起動時に 1 回だけ作る設定
//! - **WorkerLoop**: dequeue → decode → upsert のループ
//! - **VotePublisher**: producer 側の入口（検証してキューに積む）
//! - **startup**: 依存サービスの待機とスキーマ作成
//! - **RetryPolicy** / **Shutdown**: backoff と協調的な停止

pub mod config;
pub mod publisher;
pub mod retry;
pub mod shutdown;
pub mod startup;
pub mod status;
pub mod worker_loop;

pub use self::config::{ConfigError, TallyConfig};
pub use self::publisher::{PublishError, VotePublisher};
pub use self::retry::RetryPolicy;
pub use self::shutdown::{Shutdown, ShutdownListener};
pub use self::startup::StartupError;
pub use self::status::WorkerStats;
pub use self::worker_loop::{CycleOutcome, DropReason, WorkerLoop, WorkerState};
