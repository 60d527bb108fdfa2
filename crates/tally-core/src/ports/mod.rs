//! Ports - 抽象化レイヤー
//!
//! 外部システム（Redis, PostgreSQL）へのインターフェースを trait として定義し、
//! 実装の詳細を隠蔽します。worker はこの trait だけに依存します。
//!
//! # 設計原則
//! - PostgreSQL が source of truth（正本）
//! - Redis は配送キュー（pop した時点で consumer のもの）

pub mod vote_queue;
pub mod vote_store;

pub use self::vote_queue::{QueueError, VoteQueue};
pub use self::vote_store::{StoreError, VoteStore};
