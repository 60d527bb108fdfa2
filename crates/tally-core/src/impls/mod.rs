//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **RedisVoteQueue**: 本番用の配送キュー（RPUSH / BLPOP）
//! - **PostgresVoteStore**: 本番用の正本（INSERT ... ON CONFLICT）
//! - **InMemoryVoteQueue** / **InMemoryVoteStore**: 開発用・テスト用（障害注入つき）

pub mod inmem_queue;
pub mod inmem_store;
pub mod pg_store;
pub mod redis_queue;

pub use self::inmem_queue::InMemoryVoteQueue;
pub use self::inmem_store::InMemoryVoteStore;
pub use self::pg_store::PostgresVoteStore;
pub use self::redis_queue::RedisVoteQueue;
