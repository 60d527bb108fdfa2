//! tally-core
//!
//! 投票をキューから取り出し、submitter ごとに 1 行の正本へ書き込むための部品。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（VoteRecord, SubmitterId, Choice, VoteCodec）
//! - **ports**: 抽象化レイヤー（VoteQueue, VoteStore）
//! - **impls**: 実装（Redis, PostgreSQL, InMemory）
//! - **app**: アプリケーションロジック（config, worker_loop, publisher, startup）
//! - **error**: 上位向けのまとめたエラー型

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use error::TallyError;
