//! VoteStore port - 投票の正本（PostgreSQL または InMemory）
//!
//! 1 submitter につき 1 行。`upsert` は同一トランザクション内で
//! insert-or-update を行います。

use crate::domain::{Choice, SubmitterId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Connection(String),

    #[error("store write failed: {0}")]
    Write(String),
}

/// VoteStore は submitter_id を key にした冪等な書き込み先
///
/// # 不変条件
/// - submitter_id ごとに高々 1 行
/// - 行の choice は最後に commit に成功した書き込みの値
/// - 失敗した書き込みは rollback され、部分的な状態は残らない
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// テーブルがなければ作成する。毎回の起動で呼んでよい。
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// 同じ引数で何度呼んでも 1 回呼んだのと同じ結果になる。
    async fn upsert(&self, submitter_id: &SubmitterId, choice: &Choice) -> Result<(), StoreError>;

    async fn fetch(&self, submitter_id: &SubmitterId) -> Result<Option<Choice>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// choice ごとの票数。choice の昇順で、0 票の choice は含まない。
    async fn tally(&self) -> Result<Vec<(Choice, u64)>, StoreError>;

    /// 起動時の疎通確認
    async fn ping(&self) -> Result<(), StoreError>;
}
