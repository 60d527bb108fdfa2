//! InMemoryVoteStore - テスト用の正本
//!
//! PostgreSQL の代わりに HashMap を使います。障害注入
//! （`fail_next`, `set_unavailable`）で store 停止を再現できます。

use crate::domain::{Choice, SubmitterId};
use crate::ports::{StoreError, VoteStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct InMemoryVoteStore {
    rows: Arc<Mutex<HashMap<SubmitterId, Choice>>>,
    schema_ready: Arc<AtomicBool>,
    /// 残り何回の upsert を失敗させるか
    failures_left: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
    writes: Arc<AtomicU32>,
}

impl InMemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の `n` 回の upsert を `StoreError::Write` で失敗させる
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::SeqCst)
    }

    /// commit に成功した upsert の回数
    pub fn committed_writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn rows(&self) -> Vec<(SubmitterId, Choice)> {
        let rows = self.rows.lock().await;
        let mut out: Vec<_> = rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        out.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        out
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("in-memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl VoteStore for InMemoryVoteStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.check_available()?;
        self.schema_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, submitter_id: &SubmitterId, choice: &Choice) -> Result<(), StoreError> {
        self.check_available()?;
        if self.take_injected_failure() {
            // 書き込み前に失敗するので rollback 相当（行は変わらない）
            return Err(StoreError::Write("injected write failure".into()));
        }
        let mut rows = self.rows.lock().await;
        rows.insert(submitter_id.clone(), choice.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(&self, submitter_id: &SubmitterId) -> Result<Option<Choice>, StoreError> {
        self.check_available()?;
        Ok(self.rows.lock().await.get(submitter_id).cloned())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.rows.lock().await.len() as u64)
    }

    async fn tally(&self) -> Result<Vec<(Choice, u64)>, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock().await;
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for choice in rows.values() {
            *counts.entry(choice.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(choice, n)| (Choice::new(choice), n))
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SubmitterId {
        SubmitterId::new(s)
    }

    #[tokio::test]
    async fn second_upsert_overwrites_first() {
        let store = InMemoryVoteStore::new();
        store.upsert(&id("u1"), &Choice::new("A")).await.unwrap();
        store.upsert(&id("u1"), &Choice::new("B")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.fetch(&id("u1")).await.unwrap(), Some(Choice::new("B")));
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent() {
        let store = InMemoryVoteStore::new();
        for _ in 0..3 {
            store.upsert(&id("u1"), &Choice::new("A")).await.unwrap();
        }
        assert_eq!(store.rows().await, vec![(id("u1"), Choice::new("A"))]);
    }

    #[tokio::test]
    async fn injected_failure_leaves_rows_untouched() {
        let store = InMemoryVoteStore::new();
        store.upsert(&id("u1"), &Choice::new("A")).await.unwrap();
        store.fail_next(1);

        let err = store.upsert(&id("u1"), &Choice::new("B")).await.unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
        assert_eq!(store.fetch(&id("u1")).await.unwrap(), Some(Choice::new("A")));

        store.upsert(&id("u1"), &Choice::new("B")).await.unwrap();
        assert_eq!(store.fetch(&id("u1")).await.unwrap(), Some(Choice::new("B")));
    }

    #[tokio::test]
    async fn ensure_schema_can_run_twice() {
        let store = InMemoryVoteStore::new();
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
        assert!(store.schema_ready());
    }

    #[tokio::test]
    async fn tally_counts_one_vote_per_submitter() {
        let store = InMemoryVoteStore::new();
        store.upsert(&id("u1"), &Choice::new("c1")).await.unwrap();
        store.upsert(&id("u2"), &Choice::new("c1")).await.unwrap();
        store.upsert(&id("u3"), &Choice::new("c2")).await.unwrap();

        assert_eq!(
            store.tally().await.unwrap(),
            vec![(Choice::new("c1"), 2), (Choice::new("c2"), 1)]
        );

        // 再投票は c1 から c2 へ 1 票移すだけ
        store.upsert(&id("u1"), &Choice::new("c2")).await.unwrap();

        assert_eq!(
            store.tally().await.unwrap(),
            vec![(Choice::new("c1"), 1), (Choice::new("c2"), 2)]
        );
    }

    #[tokio::test]
    async fn tally_is_empty_without_votes() {
        let store = InMemoryVoteStore::new();
        assert!(store.tally().await.unwrap().is_empty());

        store.set_unavailable(true);
        assert!(matches!(store.tally().await, Err(StoreError::Connection(_))));
    }
}
