//! WorkerLoop - 投票の永続化ループ
//!
//! # フロー
//! 1. VoteQueue::dequeue() で QueueEntry を取得（timeout 付き）
//! 2. VoteCodec で VoteRecord に decode
//! 3. VoteStore::upsert() で submitter_id ごとに insert-or-update
//!
//! # 失敗時
//! - decode 失敗: entry は破棄（既にキューから消えている）。backoff なし
//! - upsert 失敗: rollback 済み。entry は破棄し、backoff してから次へ
//! - dequeue の接続エラー: backoff してから cycle をやり直す
//!
//! pop 後に失敗した entry は再投入しません（at-most-once after dequeue）。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::config::TallyConfig;
use super::retry::RetryPolicy;
use super::shutdown::ShutdownListener;
use super::status::WorkerStats;
use crate::domain::{CodecError, VoteCodec, VoteRecord};
use crate::ports::{QueueError, StoreError, VoteQueue, VoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Waiting,
    Dequeued,
    Decoding,
    Writing,
    Committed,
    Dropped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Waiting => "waiting",
            WorkerState::Dequeued => "dequeued",
            WorkerState::Decoding => "decoding",
            WorkerState::Writing => "writing",
            WorkerState::Committed => "committed",
            WorkerState::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

/// Why a dequeued entry was discarded.
#[derive(Debug)]
pub enum DropReason {
    Malformed(CodecError),
    Store(StoreError),
}

/// Result of a single cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// dequeue timed out with nothing to do
    Empty,
    Committed(VoteRecord),
    Dropped(DropReason),
    /// dequeue itself failed; nothing was taken off the queue
    Disconnected(QueueError),
}

pub struct WorkerLoop {
    queue: Arc<dyn VoteQueue>,
    store: Arc<dyn VoteStore>,
    codec: VoteCodec,
    dequeue_timeout: Duration,
    retry: RetryPolicy,
    state: WorkerState,
    consecutive_failures: u32,
    stats: WorkerStats,
}

impl WorkerLoop {
    pub fn new(
        queue: Arc<dyn VoteQueue>,
        store: Arc<dyn VoteStore>,
        dequeue_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            store,
            codec: VoteCodec,
            dequeue_timeout,
            retry,
            state: WorkerState::Waiting,
            consecutive_failures: 0,
            stats: WorkerStats::default(),
        }
    }

    pub fn from_config(
        queue: Arc<dyn VoteQueue>,
        store: Arc<dyn VoteStore>,
        config: &TallyConfig,
    ) -> Self {
        Self::new(queue, store, config.dequeue_timeout, config.retry.clone())
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Runs cycles until `shutdown` fires.
    ///
    /// shutdown は cycle の合間と backoff 中にだけ確認します。
    /// 実行中の dequeue は timeout まで待ちます（途中で捨てると、サーバ側で
    /// pop 済みの entry を失う可能性があるため）。
    pub async fn run(&mut self, mut shutdown: ShutdownListener) -> WorkerStats {
        info!(timeout_ms = self.dequeue_timeout.as_millis() as u64, "worker loop started");

        while !shutdown.is_triggered() {
            let outcome = self.run_once().await;
            if let Some(delay) = self.backoff_after(&outcome) {
                debug!(delay_ms = delay.as_millis() as u64, failures = self.consecutive_failures, "backing off");
                if !shutdown.sleep(delay).await {
                    break;
                }
            }
        }

        info!(
            committed = self.stats.committed,
            dropped = self.stats.dropped(),
            connection_errors = self.stats.connection_errors,
            "worker loop stopped"
        );
        self.stats.clone()
    }

    /// Executes exactly one `Waiting -> ... -> Waiting` cycle. Never sleeps.
    pub async fn run_once(&mut self) -> CycleOutcome {
        self.transition(WorkerState::Waiting);

        let entry = match self.queue.dequeue(self.dequeue_timeout).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.stats.empty_polls += 1;
                self.consecutive_failures = 0;
                return CycleOutcome::Empty;
            }
            Err(e) => {
                error!(error = %e, "error in worker loop: dequeue failed");
                self.stats.connection_errors += 1;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                return CycleOutcome::Disconnected(e);
            }
        };
        self.transition(WorkerState::Dequeued);

        self.transition(WorkerState::Decoding);
        let record = match self.codec.decode(entry.as_bytes()) {
            Ok(record) => record,
            Err(e) => {
                self.transition(WorkerState::Dropped);
                warn!(error = %e, bytes = entry.as_bytes().len(), "dropping malformed vote payload");
                self.stats.dropped_malformed += 1;
                self.transition(WorkerState::Waiting);
                return CycleOutcome::Dropped(DropReason::Malformed(e));
            }
        };

        self.transition(WorkerState::Writing);
        match self.store.upsert(&record.submitter_id, &record.choice).await {
            Ok(()) => {
                self.transition(WorkerState::Committed);
                info!(submitter_id = %record.submitter_id, choice = %record.choice, "processed vote");
                self.stats.committed += 1;
                self.consecutive_failures = 0;
                self.transition(WorkerState::Waiting);
                CycleOutcome::Committed(record)
            }
            Err(e) => {
                self.transition(WorkerState::Dropped);
                error!(
                    submitter_id = %record.submitter_id,
                    error = %e,
                    "error processing vote; entry discarded"
                );
                self.stats.dropped_store += 1;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.transition(WorkerState::Waiting);
                CycleOutcome::Dropped(DropReason::Store(e))
            }
        }
    }

    /// Delay owed after `outcome`, if any.
    pub fn backoff_after(&self, outcome: &CycleOutcome) -> Option<Duration> {
        match outcome {
            CycleOutcome::Disconnected(_) | CycleOutcome::Dropped(DropReason::Store(_)) => {
                Some(self.retry.next_delay(self.consecutive_failures))
            }
            CycleOutcome::Empty
            | CycleOutcome::Committed(_)
            | CycleOutcome::Dropped(DropReason::Malformed(_)) => None,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "worker state");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Shutdown;
    use crate::domain::{Choice, QueueEntry, SubmitterId};
    use crate::impls::{InMemoryVoteQueue, InMemoryVoteStore};

    const TIMEOUT: Duration = Duration::from_millis(50);

    struct Harness {
        queue: InMemoryVoteQueue,
        store: InMemoryVoteStore,
        worker: WorkerLoop,
    }

    fn harness(retry: RetryPolicy) -> Harness {
        let queue = InMemoryVoteQueue::new();
        let store = InMemoryVoteStore::new();
        let worker = WorkerLoop::new(
            Arc::new(queue.clone()),
            Arc::new(store.clone()),
            TIMEOUT,
            retry,
        );
        Harness {
            queue,
            store,
            worker,
        }
    }

    fn vote(id: &str, choice: &str) -> VoteRecord {
        VoteRecord::new(SubmitterId::new(id), Choice::new(choice))
    }

    async fn push(queue: &InMemoryVoteQueue, record: &VoteRecord) {
        queue.enqueue(VoteCodec.encode(record)).await.unwrap();
    }

    #[tokio::test]
    async fn one_cycle_commits_one_row() {
        let mut h = harness(RetryPolicy::immediate());
        push(&h.queue, &vote("u1", "A")).await;

        let outcome = h.worker.run_once().await;

        assert!(matches!(outcome, CycleOutcome::Committed(ref r) if *r == vote("u1", "A")));
        assert_eq!(
            h.store.rows().await,
            vec![(SubmitterId::new("u1"), Choice::new("A"))]
        );
        assert_eq!(h.worker.state(), WorkerState::Waiting);
        assert_eq!(h.worker.backoff_after(&outcome), None);
    }

    #[tokio::test]
    async fn resubmission_overwrites_previous_choice() {
        let mut h = harness(RetryPolicy::immediate());
        push(&h.queue, &vote("u1", "A")).await;
        push(&h.queue, &vote("u1", "B")).await;

        h.worker.run_once().await;
        h.worker.run_once().await;

        assert_eq!(
            h.store.rows().await,
            vec![(SubmitterId::new("u1"), Choice::new("B"))]
        );
        assert_eq!(h.worker.stats().committed, 2);
    }

    #[tokio::test]
    async fn empty_queue_times_out_without_touching_store() {
        let mut h = harness(RetryPolicy::immediate());

        let outcome = h.worker.run_once().await;

        assert!(matches!(outcome, CycleOutcome::Empty));
        assert_eq!(h.worker.backoff_after(&outcome), None);
        assert_eq!(h.worker.state(), WorkerState::Waiting);
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert_eq!(h.store.committed_writes(), 0);
        assert_eq!(h.worker.stats().empty_polls, 1);
    }

    #[tokio::test]
    async fn payload_missing_choice_is_dropped() {
        let mut h = harness(RetryPolicy::immediate());
        push(&h.queue, &vote("u0", "A")).await;
        h.worker.run_once().await;

        h.queue
            .enqueue(QueueEntry::from_bytes(br#"{"voter_id":"u1"}"#.to_vec()))
            .await
            .unwrap();
        let outcome = h.worker.run_once().await;

        assert!(matches!(
            outcome,
            CycleOutcome::Dropped(DropReason::Malformed(_))
        ));
        assert_eq!(h.worker.backoff_after(&outcome), None);
        assert_eq!(
            h.store.rows().await,
            vec![(SubmitterId::new("u0"), Choice::new("A"))]
        );
        // pop 済みなので再配送されない
        assert!(h.queue.is_empty());
        assert_eq!(h.worker.stats().dropped_malformed, 1);
    }

    #[tokio::test]
    async fn store_failure_drops_entry_and_backs_off() {
        let retry = RetryPolicy::fixed(Duration::from_millis(250));
        let mut h = harness(retry);
        push(&h.queue, &vote("u1", "A")).await;
        h.worker.run_once().await;

        h.store.fail_next(1);
        push(&h.queue, &vote("u1", "B")).await;
        push(&h.queue, &vote("u2", "B")).await;

        let failed = h.worker.run_once().await;
        assert!(matches!(failed, CycleOutcome::Dropped(DropReason::Store(_))));
        assert_eq!(h.worker.backoff_after(&failed), Some(Duration::from_millis(250)));
        assert_eq!(h.worker.state(), WorkerState::Waiting);

        let next = h.worker.run_once().await;
        assert!(matches!(next, CycleOutcome::Committed(_)));

        // u1 の B は破棄されたまま。再試行はしない
        assert_eq!(
            h.store.rows().await,
            vec![
                (SubmitterId::new("u1"), Choice::new("A")),
                (SubmitterId::new("u2"), Choice::new("B")),
            ]
        );
        assert_eq!(h.worker.stats().dropped_store, 1);
    }

    #[tokio::test]
    async fn consecutive_failures_grow_exponential_backoff() {
        let retry = RetryPolicy::exponential(Duration::from_millis(100), Duration::from_millis(300));
        let mut h = harness(retry);
        h.queue.set_unavailable(true);

        let mut delays = Vec::new();
        for _ in 0..3 {
            let outcome = h.worker.run_once().await;
            assert!(matches!(outcome, CycleOutcome::Disconnected(_)));
            delays.push(h.worker.backoff_after(&outcome).unwrap());
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
            ]
        );

        h.queue.set_unavailable(false);
        push(&h.queue, &vote("u1", "A")).await;
        assert!(matches!(h.worker.run_once().await, CycleOutcome::Committed(_)));
        assert_eq!(h.worker.stats().connection_errors, 3);
    }

    #[tokio::test]
    async fn run_processes_backlog_until_shutdown() {
        let mut h = harness(RetryPolicy::immediate());
        push(&h.queue, &vote("u1", "A")).await;
        h.queue
            .enqueue(QueueEntry::from_bytes(b"garbage".to_vec()))
            .await
            .unwrap();
        push(&h.queue, &vote("u2", "B")).await;
        push(&h.queue, &vote("u1", "B")).await;

        let (shutdown, listener) = Shutdown::new();
        let store = h.store.clone();
        let queue = h.queue.clone();
        let mut worker = h.worker;
        let task = tokio::spawn(async move { worker.run(listener).await });

        for _ in 0..100 {
            if queue.is_empty() && store.committed_writes() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown.trigger();

        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.committed, 3);
        assert_eq!(stats.dropped_malformed, 1);
        assert_eq!(
            store.rows().await,
            vec![
                (SubmitterId::new("u1"), Choice::new("B")),
                (SubmitterId::new("u2"), Choice::new("B")),
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_interrupts_backoff() {
        let mut h = harness(RetryPolicy::fixed(Duration::from_secs(60)));
        h.queue.set_unavailable(true);

        let (shutdown, listener) = Shutdown::new();
        let task = tokio::spawn(async move { h.worker.run(listener).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();

        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.connection_errors, 1);
    }

    #[tokio::test]
    async fn loop_survives_store_outage() {
        let mut h = harness(RetryPolicy::immediate());
        h.store.set_unavailable(true);
        push(&h.queue, &vote("u1", "A")).await;

        let outcome = h.worker.run_once().await;
        assert!(matches!(outcome, CycleOutcome::Dropped(DropReason::Store(StoreError::Connection(_)))));

        h.store.set_unavailable(false);
        push(&h.queue, &vote("u2", "B")).await;
        assert!(matches!(h.worker.run_once().await, CycleOutcome::Committed(_)));
        assert_eq!(h.store.count().await.unwrap(), 1);
    }
}
