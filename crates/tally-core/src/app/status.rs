//! WorkerStats - worker の観測用カウンタ

/// run() 終了時に返され、ログにも出る
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub committed: u64,
    pub dropped_malformed: u64,
    pub dropped_store: u64,
    pub empty_polls: u64,
    pub connection_errors: u64,
}

impl WorkerStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_malformed + self.dropped_store
    }

    /// 1 件でもキューから取り出した回数
    pub fn dequeued(&self) -> u64 {
        self.committed + self.dropped()
    }
}
