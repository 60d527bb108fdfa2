//! VoteCodec - VoteRecord とキュー上の表現（QueueEntry）の相互変換
//!
//! wire format は JSON object: `{"voter_id": "...", "vote": "..."}`。
//! 未知のフィールドは無視します。

use super::vote::VoteRecord;
use thiserror::Error;

/// QueueEntry はキューに積まれる bytes
///
/// append でキューに所有権が移り、dequeue で consumer に移ります。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry(Vec<u8>);

impl QueueEntry {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed vote payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("vote payload is not a JSON object")]
    NotAnObject,

    #[error("vote payload has an empty voter_id")]
    EmptySubmitter,
}

/// VoteCodec は stateless（decode は副作用なし）
#[derive(Debug, Clone, Copy, Default)]
pub struct VoteCodec;

impl VoteCodec {
    /// Total for any `VoteRecord`.
    pub fn encode(&self, record: &VoteRecord) -> QueueEntry {
        // VoteRecord は String 2 つだけなので serialize は失敗しない
        let bytes = serde_json::to_vec(record).unwrap_or_default();
        QueueEntry(bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<VoteRecord, CodecError> {
        // serde の derive は配列も struct として受け付けるので、object だけを通す
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(CodecError::NotAnObject);
        }
        let record: VoteRecord = serde_json::from_value(value)?;
        if record.submitter_id.is_empty() {
            return Err(CodecError::EmptySubmitter);
        }
        Ok(record)
    }
}
