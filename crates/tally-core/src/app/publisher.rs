//! VotePublisher - producer 側の入口
//!
//! フロントエンドが投票を受け取ったときに呼ぶ薄い層です。
//! 選択肢を検証し、SubmitterId がなければ発行してからキューに積みます。
//! 永続化されたかどうかは producer には返りません（キューに積めたことだけ）。

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::domain::{Choice, ChoiceSet, SubmitterId, VoteCodec, VoteRecord};
use crate::ports::{QueueError, VoteQueue};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("unknown choice: {0}")]
    UnknownChoice(Choice),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct VotePublisher {
    queue: Arc<dyn VoteQueue>,
    codec: VoteCodec,
    choices: ChoiceSet,
}

impl VotePublisher {
    pub fn new(queue: Arc<dyn VoteQueue>, choices: ChoiceSet) -> Self {
        Self {
            queue,
            codec: VoteCodec,
            choices,
        }
    }

    pub fn choices(&self) -> &ChoiceSet {
        &self.choices
    }

    /// 投票をキューに積み、使った SubmitterId を返す
    ///
    /// `submitter_id` が `None`（初回の投票者）なら新しく発行します。
    pub async fn submit(
        &self,
        submitter_id: Option<SubmitterId>,
        choice: Choice,
    ) -> Result<SubmitterId, PublishError> {
        if !self.choices.contains(&choice) {
            return Err(PublishError::UnknownChoice(choice));
        }
        let submitter_id = submitter_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(SubmitterId::generate);

        let record = VoteRecord::new(submitter_id.clone(), choice);
        self.queue.enqueue(self.codec.encode(&record)).await?;
        debug!(submitter_id = %submitter_id, choice = %record.choice, "vote enqueued");

        Ok(submitter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryVoteQueue;
    use std::time::Duration;

    fn publisher() -> (InMemoryVoteQueue, VotePublisher) {
        let queue = InMemoryVoteQueue::new();
        let publisher = VotePublisher::new(Arc::new(queue.clone()), ChoiceSet::default());
        (queue, publisher)
    }

    #[tokio::test]
    async fn submit_enqueues_encoded_record() {
        let (queue, publisher) = publisher();

        let id = publisher
            .submit(Some(SubmitterId::new("u1")), Choice::new("Cats"))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "u1");

        let entry = queue.dequeue(Duration::from_millis(100)).await.unwrap().unwrap();
        let record = VoteCodec.decode(entry.as_bytes()).unwrap();
        assert_eq!(record, VoteRecord::new(SubmitterId::new("u1"), Choice::new("Cats")));
    }

    #[tokio::test]
    async fn first_time_voter_gets_an_id() {
        let (queue, publisher) = publisher();

        let id = publisher.submit(None, Choice::new("Dogs")).await.unwrap();

        assert!(!id.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn unknown_choice_is_rejected_before_enqueue() {
        let (queue, publisher) = publisher();

        let err = publisher
            .submit(Some(SubmitterId::new("u1")), Choice::new("Birds"))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::UnknownChoice(c) if c.as_str() == "Birds"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn unreachable_queue_surfaces_connection_error() {
        let (queue, publisher) = publisher();
        queue.set_unavailable(true);

        let err = publisher.submit(None, Choice::new("Cats")).await.unwrap_err();
        assert!(matches!(err, PublishError::Queue(QueueError::Connection(_))));
    }
}
