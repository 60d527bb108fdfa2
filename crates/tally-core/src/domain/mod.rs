//! Domain model (vote records, wire codec).

pub mod codec;
pub mod vote;

pub use self::codec::{CodecError, QueueEntry, VoteCodec};
pub use self::vote::{Choice, ChoiceSet, SubmitterId, VoteRecord};
