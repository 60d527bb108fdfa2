//! Vote domain types.
//!
//! `VoteRecord` は producer が作成し、以後は不変です。
//! キュー上の表現（QueueEntry）との変換は `codec` が担当します。

use serde::{Deserialize, Serialize};
use std::fmt;

/// SubmitterId は投票者の識別子（idempotency key）
///
/// 同じ SubmitterId からの再投票は行を上書きします（重複しない）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmitterId(String);

impl SubmitterId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// ランダムな 64-bit 値を hex 文字列にした SubmitterId を生成
    pub fn generate() -> Self {
        Self(format!("{:x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Choice は選択肢の名前
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Choice(String);

impl Choice {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single vote submission.
///
/// Field names on the wire are `voter_id` / `vote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    #[serde(rename = "voter_id")]
    pub submitter_id: SubmitterId,
    #[serde(rename = "vote")]
    pub choice: Choice,
}

impl VoteRecord {
    pub fn new(submitter_id: SubmitterId, choice: Choice) -> Self {
        Self {
            submitter_id,
            choice,
        }
    }
}

/// ChoiceSet は受け付ける選択肢の集合（producer 側の検証用）
///
/// worker はこの集合で検証しません。producer と consumer のデプロイ間で
/// 選択肢が変わっても、届いた投票はそのまま保存されます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceSet {
    options: Vec<Choice>,
}

impl ChoiceSet {
    pub const DEFAULT_OPTION_A: &'static str = "Cats";
    pub const DEFAULT_OPTION_B: &'static str = "Dogs";

    pub fn new(options: Vec<Choice>) -> Self {
        Self { options }
    }

    pub fn contains(&self, choice: &Choice) -> bool {
        self.options.contains(choice)
    }

    pub fn options(&self) -> &[Choice] {
        &self.options
    }
}

impl Default for ChoiceSet {
    fn default() -> Self {
        Self::new(vec![
            Choice::new(Self::DEFAULT_OPTION_A),
            Choice::new(Self::DEFAULT_OPTION_B),
        ])
    }
}
