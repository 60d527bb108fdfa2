//! PostgresVoteStore - 本番用の正本
//!
//! テーブル `votes(id, vote)`。`id` が idempotency key です。

use crate::domain::{Choice, SubmitterId};
use crate::ports::{StoreError, VoteStore};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS votes (
    id VARCHAR(255) PRIMARY KEY,
    vote VARCHAR(255) NOT NULL
)";

/// 複数 worker の同時起動で CREATE TABLE が衝突しないよう、DDL はこの lock の下で流す
const SCHEMA_LOCK_KEY: i64 = 0x7461_6c6c_7901;

const TALLY_VOTES: &str = "SELECT vote, COUNT(id) FROM votes GROUP BY vote ORDER BY vote";

const UPSERT_VOTE: &str =
    "INSERT INTO votes (id, vote) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET vote = $2";

pub struct PostgresVoteStore {
    pool: PgPool,
}

impl PostgresVoteStore {
    /// 単一 worker なので接続は 1 本で足りる
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn write_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Connection(e.to_string())
        }
        other => StoreError::Write(other.to_string()),
    }
}

#[async_trait]
impl VoteStore for PostgresVoteStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(write_error)?;

        // xact lock は commit / rollback で自動解放される
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        sqlx::query(CREATE_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        tx.commit().await.map_err(write_error)?;
        Ok(())
    }

    async fn upsert(&self, submitter_id: &SubmitterId, choice: &Choice) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(write_error)?;

        // commit 前に ? で抜けた場合、tx の drop で rollback される
        sqlx::query(UPSERT_VOTE)
            .bind(submitter_id.as_str())
            .bind(choice.as_str())
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        tx.commit().await.map_err(write_error)?;
        Ok(())
    }

    async fn fetch(&self, submitter_id: &SubmitterId) -> Result<Option<Choice>, StoreError> {
        let vote = sqlx::query_scalar::<_, String>("SELECT vote FROM votes WHERE id = $1")
            .bind(submitter_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(vote.map(Choice::new))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM votes")
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(count.max(0) as u64)
    }

    async fn tally(&self) -> Result<Vec<(Choice, u64)>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(TALLY_VOTES)
            .fetch_all(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(rows
            .into_iter()
            .map(|(vote, n)| (Choice::new(vote), n.max(0) as u64))
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}
