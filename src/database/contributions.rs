//! Contribution Ledger - PostgreSQL operations using sqlx
//!
//! One row per user in `forum.user_contributions`. Row-level locking
//! (`FOR UPDATE` and the single-statement clamped increment) serializes
//! concurrent awards for the same user.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info};

use crate::contribution::{
    ActivityTotals, ContributionState, LeaderboardEntry, LedgerStore, LedgerTx, StreakState, Tier,
};
use crate::error::{ContributionError, Result};

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> std::result::Result<(), String> {
        info!("Initializing contribution schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS forum")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create forum schema: {}", e))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS forum.user_contributions (
                user_id BIGINT PRIMARY KEY,
                balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
                tier VARCHAR(20) NOT NULL DEFAULT 'Bronze',
                last_activity_date DATE,
                current_streak INTEGER NOT NULL DEFAULT 0 CHECK (current_streak >= 0),
                longest_streak INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                CHECK (longest_streak >= current_streak)
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create user_contributions table: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_contributions_balance ON forum.user_contributions(balance DESC, user_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create balance index: {}", e))?;

        info!("Contribution schema initialized");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> Result<PgLedgerTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ContributionError::aborted("begin", e))?;
        Ok(PgLedgerTx { tx })
    }
}

/// A PostgreSQL transaction carrying contribution writes.
///
/// Request handlers that already hold a transaction wrap it with
/// [`PgLedgerTx::from_transaction`], run their own statements through
/// [`PgLedgerTx::connection`], and commit once at the end.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    pub fn from_transaction(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub fn into_inner(self) -> Transaction<'static, Postgres> {
        self.tx
    }
}

fn streak_from_row(row: &PgRow) -> Result<StreakState> {
    let decode = |e: sqlx::Error| ContributionError::aborted("decode streak", e);
    let last_activity_date: Option<NaiveDate> = row.try_get("last_activity_date").map_err(decode)?;
    let current_streak: i32 = row.try_get("current_streak").map_err(decode)?;
    let longest_streak: i32 = row.try_get("longest_streak").map_err(decode)?;

    Ok(StreakState {
        last_activity_date,
        current_streak: current_streak.max(0) as u32,
        longest_streak: longest_streak.max(0) as u32,
    })
}

fn tier_from_row(row: &PgRow) -> Result<Tier> {
    let tier: String = row
        .try_get("tier")
        .map_err(|e| ContributionError::aborted("decode tier", e))?;
    tier.parse()
        .map_err(|e: String| ContributionError::aborted("decode tier", e))
}

fn to_db_streak(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn open_account(&mut self, actor_id: i64) -> Result<bool> {
        let result = sqlx::query(r#"
            INSERT INTO forum.user_contributions (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
        "#)
        .bind(actor_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("open account", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn load_state(&mut self, actor_id: i64) -> Result<Option<ContributionState>> {
        let row = sqlx::query(r#"
            SELECT user_id, balance, tier, last_activity_date, current_streak, longest_streak
            FROM forum.user_contributions
            WHERE user_id = $1
        "#)
        .bind(actor_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("load contribution state", e))?;

        match row {
            Some(row) => {
                let balance: i64 = row
                    .try_get("balance")
                    .map_err(|e| ContributionError::aborted("decode balance", e))?;
                Ok(Some(ContributionState {
                    actor_id,
                    balance,
                    tier: tier_from_row(&row)?,
                    streak: streak_from_row(&row)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn lock_streak(&mut self, actor_id: i64) -> Result<Option<StreakState>> {
        let row = sqlx::query(r#"
            SELECT last_activity_date, current_streak, longest_streak
            FROM forum.user_contributions
            WHERE user_id = $1
            FOR UPDATE
        "#)
        .bind(actor_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("lock streak", e))?;

        row.as_ref().map(streak_from_row).transpose()
    }

    async fn store_streak(&mut self, actor_id: i64, streak: &StreakState) -> Result<()> {
        let result = sqlx::query(r#"
            UPDATE forum.user_contributions
            SET last_activity_date = $2,
                current_streak = $3,
                longest_streak = GREATEST(longest_streak, $4),
                updated_at = NOW()
            WHERE user_id = $1
        "#)
        .bind(actor_id)
        .bind(streak.last_activity_date)
        .bind(to_db_streak(streak.current_streak))
        .bind(to_db_streak(streak.longest_streak))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("store streak", e))?;

        if result.rows_affected() == 0 {
            return Err(ContributionError::UserNotFound(actor_id));
        }
        Ok(())
    }

    async fn apply_delta(&mut self, actor_id: i64, delta: i64) -> Result<Option<(i64, i64)>> {
        let row = sqlx::query(r#"
            UPDATE forum.user_contributions AS c
            SET balance = GREATEST(0, c.balance + $2),
                updated_at = NOW()
            FROM (
                SELECT user_id, balance
                FROM forum.user_contributions
                WHERE user_id = $1
                FOR UPDATE
            ) AS prev
            WHERE c.user_id = prev.user_id
            RETURNING prev.balance AS previous, c.balance AS balance
        "#)
        .bind(actor_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("apply delta", e))?;

        match row {
            Some(row) => {
                let decode = |e: sqlx::Error| ContributionError::aborted("decode balance", e);
                let previous: i64 = row.try_get("previous").map_err(decode)?;
                let balance: i64 = row.try_get("balance").map_err(decode)?;
                debug!(actor_id = actor_id, previous = previous, balance = balance, "Applied balance delta");
                Ok(Some((previous, balance)))
            }
            None => Ok(None),
        }
    }

    async fn store_tier(&mut self, actor_id: i64, tier: Tier) -> Result<()> {
        let result = sqlx::query("UPDATE forum.user_contributions SET tier = $2 WHERE user_id = $1")
            .bind(actor_id)
            .bind(tier.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| ContributionError::aborted("store tier", e))?;

        if result.rows_affected() == 0 {
            return Err(ContributionError::UserNotFound(actor_id));
        }
        Ok(())
    }

    async fn store_balance(&mut self, actor_id: i64, balance: i64, tier: Tier) -> Result<()> {
        let result = sqlx::query(r#"
            UPDATE forum.user_contributions
            SET balance = GREATEST(0, $2), tier = $3, updated_at = NOW()
            WHERE user_id = $1
        "#)
        .bind(actor_id)
        .bind(balance)
        .bind(tier.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("store balance", e))?;

        if result.rows_affected() == 0 {
            return Err(ContributionError::UserNotFound(actor_id));
        }
        Ok(())
    }

    async fn activity_totals(&mut self, actor_id: i64) -> Result<ActivityTotals> {
        let row = sqlx::query(r#"
            SELECT
                (SELECT COUNT(*) FROM forum.posts
                    WHERE author_id = $1 AND post_type = 'post') AS posts,
                (SELECT COUNT(*) FROM forum.posts
                    WHERE author_id = $1 AND post_type = 'solution') AS solutions,
                (SELECT COUNT(*) FROM forum.comments
                    WHERE author_id = $1) AS comments,
                (SELECT COUNT(*) FROM forum.votes v JOIN forum.posts p ON p.id = v.post_id
                    WHERE p.author_id = $1 AND v.vote_type = 'up') AS upvotes_received,
                (SELECT COUNT(*) FROM forum.votes v JOIN forum.posts p ON p.id = v.post_id
                    WHERE p.author_id = $1 AND v.vote_type = 'down') AS downvotes_received,
                (SELECT COUNT(*) FROM forum.bookmarks b JOIN forum.posts p ON p.id = b.post_id
                    WHERE p.author_id = $1) AS bookmarks_received,
                (SELECT COALESCE(SUM(view_count), 0)::BIGINT FROM forum.posts
                    WHERE author_id = $1) AS views_received
        "#)
        .bind(actor_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("aggregate activity", e))?;

        let decode = |e: sqlx::Error| ContributionError::aborted("decode activity totals", e);
        Ok(ActivityTotals {
            posts: row.try_get("posts").map_err(decode)?,
            solutions: row.try_get("solutions").map_err(decode)?,
            comments: row.try_get("comments").map_err(decode)?,
            upvotes_received: row.try_get("upvotes_received").map_err(decode)?,
            downvotes_received: row.try_get("downvotes_received").map_err(decode)?,
            bookmarks_received: row.try_get("bookmarks_received").map_err(decode)?,
            views_received: row.try_get("views_received").map_err(decode)?,
        })
    }

    async fn top_contributors(&mut self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(r#"
            SELECT user_id, balance, tier, current_streak
            FROM forum.user_contributions
            ORDER BY balance DESC, user_id ASC
            LIMIT $1
        "#)
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| ContributionError::aborted("load leaderboard", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let decode = |e: sqlx::Error| ContributionError::aborted("decode leaderboard", e);
            let current_streak: i32 = row.try_get("current_streak").map_err(decode)?;
            entries.push(LeaderboardEntry {
                rank: i as u32 + 1,
                actor_id: row.try_get("user_id").map_err(decode)?,
                balance: row.try_get("balance").map_err(decode)?,
                tier: tier_from_row(row)?,
                current_streak: current_streak.max(0) as u32,
            });
        }

        Ok(entries)
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| ContributionError::aborted("commit", e))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| ContributionError::aborted("rollback", e))
    }
}
