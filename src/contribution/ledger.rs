//! Ledger Store boundary
//!
//! The engine only ever touches contribution rows through a [`LedgerTx`].
//! Implementations must give row-level serialization: `lock_streak` and
//! `apply_delta` hold the actor's row until the transaction ends, so
//! concurrent awards for one actor queue up instead of losing updates.
//! Different actors never block each other.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contribution::streak::StreakState;
use crate::contribution::tier::Tier;
use crate::error::Result;

/// One user's contribution row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionState {
    pub actor_id: i64,
    pub balance: i64,
    pub tier: Tier,
    pub streak: StreakState,
}

impl ContributionState {
    pub fn new(actor_id: i64) -> Self {
        Self {
            actor_id,
            balance: 0,
            tier: Tier::Bronze,
            streak: StreakState::default(),
        }
    }
}

/// Result of an atomic clamped increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub previous: i64,
    pub balance: i64,
    pub tier: Tier,
    /// The delta would have taken the balance below zero
    pub clamped: bool,
}

/// Lifetime activity counts from the forum's system of record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTotals {
    pub posts: i64,
    pub solutions: i64,
    pub comments: i64,
    pub upvotes_received: i64,
    pub downvotes_received: i64,
    pub bookmarks_received: i64,
    pub views_received: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub actor_id: i64,
    pub balance: i64,
    pub tier: Tier,
    pub current_streak: u32,
}

/// Opens units of work against the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTx;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// A single transaction against the ledger.
///
/// Nothing written through it is visible to other transactions until
/// `commit`; `rollback` (or dropping it) discards everything.
#[async_trait]
pub trait LedgerTx: Send {
    /// Zero-initialise a row. Returns false if the row already exists.
    async fn open_account(&mut self, actor_id: i64) -> Result<bool>;

    /// Read a row without locking it
    async fn load_state(&mut self, actor_id: i64) -> Result<Option<ContributionState>>;

    /// Read the streak fields, locking the row for the rest of the transaction
    async fn lock_streak(&mut self, actor_id: i64) -> Result<Option<StreakState>>;

    async fn store_streak(&mut self, actor_id: i64, streak: &StreakState) -> Result<()>;

    /// `balance = max(0, balance + delta)` as one atomic step, locking the row.
    /// Returns `(previous, new)`, or `None` if the row does not exist.
    async fn apply_delta(&mut self, actor_id: i64, delta: i64) -> Result<Option<(i64, i64)>>;

    async fn store_tier(&mut self, actor_id: i64, tier: Tier) -> Result<()>;

    /// Overwrite balance and tier (recalculation only)
    async fn store_balance(&mut self, actor_id: i64, balance: i64, tier: Tier) -> Result<()>;

    async fn activity_totals(&mut self, actor_id: i64) -> Result<ActivityTotals>;

    async fn top_contributors(&mut self, limit: u32) -> Result<Vec<LeaderboardEntry>>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Who owns the transaction an engine operation runs in
pub enum Scope<'a, T> {
    /// Run inside the caller's transaction. The engine never commits or
    /// rolls back; the caller's outcome decides whether the award sticks.
    Joined(&'a mut T),
    /// The engine opens its own transaction, commits on success and rolls
    /// back on error.
    Owned,
}

impl<'a, T> Scope<'a, T> {
    pub fn joined(tx: &'a mut T) -> Self {
        Scope::Joined(tx)
    }
}
