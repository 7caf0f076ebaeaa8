//! In-memory Ledger
//!
//! Fallback store used when PostgreSQL is disabled, and the store the test
//! suite runs against. Each row sits behind its own async mutex; a
//! transaction takes the row's owned guard on first touch and holds it
//! until commit or rollback, which gives the same per-row serialization
//! as `SELECT ... FOR UPDATE`.
//!
//! There is no deadlock detector. A wait on a row lock gives up after the
//! ledger's lock timeout and aborts that transaction instead, so two
//! transactions locking the same actors in opposite order cannot hang.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::contribution::{
    ActivityTotals, ContributionState, LeaderboardEntry, LedgerStore, LedgerTx, StreakState, Tier,
};
use crate::error::{ContributionError, Result};

type Row = Arc<Mutex<ContributionState>>;

/// How long a transaction waits for another one's row lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct MemoryLedger {
    rows: Arc<DashMap<i64, Row>>,
    activity: Arc<DashMap<i64, ActivityTotals>>,
    lock_timeout: Duration,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            activity: Arc::new(DashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set the system-of-record activity counts for an actor
    pub fn record_activity(&self, actor_id: i64, totals: ActivityTotals) {
        self.activity.insert(actor_id, totals);
    }

    /// Insert or replace a committed row directly
    pub fn insert_state(&self, state: ContributionState) {
        self.rows
            .insert(state.actor_id, Arc::new(Mutex::new(state)));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn row(&self, actor_id: i64) -> Option<Row> {
        self.rows.get(&actor_id).map(|entry| entry.value().clone())
    }

    async fn lock_row(&self, actor_id: i64, row: Row) -> Result<OwnedMutexGuard<ContributionState>> {
        tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| {
                warn!(
                    actor_id = actor_id,
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "Row lock wait timed out"
                );
                ContributionError::aborted("lock row", format!("actor {} is locked", actor_id))
            })
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    type Tx = MemoryLedgerTx;

    async fn begin(&self) -> Result<MemoryLedgerTx> {
        Ok(MemoryLedgerTx {
            ledger: self.clone(),
            locked: HashMap::new(),
            staged: HashMap::new(),
            created: HashMap::new(),
        })
    }
}

/// Unit of work over a [`MemoryLedger`]
pub struct MemoryLedgerTx {
    ledger: MemoryLedger,
    /// Row guards held until the transaction ends
    locked: HashMap<i64, OwnedMutexGuard<ContributionState>>,
    /// Pending writes to locked rows
    staged: HashMap<i64, ContributionState>,
    /// Rows opened in this transaction
    created: HashMap<i64, ContributionState>,
}

impl MemoryLedgerTx {
    /// Lock the row on first touch and return its staged copy
    async fn row_mut(&mut self, actor_id: i64) -> Result<Option<&mut ContributionState>> {
        if self.created.contains_key(&actor_id) {
            return Ok(self.created.get_mut(&actor_id));
        }

        if !self.staged.contains_key(&actor_id) {
            let Some(row) = self.ledger.row(actor_id) else {
                return Ok(None);
            };
            let guard = self.ledger.lock_row(actor_id, row).await?;
            self.staged.insert(actor_id, *guard);
            self.locked.insert(actor_id, guard);
        }

        Ok(self.staged.get_mut(&actor_id))
    }

    /// What this transaction can see of a row. Waits out another
    /// transaction's lock but does not keep it.
    async fn visible(&self, actor_id: i64) -> Result<Option<ContributionState>> {
        if let Some(state) = self.created.get(&actor_id).or_else(|| self.staged.get(&actor_id)) {
            return Ok(Some(*state));
        }
        let Some(row) = self.ledger.row(actor_id) else {
            return Ok(None);
        };
        let guard = self.ledger.lock_row(actor_id, row).await?;
        Ok(Some(*guard))
    }

    async fn existing_mut(&mut self, actor_id: i64) -> Result<&mut ContributionState> {
        self.row_mut(actor_id)
            .await?
            .ok_or(ContributionError::UserNotFound(actor_id))
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn open_account(&mut self, actor_id: i64) -> Result<bool> {
        if self.created.contains_key(&actor_id) || self.ledger.rows.contains_key(&actor_id) {
            return Ok(false);
        }
        self.created
            .insert(actor_id, ContributionState::new(actor_id));
        Ok(true)
    }

    async fn load_state(&mut self, actor_id: i64) -> Result<Option<ContributionState>> {
        self.visible(actor_id).await
    }

    async fn lock_streak(&mut self, actor_id: i64) -> Result<Option<StreakState>> {
        Ok(self.row_mut(actor_id).await?.map(|state| state.streak))
    }

    async fn store_streak(&mut self, actor_id: i64, streak: &StreakState) -> Result<()> {
        let state = self.existing_mut(actor_id).await?;
        state.streak = StreakState {
            longest_streak: state.streak.longest_streak.max(streak.longest_streak),
            ..*streak
        };
        Ok(())
    }

    async fn apply_delta(&mut self, actor_id: i64, delta: i64) -> Result<Option<(i64, i64)>> {
        let Some(state) = self.row_mut(actor_id).await? else {
            return Ok(None);
        };
        let previous = state.balance;
        state.balance = previous.saturating_add(delta).max(0);
        Ok(Some((previous, state.balance)))
    }

    async fn store_tier(&mut self, actor_id: i64, tier: Tier) -> Result<()> {
        self.existing_mut(actor_id).await?.tier = tier;
        Ok(())
    }

    async fn store_balance(&mut self, actor_id: i64, balance: i64, tier: Tier) -> Result<()> {
        let state = self.existing_mut(actor_id).await?;
        state.balance = balance.max(0);
        state.tier = tier;
        Ok(())
    }

    async fn activity_totals(&mut self, actor_id: i64) -> Result<ActivityTotals> {
        Ok(self
            .ledger
            .activity
            .get(&actor_id)
            .map(|entry| *entry.value())
            .unwrap_or_default())
    }

    async fn top_contributors(&mut self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let ids: Vec<i64> = self
            .ledger
            .rows
            .iter()
            .map(|entry| *entry.key())
            .chain(self.created.keys().copied())
            .collect();

        let mut states = Vec::with_capacity(ids.len());
        for actor_id in ids {
            if let Some(state) = self.visible(actor_id).await? {
                states.push(state);
            }
        }

        states.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.actor_id.cmp(&b.actor_id))
        });

        Ok(states
            .into_iter()
            .take(limit as usize)
            .enumerate()
            .map(|(i, state)| LeaderboardEntry {
                rank: i as u32 + 1,
                actor_id: state.actor_id,
                balance: state.balance,
                tier: state.tier,
                current_streak: state.streak.current_streak,
            })
            .collect())
    }

    async fn commit(mut self) -> Result<()> {
        let touched = self.locked.len() + self.created.len();

        for (actor_id, mut guard) in self.locked.drain() {
            if let Some(state) = self.staged.remove(&actor_id) {
                *guard = state;
            }
        }

        for (actor_id, state) in self.created.drain() {
            self.ledger
                .rows
                .entry(actor_id)
                .or_insert_with(|| Arc::new(Mutex::new(state)));
        }

        debug!(rows = touched, "Committed memory ledger transaction");
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Dropping the guards releases the rows untouched
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let ledger = MemoryLedger::new();
        ledger.insert_state(ContributionState::new(1));

        let mut tx = ledger.begin().await.unwrap();
        tx.apply_delta(1, 40).await.unwrap();
        tx.rollback().await.unwrap();

        let mut reader = ledger.begin().await.unwrap();
        assert_eq!(reader.load_state(1).await.unwrap().unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let ledger = MemoryLedger::new();
        ledger.insert_state(ContributionState::new(1));

        let mut tx = ledger.begin().await.unwrap();
        assert_eq!(tx.apply_delta(1, 40).await.unwrap(), Some((0, 40)));
        assert_eq!(tx.apply_delta(1, -100).await.unwrap(), Some((40, 0)));
        tx.store_tier(1, Tier::Bronze).await.unwrap();
        tx.commit().await.unwrap();

        let mut reader = ledger.begin().await.unwrap();
        assert_eq!(reader.load_state(1).await.unwrap().unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_missing_row() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin().await.unwrap();
        assert_eq!(tx.apply_delta(5, 1).await.unwrap(), None);
        assert!(tx.lock_streak(5).await.unwrap().is_none());
        assert!(matches!(
            tx.store_tier(5, Tier::Gold).await,
            Err(ContributionError::UserNotFound(5))
        ));
    }

    #[tokio::test]
    async fn test_open_account_is_idempotent() {
        let ledger = MemoryLedger::new();

        let mut tx = ledger.begin().await.unwrap();
        assert!(tx.open_account(3).await.unwrap());
        assert!(!tx.open_account(3).await.unwrap());
        // Visible inside the transaction before commit
        assert_eq!(tx.apply_delta(3, 5).await.unwrap(), Some((0, 5)));
        tx.commit().await.unwrap();

        assert_eq!(ledger.len(), 1);
        let mut tx = ledger.begin().await.unwrap();
        assert!(!tx.open_account(3).await.unwrap());
        assert_eq!(tx.load_state(3).await.unwrap().unwrap().balance, 5);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_writer() {
        let ledger = MemoryLedger::new();
        ledger.insert_state(ContributionState::new(1));

        let mut first = ledger.begin().await.unwrap();
        first.apply_delta(1, 10).await.unwrap();

        let contender = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let mut second = ledger.begin().await.unwrap();
                let seen = second.apply_delta(1, 1).await.unwrap();
                second.commit().await.unwrap();
                seen
            })
        };

        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        first.commit().await.unwrap();
        // Second writer saw the first writer's committed balance
        assert_eq!(contender.await.unwrap(), Some((10, 11)));
    }

    #[tokio::test]
    async fn test_lock_wait_times_out() {
        let ledger = MemoryLedger::new().with_lock_timeout(Duration::from_millis(50));
        ledger.insert_state(ContributionState::new(1));

        let mut holder = ledger.begin().await.unwrap();
        holder.apply_delta(1, 10).await.unwrap();

        let mut waiter = ledger.begin().await.unwrap();
        let err = waiter.apply_delta(1, 1).await.unwrap_err();
        assert!(matches!(err, ContributionError::TransactionAborted(_)));
        waiter.rollback().await.unwrap();

        holder.commit().await.unwrap();
        let mut reader = ledger.begin().await.unwrap();
        assert_eq!(reader.load_state(1).await.unwrap().unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_opposite_lock_order_aborts() {
        let ledger = MemoryLedger::new().with_lock_timeout(Duration::from_millis(100));
        ledger.insert_state(ContributionState::new(1));
        ledger.insert_state(ContributionState::new(2));

        let mut first = ledger.begin().await.unwrap();
        let mut second = ledger.begin().await.unwrap();
        first.apply_delta(1, 5).await.unwrap();
        second.apply_delta(2, 5).await.unwrap();

        let crossed = tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(first.apply_delta(2, 1), second.apply_delta(1, 1))
        })
        .await
        .expect("crossed lock waits must not hang");

        assert!(matches!(crossed.0, Err(ContributionError::TransactionAborted(_))));
        assert!(matches!(crossed.1, Err(ContributionError::TransactionAborted(_))));
        first.rollback().await.unwrap();
        second.rollback().await.unwrap();

        let mut reader = ledger.begin().await.unwrap();
        assert_eq!(reader.load_state(1).await.unwrap().unwrap().balance, 0);
        assert_eq!(reader.load_state(2).await.unwrap().unwrap().balance, 0);
    }
}
