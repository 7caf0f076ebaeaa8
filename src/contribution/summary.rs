//! Contribution summaries and recalculation
//!
//! Summaries read the incrementally maintained ledger. Recalculation
//! ignores it and rebuilds the balance from the forum's lifetime activity
//! counts, to repair drift. Streak history cannot be rebuilt from counts,
//! so recalculation leaves streak fields alone.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contribution::awarder::{finish, ContributionEngine};
use crate::contribution::ledger::{
    ActivityTotals, ContributionState, LeaderboardEntry, LedgerStore, LedgerTx, Scope,
};
use crate::contribution::rules::{round_points, ActionKind, PointRules};
use crate::contribution::tier::{Tier, TierTable, TierThreshold};
use crate::error::{ContributionError, Result};

pub const MAX_LEADERBOARD_SIZE: u32 = 100;

/// Dashboard view of one user's contributions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionSummary {
    pub actor_id: i64,
    pub balance: i64,
    pub tier: Tier,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub next_tier: Option<TierThreshold>,
    pub progress_to_next_tier: u32,
}

impl ContributionSummary {
    pub fn from_state(state: &ContributionState, tiers: &TierTable) -> Self {
        // Derive from the balance rather than trusting the stored label
        let tier = tiers.resolve(state.balance);
        Self {
            actor_id: state.actor_id,
            balance: state.balance,
            tier,
            current_streak: state.streak.current_streak,
            longest_streak: state.streak.longest_streak,
            last_activity_date: state.streak.last_activity_date,
            next_tier: tiers.next_tier(tier),
            progress_to_next_tier: tiers.progress_to_next_tier(state.balance, tier),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recalculation {
    pub balance: i64,
    pub tier: Tier,
    /// Ledger balance before the rebuild
    pub previous_balance: i64,
}

impl Recalculation {
    pub fn drift(&self) -> i64 {
        self.previous_balance - self.balance
    }
}

/// Base-point balance implied by lifetime activity, floored at zero.
///
/// Quality and streak multipliers are not recoverable from counts, so
/// only base points contribute.
pub fn balance_from_totals(points: &PointRules, totals: &ActivityTotals) -> i64 {
    let contributions = [
        (ActionKind::Post, totals.posts),
        (ActionKind::Solution, totals.solutions),
        (ActionKind::Comment, totals.comments),
        (ActionKind::Upvote, totals.upvotes_received),
        (ActionKind::Downvote, totals.downvotes_received),
        (ActionKind::Bookmark, totals.bookmarks_received),
        (ActionKind::View, totals.views_received),
    ];

    let raw: Decimal = contributions
        .iter()
        .map(|(kind, count)| points.base_points(*kind) * Decimal::from(*count))
        .sum();

    round_points(raw).max(0)
}

impl<S: LedgerStore> ContributionEngine<S> {
    pub async fn contribution_summary(
        &self,
        scope: Scope<'_, S::Tx>,
        actor_id: i64,
    ) -> Result<ContributionSummary> {
        match scope {
            Scope::Joined(tx) => self.summary_in(tx, actor_id).await,
            Scope::Owned => {
                let mut tx = self.store().begin().await?;
                let result = self.summary_in(&mut tx, actor_id).await;
                finish(tx, result).await
            }
        }
    }

    /// Rebuild balance and tier from the system of record
    pub async fn recalculate_from_scratch(
        &self,
        scope: Scope<'_, S::Tx>,
        actor_id: i64,
    ) -> Result<Recalculation> {
        match scope {
            Scope::Joined(tx) => self.recalculate_in(tx, actor_id).await,
            Scope::Owned => {
                let mut tx = self.store().begin().await?;
                let result = self.recalculate_in(&mut tx, actor_id).await;
                finish(tx, result).await
            }
        }
    }

    /// Highest balances first, ties by ascending actor id
    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let limit = limit.clamp(1, MAX_LEADERBOARD_SIZE);
        let mut tx = self.store().begin().await?;
        let result = tx.top_contributors(limit).await;
        finish(tx, result).await
    }

    async fn summary_in(&self, tx: &mut S::Tx, actor_id: i64) -> Result<ContributionSummary> {
        let state = tx
            .load_state(actor_id)
            .await?
            .ok_or(ContributionError::UserNotFound(actor_id))?;
        Ok(ContributionSummary::from_state(&state, &self.rules().tiers))
    }

    async fn recalculate_in(&self, tx: &mut S::Tx, actor_id: i64) -> Result<Recalculation> {
        // Zero-delta increment takes the row lock and proves the row exists
        let (previous_balance, _) = tx
            .apply_delta(actor_id, 0)
            .await?
            .ok_or(ContributionError::UserNotFound(actor_id))?;

        let totals = tx.activity_totals(actor_id).await?;
        let balance = balance_from_totals(&self.rules().points, &totals);
        let tier = self.rules().tiers.resolve(balance);
        tx.store_balance(actor_id, balance, tier).await?;

        let recalculation = Recalculation {
            balance,
            tier,
            previous_balance,
        };

        if recalculation.drift() != 0 {
            warn!(
                actor_id = actor_id,
                previous = previous_balance,
                recalculated = balance,
                "Contribution balance drift corrected"
            );
        } else {
            info!(actor_id = actor_id, balance = balance, "Contribution balance verified");
        }

        Ok(recalculation)
    }
}
