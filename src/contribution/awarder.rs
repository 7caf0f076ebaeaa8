//! Contribution Awarder - Main Orchestrator
//!
//! Turns an action into points: rule lookup, streak update, multiplier
//! composition and the balance mutation, all inside one transaction.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::contribution::ledger::{BalanceChange, LedgerStore, LedgerTx, Scope};
use crate::contribution::rules::{ActionKind, QualityFlags, RuleSet};
use crate::contribution::streak::StreakTransition;
use crate::error::{ContributionError, Result};

/// One award request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub actor_id: i64,
    pub action_kind: ActionKind,
    #[serde(default)]
    pub quality_flags: QualityFlags,
    /// Engagement batch size; ignored for content creation
    #[serde(default = "default_count")]
    pub count: u32,
    /// Defaults to today (UTC)
    #[serde(default)]
    pub occurred_on: Option<NaiveDate>,
}

fn default_count() -> u32 {
    1
}

impl ActionEvent {
    pub fn new(actor_id: i64, action_kind: ActionKind) -> Self {
        Self {
            actor_id,
            action_kind,
            quality_flags: QualityFlags::none(),
            count: 1,
            occurred_on: None,
        }
    }

    pub fn with_flags(mut self, quality_flags: QualityFlags) -> Self {
        self.quality_flags = quality_flags;
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn on(mut self, occurred_on: NaiveDate) -> Self {
        self.occurred_on = Some(occurred_on);
        self
    }
}

/// Outcome of a content-creation award
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentAward {
    pub points_awarded: i64,
    /// Streak multiplier minus one (0.1 for a one-day streak)
    pub streak_bonus: Decimal,
    pub current_streak: u32,
    pub streak_transition: StreakTransition,
    pub balance: BalanceChange,
}

/// Outcome of an engagement award
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementAward {
    pub points_awarded: i64,
    pub balance: BalanceChange,
}

/// Outcome of [`ContributionEngine::award`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Award {
    Content(ContentAward),
    Engagement(EngagementAward),
}

impl Award {
    pub fn points_awarded(&self) -> i64 {
        match self {
            Award::Content(award) => award.points_awarded,
            Award::Engagement(award) => award.points_awarded,
        }
    }
}

/// The contribution and reputation engine
pub struct ContributionEngine<S: LedgerStore> {
    store: Arc<S>,
    rules: Arc<RuleSet>,
}

impl<S: LedgerStore> Clone for ContributionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<S: LedgerStore> ContributionEngine<S> {
    pub fn new(store: Arc<S>, rules: RuleSet) -> Self {
        Self {
            store,
            rules: Arc::new(rules),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Create the zero-initialised ledger row for a new account
    pub async fn open_account(&self, scope: Scope<'_, S::Tx>, actor_id: i64) -> Result<bool> {
        match scope {
            Scope::Joined(tx) => self.open_account_in(tx, actor_id).await,
            Scope::Owned => {
                let mut tx = self.store.begin().await?;
                let result = self.open_account_in(&mut tx, actor_id).await;
                finish(tx, result).await
            }
        }
    }

    /// Award points for content the actor created
    pub async fn award_content_creation(
        &self,
        scope: Scope<'_, S::Tx>,
        actor_id: i64,
        content_kind: ActionKind,
        quality_flags: QualityFlags,
        occurred_on: Option<NaiveDate>,
    ) -> Result<ContentAward> {
        let today = occurred_on.unwrap_or_else(|| Utc::now().date_naive());
        match scope {
            Scope::Joined(tx) => {
                self.content_creation_in(tx, actor_id, content_kind, quality_flags, today)
                    .await
            }
            Scope::Owned => {
                let mut tx = self.store.begin().await?;
                let result = self
                    .content_creation_in(&mut tx, actor_id, content_kind, quality_flags, today)
                    .await;
                finish(tx, result).await
            }
        }
    }

    /// Award points for engagement received on the actor's content
    pub async fn award_engagement_received(
        &self,
        scope: Scope<'_, S::Tx>,
        actor_id: i64,
        engagement_kind: ActionKind,
        count: u32,
    ) -> Result<EngagementAward> {
        match scope {
            Scope::Joined(tx) => {
                self.engagement_in(tx, actor_id, engagement_kind, count)
                    .await
            }
            Scope::Owned => {
                let mut tx = self.store.begin().await?;
                let result = self
                    .engagement_in(&mut tx, actor_id, engagement_kind, count)
                    .await;
                finish(tx, result).await
            }
        }
    }

    /// Route an event to the matching award path
    pub async fn award(&self, scope: Scope<'_, S::Tx>, event: &ActionEvent) -> Result<Award> {
        if event.action_kind.is_content_creation() {
            self.award_content_creation(
                scope,
                event.actor_id,
                event.action_kind,
                event.quality_flags,
                event.occurred_on,
            )
            .await
            .map(Award::Content)
        } else {
            self.award_engagement_received(scope, event.actor_id, event.action_kind, event.count)
                .await
                .map(Award::Engagement)
        }
    }

    pub(crate) async fn open_account_in(&self, tx: &mut S::Tx, actor_id: i64) -> Result<bool> {
        let created = tx.open_account(actor_id).await?;
        if created {
            info!(actor_id = actor_id, "Opened contribution ledger");
        }
        Ok(created)
    }

    async fn content_creation_in(
        &self,
        tx: &mut S::Tx,
        actor_id: i64,
        content_kind: ActionKind,
        quality_flags: QualityFlags,
        today: NaiveDate,
    ) -> Result<ContentAward> {
        if !content_kind.is_content_creation() {
            return Err(ContributionError::InvalidActionKind(format!(
                "{} is not a content-creation action",
                content_kind
            )));
        }

        let points = &self.rules.points;

        // Row lock makes the same-day check and the write atomic per actor
        let streak = tx
            .lock_streak(actor_id)
            .await?
            .ok_or(ContributionError::UserNotFound(actor_id))?;
        let update = streak.advance(today);
        if update.changed() {
            tx.store_streak(actor_id, &update.state).await?;
        }

        let current_streak = update.state.current_streak;
        let streak_bonus = points.streak_bonus(current_streak);
        let points_awarded = points.content_points(content_kind, quality_flags, current_streak);

        let balance = self.apply_delta(tx, actor_id, points_awarded).await?;

        debug!(
            actor_id = actor_id,
            kind = %content_kind,
            points = points_awarded,
            streak = current_streak,
            transition = ?update.transition,
            "Awarded content creation"
        );

        Ok(ContentAward {
            points_awarded,
            streak_bonus,
            current_streak,
            streak_transition: update.transition,
            balance,
        })
    }

    async fn engagement_in(
        &self,
        tx: &mut S::Tx,
        actor_id: i64,
        engagement_kind: ActionKind,
        count: u32,
    ) -> Result<EngagementAward> {
        if !engagement_kind.is_engagement() {
            return Err(ContributionError::InvalidActionKind(format!(
                "{} is not an engagement action",
                engagement_kind
            )));
        }

        let points_awarded = self.rules.points.engagement_points(engagement_kind, count);
        let balance = self.apply_delta(tx, actor_id, points_awarded).await?;

        debug!(
            actor_id = actor_id,
            kind = %engagement_kind,
            count = count,
            points = points_awarded,
            "Awarded engagement received"
        );

        Ok(EngagementAward {
            points_awarded,
            balance,
        })
    }

    /// Clamped balance mutation with tier re-resolution
    pub(crate) async fn apply_delta(
        &self,
        tx: &mut S::Tx,
        actor_id: i64,
        delta: i64,
    ) -> Result<BalanceChange> {
        let (previous, balance) = tx
            .apply_delta(actor_id, delta)
            .await?
            .ok_or(ContributionError::UserNotFound(actor_id))?;

        let tier = self.rules.tiers.resolve(balance);
        tx.store_tier(actor_id, tier).await?;

        let clamped = previous + delta < 0;
        if clamped {
            warn!(
                actor_id = actor_id,
                previous = previous,
                delta = delta,
                "Balance clamped at zero"
            );
        }

        Ok(BalanceChange {
            previous,
            balance,
            tier,
            clamped,
        })
    }
}

/// Commit an engine-owned transaction on success, roll it back on error
pub(crate) async fn finish<T, X: LedgerTx>(tx: X, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed after award error");
            }
            Err(err)
        }
    }
}
