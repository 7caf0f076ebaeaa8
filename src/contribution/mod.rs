//! Contribution & Reputation Engine
//!
//! Converts user actions into a point balance, a derived reputation tier
//! and a consecutive-day activity streak.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌────────────────────┐     ┌─────────────────┐
//! │ PointRules      │────►│ ContributionEngine │◄────│ StreakState     │
//! │ (base points,   │     │ (awarder)          │     │ (day tracking)  │
//! │  multipliers)   │     └─────────┬──────────┘     └─────────────────┘
//! └─────────────────┘               │
//!                                   ▼
//!                       ┌──────────────────────┐     ┌─────────────────┐
//!                       │ LedgerTx             │────►│ TierTable       │
//!                       │ (row-locked balance) │     │ (tier resolver) │
//!                       └──────────────────────┘     └─────────────────┘
//! ```
//!
//! ## Point Model
//!
//! - Content creation: `round(base × quality × (1 + streak bonus))`
//! - Engagement received: `round(base × count)`, no multipliers
//! - Balance is clamped at zero, never rejected
//! - Streak bonus is 10% per consecutive day, capped at 50%
//! - Every operation runs in a caller-owned or engine-owned transaction

mod awarder;
mod ledger;
mod rules;
mod streak;
mod summary;
mod tier;

pub use awarder::{ActionEvent, Award, ContentAward, ContributionEngine, EngagementAward};
pub use ledger::{
    ActivityTotals, BalanceChange, ContributionState, LeaderboardEntry, LedgerStore, LedgerTx,
    Scope,
};
pub use rules::{round_points, ActionKind, PointRules, QualityFlags, RuleSet};
pub use streak::{StreakState, StreakTransition, StreakUpdate};
pub use summary::{balance_from_totals, ContributionSummary, Recalculation, MAX_LEADERBOARD_SIZE};
pub use tier::{Tier, TierTable, TierThreshold};
