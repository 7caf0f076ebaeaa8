//! Point Rule Table
//!
//! Base point values per action kind and the quality multipliers applied
//! to content creation. Loaded once from configuration and injected into
//! the engine; tests build synthetic rule sets directly.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::contribution::tier::TierTable;
use crate::error::ContributionError;

/// Every action that can move a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    // Content created by the actor
    Post,
    Solution,
    Comment,

    // Engagement received on the actor's content
    Upvote,
    Downvote,
    Bookmark,
    View,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Post,
        ActionKind::Solution,
        ActionKind::Comment,
        ActionKind::Upvote,
        ActionKind::Downvote,
        ActionKind::Bookmark,
        ActionKind::View,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Post => "post",
            ActionKind::Solution => "solution",
            ActionKind::Comment => "comment",
            ActionKind::Upvote => "upvote",
            ActionKind::Downvote => "downvote",
            ActionKind::Bookmark => "bookmark",
            ActionKind::View => "view",
        }
    }

    /// Content creation advances the streak and takes quality multipliers
    pub fn is_content_creation(&self) -> bool {
        matches!(
            self,
            ActionKind::Post | ActionKind::Solution | ActionKind::Comment
        )
    }

    pub fn is_engagement(&self) -> bool {
        !self.is_content_creation()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ContributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ContributionError::InvalidActionKind(s.to_string()))
    }
}

/// Quality properties of created content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub featured: bool,
}

impl QualityFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn verified() -> Self {
        Self {
            verified: true,
            ..Self::default()
        }
    }
}

/// Base points and multipliers.
///
/// Held as exact decimals so that composed products such as
/// `5 × 4.5 × 1.4 = 31.5` round the way they read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRules {
    pub post: Decimal,
    pub solution: Decimal,
    pub comment: Decimal,
    pub upvote: Decimal,
    pub downvote: Decimal,
    pub bookmark: Decimal,
    /// Fractional; rounding happens only on the final award
    pub view: Decimal,

    pub verified_multiplier: Decimal,
    pub approved_multiplier: Decimal,
    pub featured_multiplier: Decimal,

    /// Bonus per consecutive day of content creation
    pub streak_bonus_per_day: Decimal,
    /// Upper bound on the streak bonus
    pub streak_bonus_cap: Decimal,
}

impl Default for PointRules {
    fn default() -> Self {
        Self {
            post: Decimal::new(5, 0),
            solution: Decimal::new(10, 0),
            comment: Decimal::new(2, 0),
            upvote: Decimal::new(3, 0),
            downvote: Decimal::new(-1, 0),
            bookmark: Decimal::new(2, 0),
            view: Decimal::new(1, 1),
            verified_multiplier: Decimal::new(2, 0),
            approved_multiplier: Decimal::new(15, 1),
            featured_multiplier: Decimal::new(15, 1),
            streak_bonus_per_day: Decimal::new(10, 2),
            streak_bonus_cap: Decimal::new(50, 2),
        }
    }
}

impl PointRules {
    pub fn base_points(&self, kind: ActionKind) -> Decimal {
        match kind {
            ActionKind::Post => self.post,
            ActionKind::Solution => self.solution,
            ActionKind::Comment => self.comment,
            ActionKind::Upvote => self.upvote,
            ActionKind::Downvote => self.downvote,
            ActionKind::Bookmark => self.bookmark,
            ActionKind::View => self.view,
        }
    }

    /// Product of the multipliers of every set flag, 1 when none are set
    pub fn quality_multiplier(&self, flags: QualityFlags) -> Decimal {
        let mut multiplier = Decimal::ONE;
        if flags.verified {
            multiplier *= self.verified_multiplier;
        }
        if flags.approved {
            multiplier *= self.approved_multiplier;
        }
        if flags.featured {
            multiplier *= self.featured_multiplier;
        }
        multiplier
    }

    /// Streak bonus as a fraction: `min(streak * per_day, cap)`
    pub fn streak_bonus(&self, current_streak: u32) -> Decimal {
        (Decimal::from(current_streak) * self.streak_bonus_per_day).min(self.streak_bonus_cap)
    }

    pub fn streak_multiplier(&self, current_streak: u32) -> Decimal {
        Decimal::ONE + self.streak_bonus(current_streak)
    }

    /// `round(base × quality × (1 + streak bonus))`
    pub fn content_points(&self, kind: ActionKind, flags: QualityFlags, current_streak: u32) -> i64 {
        round_points(
            self.base_points(kind)
                * self.quality_multiplier(flags)
                * self.streak_multiplier(current_streak),
        )
    }

    /// `round(base × count)`, no multipliers
    pub fn engagement_points(&self, kind: ActionKind, count: u32) -> i64 {
        round_points(self.base_points(kind) * Decimal::from(count))
    }
}

/// Immutable rule configuration handed to the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub points: PointRules,
    pub tiers: TierTable,
}

/// Round to the nearest integer, halves away from zero
pub fn round_points(raw: Decimal) -> i64 {
    let rounded = raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}
