//! Streak Tracker
//!
//! A streak counts consecutive calendar days with at least one
//! content-creation action. Only content creation advances it; engagement
//! received never touches streak fields.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Streak fields of a ledger row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub last_activity_date: Option<NaiveDate>,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// How a content-creation action on `today` affected the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreakTransition {
    /// Already active today, or the event is backdated
    Unchanged,
    /// First activity ever
    Started,
    /// Activity on the day after the last one
    Continued,
    /// Gap of more than one day; a fresh streak of length 1
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub state: StreakState,
    pub transition: StreakTransition,
}

impl StreakUpdate {
    /// Whether the row needs to be written
    pub fn changed(&self) -> bool {
        self.transition != StreakTransition::Unchanged
    }
}

impl StreakState {
    /// Advance the streak for a content-creation action on `today`.
    ///
    /// Same-day and backdated events leave the state untouched, so repeated
    /// calls for one day are idempotent.
    pub fn advance(&self, today: NaiveDate) -> StreakUpdate {
        let transition = match self.last_activity_date {
            None => StreakTransition::Started,
            Some(last) => match (today - last).num_days() {
                days if days <= 0 => StreakTransition::Unchanged,
                1 => StreakTransition::Continued,
                _ => StreakTransition::Reset,
            },
        };

        let state = match transition {
            StreakTransition::Unchanged => *self,
            StreakTransition::Started | StreakTransition::Reset => self.with_streak(today, 1),
            StreakTransition::Continued => {
                self.with_streak(today, self.current_streak.saturating_add(1))
            }
        };

        StreakUpdate { state, transition }
    }

    fn with_streak(&self, today: NaiveDate, current_streak: u32) -> StreakState {
        StreakState {
            last_activity_date: Some(today),
            current_streak,
            longest_streak: self.longest_streak.max(current_streak),
        }
    }
}
