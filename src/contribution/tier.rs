//! Reputation Tiers
//!
//! Tiers are closed, ordered, non-overlapping point ranges starting at 0.
//! The top tier has no upper bound. A tier is always derived from the
//! balance, never stored independently of it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reputation label derived from a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
            Tier::Diamond => "Diamond",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bronze" => Ok(Tier::Bronze),
            "Silver" => Ok(Tier::Silver),
            "Gold" => Ok(Tier::Gold),
            "Platinum" => Ok(Tier::Platinum),
            "Diamond" => Ok(Tier::Diamond),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Lower bound of a tier's range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub tier: Tier,
    pub min_points: i64,
}

/// Ordered tier thresholds, lowest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    thresholds: Vec<TierThreshold>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            thresholds: vec![
                TierThreshold { tier: Tier::Bronze, min_points: 0 },
                TierThreshold { tier: Tier::Silver, min_points: 100 },
                TierThreshold { tier: Tier::Gold, min_points: 500 },
                TierThreshold { tier: Tier::Platinum, min_points: 1500 },
                TierThreshold { tier: Tier::Diamond, min_points: 5000 },
            ],
        }
    }
}

impl TierTable {
    /// Build a table, rejecting anything that would not partition `[0, ∞)`
    pub fn new(thresholds: Vec<TierThreshold>) -> Result<Self, String> {
        let table = Self { thresholds };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), String> {
        let first = self
            .thresholds
            .first()
            .ok_or_else(|| "tier table cannot be empty".to_string())?;

        if first.min_points != 0 {
            return Err(format!(
                "lowest tier {} must start at 0, not {}",
                first.tier, first.min_points
            ));
        }

        for pair in self.thresholds.windows(2) {
            if pair[1].min_points <= pair[0].min_points {
                return Err(format!(
                    "tier {} threshold {} must be above {} threshold {}",
                    pair[1].tier, pair[1].min_points, pair[0].tier, pair[0].min_points
                ));
            }
            if pair[1].tier <= pair[0].tier {
                return Err(format!(
                    "tier {} listed after {} is out of order",
                    pair[1].tier, pair[0].tier
                ));
            }
        }

        Ok(())
    }

    pub fn thresholds(&self) -> &[TierThreshold] {
        &self.thresholds
    }

    fn position(&self, tier: Tier) -> Option<usize> {
        self.thresholds.iter().position(|t| t.tier == tier)
    }

    /// The tier whose range contains `balance`
    pub fn resolve(&self, balance: i64) -> Tier {
        self.thresholds
            .iter()
            .rev()
            .find(|t| balance >= t.min_points)
            .or_else(|| self.thresholds.first())
            .map(|t| t.tier)
            .unwrap_or(Tier::Bronze)
    }

    pub fn min_points(&self, tier: Tier) -> Option<i64> {
        self.position(tier).map(|i| self.thresholds[i].min_points)
    }

    /// The immediately higher tier, or `None` at the top
    pub fn next_tier(&self, tier: Tier) -> Option<TierThreshold> {
        self.position(tier)
            .and_then(|i| self.thresholds.get(i + 1))
            .copied()
    }

    /// Percent of the way from `tier`'s floor to the next tier's floor
    pub fn progress_to_next_tier(&self, balance: i64, tier: Tier) -> u32 {
        let (Some(floor), Some(next)) = (self.min_points(tier), self.next_tier(tier)) else {
            return 100;
        };

        let span = i128::from(next.min_points) - i128::from(floor);
        let gained = (i128::from(balance) - i128::from(floor)).clamp(0, span);
        // Whole percent, halves rounded up
        ((gained * 200 + span) / (2 * span)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_boundaries() {
        let table = TierTable::default();
        assert_eq!(table.resolve(0), Tier::Bronze);
        assert_eq!(table.resolve(99), Tier::Bronze);
        assert_eq!(table.resolve(100), Tier::Silver);
        assert_eq!(table.resolve(499), Tier::Silver);
        assert_eq!(table.resolve(500), Tier::Gold);
        assert_eq!(table.resolve(1499), Tier::Gold);
        assert_eq!(table.resolve(1500), Tier::Platinum);
        assert_eq!(table.resolve(5000), Tier::Diamond);
        assert_eq!(table.resolve(i64::MAX), Tier::Diamond);
    }

    #[test]
    fn test_ranges_partition_without_gaps() {
        let table = TierTable::default();
        // Each balance maps to exactly one tier and tiers never go backwards
        let mut previous = Tier::Bronze;
        for balance in 0..6000 {
            let tier = table.resolve(balance);
            assert!(tier >= previous, "tier regressed at {}", balance);
            let floor = table.min_points(tier).unwrap();
            assert!(balance >= floor);
            if let Some(next) = table.next_tier(tier) {
                assert!(balance < next.min_points);
            }
            previous = tier;
        }
    }

    #[test]
    fn test_next_tier() {
        let table = TierTable::default();
        assert_eq!(
            table.next_tier(Tier::Bronze),
            Some(TierThreshold { tier: Tier::Silver, min_points: 100 })
        );
        assert_eq!(table.next_tier(Tier::Platinum).unwrap().min_points, 5000);
        assert_eq!(table.next_tier(Tier::Diamond), None);
    }

    #[test]
    fn test_progress() {
        let table = TierTable::default();
        assert_eq!(table.progress_to_next_tier(0, Tier::Bronze), 0);
        assert_eq!(table.progress_to_next_tier(6, Tier::Bronze), 6);
        assert_eq!(table.progress_to_next_tier(300, Tier::Silver), 50);
        assert_eq!(table.progress_to_next_tier(1000, Tier::Gold), 50);
        assert_eq!(table.progress_to_next_tier(9000, Tier::Diamond), 100);
        // 2 of 400 points is exactly half a percent
        assert_eq!(table.progress_to_next_tier(102, Tier::Silver), 1);
        assert_eq!(table.progress_to_next_tier(101, Tier::Silver), 0);
    }

    #[test]
    fn test_rejects_bad_tables() {
        assert!(TierTable::new(vec![]).is_err());
        assert!(TierTable::new(vec![TierThreshold { tier: Tier::Bronze, min_points: 10 }]).is_err());
        assert!(TierTable::new(vec![
            TierThreshold { tier: Tier::Bronze, min_points: 0 },
            TierThreshold { tier: Tier::Silver, min_points: 0 },
        ])
        .is_err());
        assert!(TierTable::new(vec![
            TierThreshold { tier: Tier::Silver, min_points: 0 },
            TierThreshold { tier: Tier::Bronze, min_points: 50 },
        ])
        .is_err());
        assert!(TierTable::new(TierTable::default().thresholds().to_vec()).is_ok());
    }

    #[test]
    fn test_tier_names_round_trip() {
        assert_eq!("Gold".parse::<Tier>().unwrap(), Tier::Gold);
        assert!("Mithril".parse::<Tier>().is_err());
    }
}
