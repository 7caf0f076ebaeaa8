//! HTTP API endpoints for the contribution engine
//!
//! Provides REST APIs for:
//! - Contribution summaries and the leaderboard (dashboard)
//! - Active point rules and tier thresholds
//! - Balance recalculation (admin tooling)

pub mod contribution;

pub use contribution::{
    create_contribution_router, error_status, ContributionApiState, LeaderboardResponse,
    RecalculationResponse, RulesResponse,
};
