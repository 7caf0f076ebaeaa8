//! Forum Contributions
//!
//! Contribution and reputation engine for the Q&A forum backend. Turns
//! posts, solutions, comments, and the votes, bookmarks and views they
//! receive into a point balance, a reputation tier and an activity streak.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Server entrypoint
//! ├── config.rs       - Configuration management
//! ├── error.rs        - Engine error types
//! ├── contribution/   - Contribution & reputation engine
//! │   ├── rules.rs    - Point rule table & quality multipliers
//! │   ├── streak.rs   - Consecutive-day streak tracking
//! │   ├── tier.rs     - Reputation tier resolver
//! │   ├── ledger.rs   - Ledger store boundary & transaction scopes
//! │   ├── awarder.rs  - Award orchestration
//! │   └── summary.rs  - Summaries, leaderboard & recalculation
//! ├── database/       - Ledger storage
//! │   ├── pool.rs     - PostgreSQL pool
//! │   ├── contributions.rs - PostgreSQL ledger
//! │   └── memory.rs   - In-memory ledger
//! └── api/            - HTTP API endpoints
//!     └── contribution.rs - Summary, leaderboard, rules, recalculation
//! ```

pub mod api;
pub mod config;
pub mod contribution;
pub mod database;
pub mod error;

// Re-export main types for convenience
pub use config::ForumConfig;
pub use contribution::{
    ActionEvent, ActionKind, ActivityTotals, Award, BalanceChange, ContentAward,
    ContributionEngine, ContributionState, ContributionSummary, EngagementAward,
    LeaderboardEntry, LedgerStore, LedgerTx, PointRules, QualityFlags, Recalculation, RuleSet,
    Scope, StreakState, StreakTransition, Tier, TierTable, TierThreshold,
};
pub use database::{DatabasePool, MemoryLedger, MemoryLedgerTx, PgLedger, PgLedgerTx};
pub use error::{ContributionError, Result};
