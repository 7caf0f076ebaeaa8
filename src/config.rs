use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::contribution::{PointRules, RuleSet, Tier, TierTable, TierThreshold};

/// Configuration for the forum contribution service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Point rules, streak bonus and tier thresholds
    pub contribution: ContributionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
    /// Key required by admin recalculation endpoints (disabled when unset)
    pub admin_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory fallback)
    pub postgres_enabled: bool,
    /// Pool size
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Mask credentials before they reach the logs
    pub sanitize_logs: bool,
    /// Emit span open/close events for requests
    pub log_requests: bool,
}

/// Configuration for the contribution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionConfig {
    pub post_points: Decimal,
    pub solution_points: Decimal,
    pub comment_points: Decimal,
    pub upvote_points: Decimal,
    pub downvote_points: Decimal,
    pub bookmark_points: Decimal,
    pub view_points: Decimal,

    pub verified_multiplier: Decimal,
    pub approved_multiplier: Decimal,
    pub featured_multiplier: Decimal,

    pub streak_bonus_per_day: Decimal,
    pub streak_bonus_cap: Decimal,

    pub silver_threshold: i64,
    pub gold_threshold: i64,
    pub platinum_threshold: i64,
    pub diamond_threshold: i64,
}

impl Default for ContributionConfig {
    fn default() -> Self {
        let points = PointRules::default();
        Self {
            post_points: points.post,
            solution_points: points.solution,
            comment_points: points.comment,
            upvote_points: points.upvote,
            downvote_points: points.downvote,
            bookmark_points: points.bookmark,
            view_points: points.view,
            verified_multiplier: points.verified_multiplier,
            approved_multiplier: points.approved_multiplier,
            featured_multiplier: points.featured_multiplier,
            streak_bonus_per_day: points.streak_bonus_per_day,
            streak_bonus_cap: points.streak_bonus_cap,
            silver_threshold: 100,
            gold_threshold: 500,
            platinum_threshold: 1500,
            diamond_threshold: 5000,
        }
    }
}

impl ContributionConfig {
    pub fn point_rules(&self) -> PointRules {
        PointRules {
            post: self.post_points,
            solution: self.solution_points,
            comment: self.comment_points,
            upvote: self.upvote_points,
            downvote: self.downvote_points,
            bookmark: self.bookmark_points,
            view: self.view_points,
            verified_multiplier: self.verified_multiplier,
            approved_multiplier: self.approved_multiplier,
            featured_multiplier: self.featured_multiplier,
            streak_bonus_per_day: self.streak_bonus_per_day,
            streak_bonus_cap: self.streak_bonus_cap,
        }
    }

    pub fn tier_table(&self) -> Result<TierTable> {
        TierTable::new(vec![
            TierThreshold { tier: Tier::Bronze, min_points: 0 },
            TierThreshold { tier: Tier::Silver, min_points: self.silver_threshold },
            TierThreshold { tier: Tier::Gold, min_points: self.gold_threshold },
            TierThreshold { tier: Tier::Platinum, min_points: self.platinum_threshold },
            TierThreshold { tier: Tier::Diamond, min_points: self.diamond_threshold },
        ])
        .map_err(|e| anyhow::anyhow!("Invalid tier thresholds: {}", e))
    }

    /// Convert to the immutable RuleSet injected into the engine
    pub fn to_rules(&self) -> Result<RuleSet> {
        Ok(RuleSet {
            points: self.point_rules(),
            tiers: self.tier_table()?,
        })
    }

    fn validate(&self) -> Result<()> {
        let multipliers = [
            ("verified", self.verified_multiplier),
            ("approved", self.approved_multiplier),
            ("featured", self.featured_multiplier),
        ];
        for (name, value) in multipliers {
            if value < Decimal::ONE {
                return Err(anyhow::anyhow!(
                    "Multiplier for {} must be at least 1.0, got {}",
                    name,
                    value
                ));
            }
        }

        if self.streak_bonus_per_day.is_sign_negative() {
            return Err(anyhow::anyhow!("Streak bonus per day cannot be negative"));
        }

        if self.streak_bonus_cap < self.streak_bonus_per_day {
            return Err(anyhow::anyhow!(
                "Streak bonus cap ({}) must be at least the per-day bonus ({})",
                self.streak_bonus_cap,
                self.streak_bonus_per_day
            ));
        }

        self.tier_table()?;
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/forum".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                admin_api_key: None,
            },
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false,
            },
            contribution: ContributionConfig::default(),
        }
    }
}

/// Parse an optional environment variable into `target`
fn override_from_env<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(value) = env::var(name) {
        *target = value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", name))?;
    }
    Ok(())
}

impl ForumConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("FORUM_HOST") {
            config.server.host = host;
        }
        override_from_env("FORUM_PORT", &mut config.server.port)?;

        config.server.admin_api_key = env::var("FORUM_ADMIN_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        if config.server.admin_api_key.is_none() {
            warn!("FORUM_ADMIN_API_KEY not set, admin recalculation endpoints are disabled");
        }

        // Database configuration
        if let Ok(url) = env::var("FORUM_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        override_from_env("FORUM_POSTGRES_ENABLED", &mut config.database.postgres_enabled)?;
        override_from_env(
            "FORUM_POSTGRES_MAX_CONNECTIONS",
            &mut config.database.max_connections,
        )?;

        // Logging configuration
        if let Ok(level) = env::var("FORUM_LOG_LEVEL") {
            config.logging.level = level;
        }
        override_from_env("FORUM_SANITIZE_LOGS", &mut config.logging.sanitize_logs)?;
        override_from_env("FORUM_LOG_REQUESTS", &mut config.logging.log_requests)?;

        // Contribution rules
        let c = &mut config.contribution;
        override_from_env("FORUM_POINTS_POST", &mut c.post_points)?;
        override_from_env("FORUM_POINTS_SOLUTION", &mut c.solution_points)?;
        override_from_env("FORUM_POINTS_COMMENT", &mut c.comment_points)?;
        override_from_env("FORUM_POINTS_UPVOTE", &mut c.upvote_points)?;
        override_from_env("FORUM_POINTS_DOWNVOTE", &mut c.downvote_points)?;
        override_from_env("FORUM_POINTS_BOOKMARK", &mut c.bookmark_points)?;
        override_from_env("FORUM_POINTS_VIEW", &mut c.view_points)?;
        override_from_env("FORUM_MULTIPLIER_VERIFIED", &mut c.verified_multiplier)?;
        override_from_env("FORUM_MULTIPLIER_APPROVED", &mut c.approved_multiplier)?;
        override_from_env("FORUM_MULTIPLIER_FEATURED", &mut c.featured_multiplier)?;
        override_from_env("FORUM_STREAK_BONUS_PER_DAY", &mut c.streak_bonus_per_day)?;
        override_from_env("FORUM_STREAK_BONUS_CAP", &mut c.streak_bonus_cap)?;
        override_from_env("FORUM_TIER_SILVER", &mut c.silver_threshold)?;
        override_from_env("FORUM_TIER_GOLD", &mut c.gold_threshold)?;
        override_from_env("FORUM_TIER_PLATINUM", &mut c.platinum_threshold)?;
        override_from_env("FORUM_TIER_DIAMOND", &mut c.diamond_threshold)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.database.postgres_enabled {
            if self.database.postgres_url.is_empty() {
                return Err(anyhow::anyhow!(
                    "PostgreSQL is enabled but FORUM_POSTGRES_URL is empty"
                ));
            }
            if self.database.max_connections == 0 {
                return Err(anyhow::anyhow!("PostgreSQL pool needs at least one connection"));
            }
        }

        self.contribution
            .validate()
            .context("Invalid contribution rules")?;

        Ok(())
    }
}

/// Sanitize sensitive data for logging
pub fn sanitize_for_logging(data: &str) -> String {
    // Connection strings: hide the password in user:password@host
    if let Some((scheme, rest)) = data.split_once("://") {
        if let Some((credentials, host)) = rest.rsplit_once('@') {
            let user = credentials.split(':').next().unwrap_or_default();
            return format!("{}://{}:***@{}", scheme, user, host);
        }
        return data.to_string();
    }

    let sensitive_patterns = ["key", "token", "password", "secret", "credential"];

    let data_lower = data.to_lowercase();
    for pattern in &sensitive_patterns {
        if data_lower.contains(pattern) {
            let head: String = data.chars().take(2).collect();
            let tail: String = data
                .chars()
                .rev()
                .take(2)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return format!("{}***{}", head, tail);
        }
    }

    data.to_string()
}
