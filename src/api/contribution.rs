//! Contribution API Endpoints
//!
//! Dashboard reads and admin recalculation on top of the contribution engine.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::contribution::{
    ContributionEngine, ContributionSummary, LeaderboardEntry, LedgerStore, PointRules,
    Recalculation, Scope, TierThreshold,
};
use crate::error::ContributionError;

/// API state for contribution endpoints
pub struct ContributionApiState<S: LedgerStore> {
    pub engine: Arc<ContributionEngine<S>>,
    pub admin_api_key: Option<String>,
}

impl<S: LedgerStore> Clone for ContributionApiState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            admin_api_key: self.admin_api_key.clone(),
        }
    }
}

// Response types

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub points: PointRules,
    pub tiers: Vec<TierThreshold>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub total: usize,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct RecalculationResponse {
    pub user_id: i64,
    #[serde(flatten)]
    pub recalculation: Recalculation,
    pub drift: i64,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

/// Map engine errors onto HTTP statuses
pub fn error_status(err: &ContributionError) -> StatusCode {
    match err {
        ContributionError::UserNotFound(_) => StatusCode::NOT_FOUND,
        ContributionError::InvalidActionKind(_) => StatusCode::BAD_REQUEST,
        ContributionError::TransactionAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn into_response_error(err: ContributionError) -> (StatusCode, String) {
    let status = error_status(&err);
    if status.is_server_error() {
        warn!(error = %err, "Contribution request failed");
    }
    (status, err.to_string())
}

/// Check the `x-admin-key` header against the configured admin key
fn authorize_admin(configured: Option<&str>, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let Some(admin_key) = configured else {
        return Err((StatusCode::FORBIDDEN, "Admin API key not configured".to_string()));
    };

    let presented = headers.get("x-admin-key").and_then(|v| v.to_str().ok());
    if presented != Some(admin_key) {
        return Err((StatusCode::FORBIDDEN, "Invalid admin API key".to_string()));
    }

    Ok(())
}

// Endpoints

/// GET /contributions/{user_id} - Get a user's contribution summary
pub async fn get_summary<S: LedgerStore>(
    State(state): State<ContributionApiState<S>>,
    Path(user_id): Path<i64>,
) -> Result<Json<ContributionSummary>, (StatusCode, String)> {
    state
        .engine
        .contribution_summary(Scope::Owned, user_id)
        .await
        .map(Json)
        .map_err(into_response_error)
}

/// GET /contributions/leaderboard - Top contributors
pub async fn get_leaderboard<S: LedgerStore>(
    State(state): State<ContributionApiState<S>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, (StatusCode, String)> {
    let entries = state
        .engine
        .leaderboard(query.limit.unwrap_or(10))
        .await
        .map_err(into_response_error)?;

    Ok(Json(LeaderboardResponse {
        total: entries.len(),
        entries,
    }))
}

/// GET /contributions/rules - Active point rules and tier thresholds
pub async fn get_rules<S: LedgerStore>(
    State(state): State<ContributionApiState<S>>,
) -> Json<RulesResponse> {
    let rules = state.engine.rules();
    Json(RulesResponse {
        points: rules.points.clone(),
        tiers: rules.tiers.thresholds().to_vec(),
    })
}

/// POST /contributions/{user_id}/recalculate - Rebuild a balance (admin only)
pub async fn recalculate<S: LedgerStore>(
    State(state): State<ContributionApiState<S>>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<RecalculationResponse>, (StatusCode, String)> {
    authorize_admin(state.admin_api_key.as_deref(), &headers)?;

    let recalculation = state
        .engine
        .recalculate_from_scratch(Scope::Owned, user_id)
        .await
        .map_err(into_response_error)?;

    info!(
        user_id = user_id,
        balance = recalculation.balance,
        drift = recalculation.drift(),
        "Admin recalculation completed"
    );

    Ok(Json(RecalculationResponse {
        user_id,
        drift: recalculation.drift(),
        recalculation,
    }))
}

/// Create the contribution API router
pub fn create_contribution_router<S: LedgerStore>(state: ContributionApiState<S>) -> Router {
    Router::new()
        .route("/leaderboard", get(get_leaderboard::<S>))
        .route("/rules", get(get_rules::<S>))
        .route("/{user_id}", get(get_summary::<S>))
        .route("/{user_id}/recalculate", post(recalculate::<S>))
        .with_state(state)
}
