use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use forum_contributions::{
    api::{create_contribution_router, ContributionApiState},
    config::{sanitize_for_logging, ForumConfig},
    ContributionEngine, DatabasePool, LedgerStore, MemoryLedger, RuleSet,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates the rule tables
    let config = ForumConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check FORUM_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting forum contribution service");

    let rules = config.contribution.to_rules()?;
    info!(
        post = %rules.points.post,
        solution = %rules.points.solution,
        streak_cap = %rules.points.streak_bonus_cap,
        "Contribution rules loaded"
    );

    if config.database.postgres_enabled {
        let url = if config.logging.sanitize_logs {
            sanitize_for_logging(&config.database.postgres_url)
        } else {
            config.database.postgres_url.clone()
        };
        info!("Connecting to PostgreSQL at {}", url);

        let db = DatabasePool::new(&config.database).await?;
        db.init_schema().await?;
        let ledger = Arc::new(db.contributions().clone());
        serve(&config, ledger, rules).await
    } else {
        warn!("PostgreSQL disabled - using in-memory ledger, balances will not survive a restart");
        serve(&config, Arc::new(MemoryLedger::new()), rules).await
    }
}

async fn serve<S: LedgerStore>(config: &ForumConfig, store: Arc<S>, rules: RuleSet) -> Result<()> {
    let engine = Arc::new(ContributionEngine::new(store, rules));

    let app = Router::new()
        .nest(
            "/contributions",
            create_contribution_router(ContributionApiState {
                engine,
                admin_api_key: config.server.admin_api_key.clone(),
            }),
        )
        // Health check
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Contribution service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &ForumConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
