use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use banlink::{
    api::{create_federation_router, create_node_router, create_risk_router, ApiState},
    config::BanlinkConfig,
    database::pool::DatabasePool,
    federation::{EventStore, PropagationCoordinator, RateLimiter, TrustLedger},
    outbound::{WebhookEnforcer, WebhookNotifier},
    risk::RiskMonitor,
};

/// Interval between join-window and rate-window sweeps
const SWEEP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> Result<()> {
    let config = BanlinkConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;

    init_logging(&config)?;

    info!("Starting banlink federation server");

    // Optional Postgres mirror
    let db = if config.database.postgres_enabled {
        let pool = DatabasePool::new(&config.database.postgres_url)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to connect to PostgreSQL")?;
        pool.init_schema()
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to initialize database schema")?;
        Some(Arc::new(pool))
    } else {
        warn!("PostgreSQL disabled, running fully in-memory");
        None
    };

    let notify_timeout = Duration::from_secs(config.outbound.notify_timeout_secs);
    let notifier = Arc::new(
        WebhookNotifier::new(notify_timeout).context("Failed to create webhook notifier")?,
    );
    let enforcer = Arc::new(
        WebhookEnforcer::new(config.outbound.enforce_endpoint.clone(), notify_timeout)
            .context("Failed to create webhook enforcer")?,
    );

    let mut ledger =
        TrustLedger::new().with_default_threshold(config.federation.default_risk_threshold);
    let mut events = EventStore::new();
    if let Some(db) = &db {
        ledger = ledger.with_database(db.clone());
        events = events.with_database(db.clone());
    }
    let ledger = Arc::new(ledger);
    let events = Arc::new(events);

    ledger.hydrate().await?;
    events.hydrate().await?;

    let coordinator = Arc::new(
        PropagationCoordinator::new(
            ledger.clone(),
            events.clone(),
            RateLimiter::new(config.rate_limiter_config()),
            notifier.clone(),
            enforcer.clone(),
            notify_timeout,
        )
        .with_dedup_window(chrono::Duration::seconds(
            config.federation.dedup_window_secs,
        )),
    );

    let mut monitor = RiskMonitor::new(ledger.clone(), notifier, enforcer, notify_timeout);
    if let Some(db) = &db {
        monitor = monitor.with_database(db.clone());
    }
    let monitor = Arc::new(monitor);
    monitor.hydrate().await?;

    info!(
        "Federation initialized: rate limit {}/{}s, dedup window {}s, default threshold {}",
        config.federation.rate_limit_max_events,
        config.federation.rate_limit_window_secs,
        config.federation.dedup_window_secs,
        config.federation.default_risk_threshold,
    );

    // Background window maintenance
    {
        let coordinator = coordinator.clone();
        let monitor = monitor.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                coordinator.sweep_rate_windows();
                monitor.sweep_join_windows();
            }
        });
    }

    let state = ApiState {
        coordinator,
        monitor: monitor.clone(),
    };

    let app = Router::new()
        .merge(create_federation_router(state.clone()))
        .merge(create_risk_router(state.clone()))
        .nest("/nodes", create_node_router(state))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Banlink server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &BanlinkConfig) -> Result<()> {
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
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
