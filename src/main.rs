mod api;
mod config;
mod db;
mod error;
mod identity;
mod qr;
mod ratelimit;
mod settlement;
mod state;
mod types;
mod win;
mod workflow;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, StoreBackend, CHANNEL_CAPACITY};
use crate::db::{NotificationWriter, SqliteStore};
use crate::error::Result;
use crate::qr::{QrRendererSelector, QrServerRenderer, QuickChartRenderer};
use crate::ratelimit::{
    MemoryRateLimitStore, RateLimitPolicy, RateLimitStore, RateLimiter, SqliteRateLimitStore,
};
use crate::settlement::DrawSettler;
use crate::state::{MemoryStore, TicketStore};
use crate::win::PrizeCalculator;
use crate::workflow::{ClaimWorkflow, EventSink, TicketIssuer};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    match cfg.store_backend {
        StoreBackend::Sqlite => {
            // --- Database setup ---
            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database ready at {}", cfg.db_path);

            let store = SqliteStore::new(pool.clone());
            let limits = SqliteRateLimitStore::new(pool.clone());
            serve(cfg, store, limits, Some(pool)).await
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; nothing survives a restart");
            serve(cfg, MemoryStore::new(), MemoryRateLimitStore::new(), None).await
        }
    }
}

async fn serve<S: TicketStore, R: RateLimitStore>(
    cfg: Config,
    store: Arc<S>,
    limits: Arc<R>,
    pool: Option<sqlx::SqlitePool>,
) -> Result<()> {
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new()?);
    let prizes = PrizeCalculator::new(cfg.prizes);

    // --- Notifications ---
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let events = EventSink::new(event_tx, Arc::clone(&health));
    let writer = NotificationWriter::new(pool, event_rx, Arc::clone(&health));
    tokio::spawn(async move { writer.run().await });

    // --- QR renderer selection (checked every QR_HEALTH_CHECK_INTERVAL_SECS) ---
    let qr = Arc::new(QrRendererSelector::new(
        Box::new(QuickChartRenderer::new(&cfg.qr_primary_url)?),
        Box::new(QrServerRenderer::new(&cfg.qr_fallback_url)?),
        Arc::clone(&health),
    )?);
    tokio::spawn(Arc::clone(&qr).run());

    // --- Core services ---
    let claim_limiter = RateLimiter::new(
        Arc::clone(&limits),
        RateLimitPolicy {
            name: "claim",
            max: cfg.claim_rate_limit_max,
            window: Duration::from_secs(cfg.claim_rate_limit_window_secs),
        },
    );
    let reprint_limiter = RateLimiter::new(
        limits,
        RateLimitPolicy {
            name: "reprint",
            max: cfg.reprint_rate_limit_max,
            window: Duration::from_secs(cfg.reprint_rate_limit_window_secs),
        },
    );
    let state = ApiState {
        claims: ClaimWorkflow::new(Arc::clone(&store), prizes, events.clone()),
        issuer: TicketIssuer::new(Arc::clone(&store), prizes, cfg.bet_limits),
        settler: DrawSettler::new(
            Arc::clone(&store),
            prizes,
            events,
            Arc::clone(&latency),
            Arc::clone(&health),
            cfg.settlement_concurrency,
        ),
        store,
        claim_limiter,
        reprint_limiter,
        qr,
        health,
        latency,
    };

    // HTTP API server
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        "HTTP API listening on {bind_addr} (straight {}, rambolito double {}, distinct {})",
        cfg.prizes.straight, cfg.prizes.rambolito_double, cfg.prizes.rambolito_distinct,
    );

    axum::serve(listener, app).await?;

    Ok(())
}
