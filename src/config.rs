use crate::error::{AppError, Result};
use crate::types::BetLimits;
use crate::win::PrizeTable;

pub const QR_PRIMARY_URL: &str = "https://quickchart.io/qr";
pub const QR_FALLBACK_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Hard cap on reprints per ticket.
pub const MAX_REPRINTS: u8 = 2;

/// Ticket numbers are exactly this many ASCII digits.
pub const TICKET_NUMBER_LEN: usize = 17;

/// Hex characters of the SHA-256 digest kept in the QR payload.
pub const INTEGRITY_HASH_LEN: usize = 16;

/// Separates the ticket number from the integrity hash in a QR payload.
pub const QR_SEPARATOR: char = '|';

/// Attempts at producing a usable, unique ticket number before issuance gives up.
pub const TICKET_NUMBER_ATTEMPTS: usize = 8;

/// Channel capacity for settlement/claim events.
pub const CHANNEL_CAPACITY: usize = 1024;

/// How often the QR renderer selector re-checks the primary renderer (seconds).
pub const QR_HEALTH_CHECK_INTERVAL_SECS: u64 = 60;

/// Betting closes this many minutes before the scheduled draw time.
pub const DRAW_CUTOFF_MINUTES: i64 = 5;

/// Draw times are wall-clock Asia/Manila (UTC+8, no DST).
pub const DRAW_UTC_OFFSET_HOURS: i32 = 8;

/// Default prize table, expressed per unit of stake.
pub mod prize_defaults {
    pub const STRAIGHT: f64 = 450.0;
    pub const RAMBOLITO_DOUBLE: f64 = 150.0;
    pub const RAMBOLITO_DISTINCT: f64 = 75.0;
    pub const MIN_STAKE: f64 = 1.0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Storage adapter (STORE_BACKEND=sqlite|memory)
    pub store_backend: StoreBackend,
    pub prizes: PrizeTable,
    /// Per-number stake cap per draw (BET_LIMIT_STANDARD / BET_LIMIT_RAMBOLITO); unset means unlimited
    pub bet_limits: BetLimits,
    /// Claim requests allowed per actor per window (CLAIM_RATE_LIMIT_MAX)
    pub claim_rate_limit_max: u32,
    pub claim_rate_limit_window_secs: u64,
    /// Reprint requests allowed per actor per window (REPRINT_RATE_LIMIT_MAX)
    pub reprint_rate_limit_max: u32,
    pub reprint_rate_limit_window_secs: u64,
    /// Tickets evaluated concurrently during draw settlement (SETTLEMENT_CONCURRENCY)
    pub settlement_concurrency: usize,
    pub qr_primary_url: String,
    pub qr_fallback_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let store_backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "sqlite" => StoreBackend::Sqlite,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Config(format!(
                    "STORE_BACKEND must be 'sqlite' or 'memory', got '{other}'"
                )))
            }
        };

        let prizes = PrizeTable {
            straight: env_f64("PRIZE_STRAIGHT", prize_defaults::STRAIGHT),
            rambolito_double: env_f64("PRIZE_RAMBOLITO_DOUBLE", prize_defaults::RAMBOLITO_DOUBLE),
            rambolito_distinct: env_f64(
                "PRIZE_RAMBOLITO_DISTINCT",
                prize_defaults::RAMBOLITO_DISTINCT,
            ),
            min_stake: env_f64("MIN_STAKE", prize_defaults::MIN_STAKE),
        };

        let bet_limits = BetLimits {
            standard: env_limit("BET_LIMIT_STANDARD")?,
            rambolito: env_limit("BET_LIMIT_RAMBOLITO")?,
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "settlement.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            store_backend,
            prizes,
            bet_limits,
            claim_rate_limit_max: std::env::var("CLAIM_RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<u32>()
                .unwrap_or(10),
            claim_rate_limit_window_secs: std::env::var("CLAIM_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60),
            reprint_rate_limit_max: std::env::var("REPRINT_RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<u32>()
                .unwrap_or(5),
            reprint_rate_limit_window_secs: std::env::var("REPRINT_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60),
            settlement_concurrency: std::env::var("SETTLEMENT_CONCURRENCY")
                .unwrap_or_else(|_| "16".to_string())
                .parse::<usize>()
                .unwrap_or(16)
                .max(1),
            qr_primary_url: std::env::var("QR_PRIMARY_URL")
                .unwrap_or_else(|_| QR_PRIMARY_URL.to_string()),
            qr_fallback_url: std::env::var("QR_FALLBACK_URL")
                .unwrap_or_else(|_| QR_FALLBACK_URL.to_string()),
        })
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}

fn env_limit(key: &str) -> Result<Option<f64>> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(Some(v)),
        _ => Err(AppError::Config(format!(
            "{key} must be a positive amount, got '{raw}'"
        ))),
    }
}
