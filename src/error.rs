use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use crate::types::TicketStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("State conflict on ticket {ticket_number}: cannot {action} from status {status}")]
    StateConflict {
        ticket_number: String,
        status: TicketStatus,
        action: &'static str,
    },

    #[error("Draw {draw_id}: {message}")]
    DrawConflict { draw_id: i64, message: String },

    #[error("Ticket {ticket_number} has reached the reprint limit ({limit}/{limit})")]
    ReprintLimitExceeded { ticket_number: String, limit: u8 },

    #[error("Ticket {ticket_number} cannot be reprinted in status {status}")]
    NotReprintable {
        ticket_number: String,
        status: TicketStatus,
    },

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Ticket {ticket_number} has already been claimed (status {status})")]
    AlreadyClaimed {
        ticket_number: String,
        status: TicketStatus,
    },

    #[error("Ticket {0} is not a winning ticket")]
    NotWinning(String),

    /// Storage rejected a ticket number that already exists. Callers retry with a fresh number.
    #[error("Ticket number {0} already exists")]
    DuplicateTicketNumber(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Stable discriminant exposed to callers and recorded in settlement reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Authorization(_) => "authorization_error",
            AppError::StateConflict { .. } => "state_conflict",
            AppError::DrawConflict { .. } => "draw_conflict",
            AppError::ReprintLimitExceeded { .. } => "reprint_limit_exceeded",
            AppError::NotReprintable { .. } => "not_reprintable",
            AppError::Integrity(_) => "integrity_error",
            AppError::AlreadyClaimed { .. } => "already_claimed",
            AppError::NotWinning(_) => "not_winning",
            AppError::DuplicateTicketNumber(_) => "duplicate_ticket_number",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Http(_) => "upstream_error",
            AppError::Json(_) => "json_error",
            AppError::Database(_) | AppError::Migration(_) => "storage_error",
            AppError::Config(_) => "config_error",
            AppError::Io(_) => "io_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::StateConflict { .. }
            | AppError::DrawConflict { .. }
            | AppError::AlreadyClaimed { .. }
            | AppError::DuplicateTicketNumber(_) => StatusCode::CONFLICT,
            AppError::ReprintLimitExceeded { .. }
            | AppError::NotReprintable { .. }
            | AppError::NotWinning(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Integrity(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Migration(_)
            | AppError::Config(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "success": false,
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let AppError::RateLimited { retry_after_secs } = &self {
            body["retry_after_secs"] = serde_json::json!(retry_after_secs);
        }
        (status, Json(body)).into_response()
    }
}
