//! Database row types matching `migrations/0001_init.sql`.
//! Timestamps are stored as epoch milliseconds and converted at the edge.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::types::{
    Agent, ClaimAuditRecord, Draw, ReprintRecord, Ticket, Wager,
};

pub const TICKET_COLUMNS: &str = "id, ticket_number, status, total_amount, reprint_count, \
     draw_id, agent_id, claimer_name, claimer_phone, claimer_address, prize_amount, \
     issued_at, claimed_at, approval_requested_at, approved_at, approved_by";

pub const DRAW_COLUMNS: &str = "id, draw_date, draw_time, winning_number, status";

pub fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Validation(format!("timestamp {ms} out of range")))
}

fn from_opt_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

#[derive(Debug, sqlx::FromRow)]
pub struct TicketRow {
    pub id: i64,
    pub ticket_number: String,
    pub status: String,
    pub total_amount: f64,
    pub reprint_count: i64,
    pub draw_id: i64,
    pub agent_id: i64,
    pub claimer_name: Option<String>,
    pub claimer_phone: Option<String>,
    pub claimer_address: Option<String>,
    pub prize_amount: Option<f64>,
    pub issued_at: i64,
    pub claimed_at: Option<i64>,
    pub approval_requested_at: Option<i64>,
    pub approved_at: Option<i64>,
    pub approved_by: Option<i64>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = AppError;

    fn try_from(r: TicketRow) -> Result<Self> {
        Ok(Ticket {
            id: r.id,
            status: r.status.parse()?,
            reprint_count: u8::try_from(r.reprint_count).map_err(|_| {
                AppError::Validation(format!(
                    "ticket {} has invalid reprint_count {}",
                    r.ticket_number, r.reprint_count
                ))
            })?,
            ticket_number: r.ticket_number,
            total_amount: r.total_amount,
            draw_id: r.draw_id,
            agent_id: r.agent_id,
            claimer_name: r.claimer_name,
            claimer_phone: r.claimer_phone,
            claimer_address: r.claimer_address,
            prize_amount: r.prize_amount,
            issued_at: from_millis(r.issued_at)?,
            claimed_at: from_opt_millis(r.claimed_at)?,
            approval_requested_at: from_opt_millis(r.approval_requested_at)?,
            approved_at: from_opt_millis(r.approved_at)?,
            approved_by: r.approved_by,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct WagerRow {
    pub id: i64,
    pub ticket_id: i64,
    pub bet_type: String,
    pub bet_combination: String,
    pub bet_amount: f64,
}

impl TryFrom<WagerRow> for Wager {
    type Error = AppError;

    fn try_from(r: WagerRow) -> Result<Self> {
        Ok(Wager {
            id: r.id,
            ticket_id: r.ticket_id,
            bet_type: r.bet_type.parse()?,
            combination: r.bet_combination,
            amount: r.bet_amount,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DrawRow {
    pub id: i64,
    pub draw_date: String,
    pub draw_time: String,
    pub winning_number: Option<String>,
    pub status: String,
}

impl TryFrom<DrawRow> for Draw {
    type Error = AppError;

    fn try_from(r: DrawRow) -> Result<Self> {
        Ok(Draw {
            id: r.id,
            draw_date: NaiveDate::parse_from_str(&r.draw_date, "%Y-%m-%d").map_err(|e| {
                AppError::Validation(format!("draw {} has invalid date: {e}", r.id))
            })?,
            draw_time: r.draw_time.parse()?,
            winning_number: r.winning_number,
            status: r.status.parse()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AgentRow {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<AgentRow> for Agent {
    fn from(r: AgentRow) -> Self {
        Agent {
            id: r.id,
            username: r.username,
            full_name: r.full_name,
            phone: r.phone,
            address: r.address,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AuditRow {
    pub ticket_id: i64,
    pub action: String,
    pub performed_by: i64,
    pub old_status: String,
    pub new_status: String,
    pub details: Option<String>,
    pub created_at: i64,
}

impl TryFrom<AuditRow> for ClaimAuditRecord {
    type Error = AppError;

    fn try_from(r: AuditRow) -> Result<Self> {
        Ok(ClaimAuditRecord {
            ticket_id: r.ticket_id,
            action: r.action.parse()?,
            performed_by: r.performed_by,
            old_status: r.old_status.parse()?,
            new_status: r.new_status.parse()?,
            details: r.details,
            timestamp: from_millis(r.created_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ReprintRow {
    pub ticket_id: i64,
    pub reprinted_by: i64,
    pub reprint_number: i64,
    pub created_at: i64,
}

impl TryFrom<ReprintRow> for ReprintRecord {
    type Error = AppError;

    fn try_from(r: ReprintRow) -> Result<Self> {
        Ok(ReprintRecord {
            ticket_id: r.ticket_id,
            reprinted_by: r.reprinted_by,
            reprint_number: u8::try_from(r.reprint_number).map_err(|_| {
                AppError::Validation(format!("invalid reprint_number {}", r.reprint_number))
            })?,
            timestamp: from_millis(r.created_at)?,
        })
    }
}
