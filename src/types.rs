use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DRAW_CUTOFF_MINUTES, DRAW_UTC_OFFSET_HOURS};
use crate::error::AppError;

// ---------------------------------------------------------------------------
// Wagers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetType {
    /// Exact, order-sensitive match.
    Standard,
    /// Any permutation of the combination's digits.
    Rambolito,
}

impl std::fmt::Display for BetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BetType::Standard => "standard",
            BetType::Rambolito => "rambolito",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for BetType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(BetType::Standard),
            "rambolito" => Ok(BetType::Rambolito),
            other => Err(AppError::Validation(format!("unknown bet type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WinCategory {
    /// Standard wager, exact match.
    Straight,
    /// Rambolito on three distinct digits (6 winning permutations).
    RambolitoDistinct,
    /// Rambolito on a combination with one repeated digit (3 winning permutations).
    RambolitoDouble,
    None,
}

impl WinCategory {
    pub fn is_win(self) -> bool {
        self != WinCategory::None
    }
}

impl std::fmt::Display for WinCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WinCategory::Straight => "straight",
            WinCategory::RambolitoDistinct => "rambolito-distinct",
            WinCategory::RambolitoDouble => "rambolito-double",
            WinCategory::None => "none",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: i64,
    pub ticket_id: i64,
    pub bet_type: BetType,
    /// Exactly three ASCII digits.
    pub combination: String,
    pub amount: f64,
}

/// Wager as submitted at issuance, before it belongs to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWager {
    pub bet_type: BetType,
    pub combination: String,
    pub amount: f64,
}

/// Per-draw cap on the total stake sold for one combination under one bet type.
/// `None` leaves that bet type uncapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BetLimits {
    pub standard: Option<f64>,
    pub rambolito: Option<f64>,
}

impl BetLimits {
    pub fn cap(&self, bet_type: BetType) -> Option<f64> {
        match bet_type {
            BetType::Standard => self.standard,
            BetType::Rambolito => self.rambolito,
        }
    }

    pub(crate) fn sold_out(
        draw_id: i64,
        bet_type: BetType,
        combination: &str,
        cap: f64,
    ) -> AppError {
        AppError::Validation(format!(
            "number {combination} is sold out for {bet_type} betting in draw {draw_id} (limit {cap})"
        ))
    }
}

// ---------------------------------------------------------------------------
// Ticket status state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    Validated,
    PendingApproval,
    Paid,
    Cancelled,
    Expired,
}

impl TicketStatus {
    /// Every move the state machine permits. Anything else is a conflict.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Issued, Validated)
                | (Issued, Expired)
                | (Validated, PendingApproval)
                | (PendingApproval, Paid)
                | (PendingApproval, Cancelled)
        )
    }

    pub fn is_reprintable(self) -> bool {
        matches!(self, TicketStatus::Issued | TicketStatus::Validated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Issued => "issued",
            TicketStatus::Validated => "validated",
            TicketStatus::PendingApproval => "pending_approval",
            TicketStatus::Paid => "paid",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(TicketStatus::Issued),
            "validated" => Ok(TicketStatus::Validated),
            "pending_approval" => Ok(TicketStatus::PendingApproval),
            "paid" => Ok(TicketStatus::Paid),
            "cancelled" => Ok(TicketStatus::Cancelled),
            "expired" => Ok(TicketStatus::Expired),
            other => Err(AppError::Validation(format!("unknown ticket status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    /// 17-digit numeric string, unique across all tickets.
    pub ticket_number: String,
    pub status: TicketStatus,
    pub total_amount: f64,
    pub reprint_count: u8,
    pub draw_id: i64,
    /// Issuing (owning) agent.
    pub agent_id: i64,
    pub claimer_name: Option<String>,
    pub claimer_phone: Option<String>,
    pub claimer_address: Option<String>,
    pub prize_amount: Option<f64>,
    pub issued_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub approval_requested_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
}

impl Ticket {
    /// Writes `next` and every field `change` sets; unset fields keep their value.
    pub fn apply_status_change(&mut self, next: TicketStatus, change: &StatusChange) {
        self.status = next;
        let StatusChange {
            claimer_name,
            claimer_phone,
            claimer_address,
            prize_amount,
            claimed_at,
            approval_requested_at,
            approved_at,
            approved_by,
        } = change.clone();
        self.claimer_name = claimer_name.or(self.claimer_name.take());
        self.claimer_phone = claimer_phone.or(self.claimer_phone.take());
        self.claimer_address = claimer_address.or(self.claimer_address.take());
        self.prize_amount = prize_amount.or(self.prize_amount);
        self.claimed_at = claimed_at.or(self.claimed_at);
        self.approval_requested_at = approval_requested_at.or(self.approval_requested_at);
        self.approved_at = approved_at.or(self.approved_at);
        self.approved_by = approved_by.or(self.approved_by);
    }
}

/// Ticket fields fixed at issuance; storage assigns the id.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_number: String,
    pub total_amount: f64,
    pub draw_id: i64,
    pub agent_id: i64,
    pub issued_at: DateTime<Utc>,
}

/// Everything a guarded status transition writes alongside the new status.
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub claimer_name: Option<String>,
    pub claimer_phone: Option<String>,
    pub claimer_address: Option<String>,
    pub prize_amount: Option<f64>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub approval_requested_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
}

// ---------------------------------------------------------------------------
// Draws
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrawTime {
    #[serde(rename = "twoPM")]
    TwoPm,
    #[serde(rename = "fivePM")]
    FivePm,
    #[serde(rename = "ninePM")]
    NinePm,
}

impl DrawTime {
    pub fn hour(self) -> u32 {
        match self {
            DrawTime::TwoPm => 14,
            DrawTime::FivePm => 17,
            DrawTime::NinePm => 21,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DrawTime::TwoPm => "twoPM",
            DrawTime::FivePm => "fivePM",
            DrawTime::NinePm => "ninePM",
        }
    }
}

impl std::fmt::Display for DrawTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DrawTime {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twoPM" => Ok(DrawTime::TwoPm),
            "fivePM" => Ok(DrawTime::FivePm),
            "ninePM" => Ok(DrawTime::NinePm),
            other => Err(AppError::Validation(format!("unknown draw time '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawStatus {
    Pending,
    Open,
    Closed,
    Completed,
}

impl DrawStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawStatus::Pending => "pending",
            DrawStatus::Open => "open",
            DrawStatus::Closed => "closed",
            DrawStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DrawStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DrawStatus::Pending),
            "open" => Ok(DrawStatus::Open),
            "closed" => Ok(DrawStatus::Closed),
            "completed" => Ok(DrawStatus::Completed),
            other => Err(AppError::Validation(format!("unknown draw status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    pub id: i64,
    pub draw_date: NaiveDate,
    pub draw_time: DrawTime,
    pub winning_number: Option<String>,
    pub status: DrawStatus,
}

impl Draw {
    /// Betting cutoff: a few minutes before the scheduled Manila wall-clock time.
    pub fn cutoff_at(&self) -> DateTime<Utc> {
        let local = self
            .draw_date
            .and_time(NaiveTime::from_hms_opt(self.draw_time.hour(), 0, 0).unwrap_or_default());
        let scheduled = Utc.from_utc_datetime(&local) - Duration::hours(DRAW_UTC_OFFSET_HOURS as i64);
        scheduled - Duration::minutes(DRAW_CUTOFF_MINUTES)
    }
}

#[derive(Debug, Clone)]
pub struct NewDraw {
    pub draw_date: NaiveDate,
    pub draw_time: DrawTime,
    pub status: DrawStatus,
}

// ---------------------------------------------------------------------------
// Actors and roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operator,
    Agent,
    Coordinator,
    AreaCoordinator,
    Admin,
    #[serde(rename = "superadmin")]
    SuperAdmin,
}

impl Role {
    /// Approve or reject claims.
    pub fn can_review_claims(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    /// Act on tickets issued by other agents.
    pub fn supervises_tickets(self) -> bool {
        self >= Role::AreaCoordinator
    }

    /// Open draws and record results.
    pub fn can_manage_draws(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Operator => "operator",
            Role::Agent => "agent",
            Role::Coordinator => "coordinator",
            Role::AreaCoordinator => "area_coordinator",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operator" => Ok(Role::Operator),
            "agent" => Ok(Role::Agent),
            "coordinator" => Ok(Role::Coordinator),
            "area_coordinator" => Ok(Role::AreaCoordinator),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::SuperAdmin),
            other => Err(AppError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// The already-authenticated caller of a core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    /// Owners act on their own tickets; supervising roles act on anyone's.
    pub fn may_act_on(&self, ticket: &Ticket) -> bool {
        ticket.agent_id == self.id || self.role.supervises_tickets()
    }
}

/// Agent profile consulted to derive claimer identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TicketValidated,
    TicketExpired,
    ClaimRequested,
    ClaimApproved,
    ClaimRejected,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::TicketValidated => "ticket_validated",
            AuditAction::TicketExpired => "ticket_expired",
            AuditAction::ClaimRequested => "claim_requested",
            AuditAction::ClaimApproved => "claim_approved",
            AuditAction::ClaimRejected => "claim_rejected",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket_validated" => Ok(AuditAction::TicketValidated),
            "ticket_expired" => Ok(AuditAction::TicketExpired),
            "claim_requested" => Ok(AuditAction::ClaimRequested),
            "claim_approved" => Ok(AuditAction::ClaimApproved),
            "claim_rejected" => Ok(AuditAction::ClaimRejected),
            other => Err(AppError::Validation(format!("unknown audit action '{other}'"))),
        }
    }
}

/// Append-only; exactly one per applied status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimAuditRecord {
    pub ticket_id: i64,
    pub action: AuditAction,
    /// Actor id; 0 for system-driven transitions such as settlement.
    pub performed_by: i64,
    pub old_status: TicketStatus,
    pub new_status: TicketStatus,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReprintRecord {
    pub ticket_id: i64,
    pub reprinted_by: i64,
    /// 1 or 2.
    pub reprint_number: u8,
    pub timestamp: DateTime<Utc>,
}

/// Actor id recorded for transitions the engine performs on its own.
pub const SYSTEM_ACTOR_ID: i64 = 0;

// ---------------------------------------------------------------------------
// Events: sent over mpsc to printing/notification consumers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LotteryEvent {
    TicketSettled {
        ticket_number: String,
        agent_id: i64,
        draw_id: i64,
        winning_number: String,
        expected_payout: f64,
        settled_at: DateTime<Utc>,
    },
    ClaimApproved {
        ticket_number: String,
        agent_id: i64,
        approved_by: i64,
        prize_amount: f64,
        approved_at: DateTime<Utc>,
    },
}
