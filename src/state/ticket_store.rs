use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Agent, BetLimits, ClaimAuditRecord, Draw, DrawStatus, NewDraw, NewTicket, NewWager,
    ReprintRecord, StatusChange, Ticket, TicketStatus, Wager,
};

/// Storage port consumed by the engine. Injected explicitly into every component.
///
/// Conditional writes (`insert_ticket`, `update_ticket_status`, `increment_reprint_count`,
/// `set_draw_result`) must be atomic with respect to their condition: they return
/// `None` (or an error for `insert_ticket`) instead of writing when the condition no
/// longer holds. A write and the history record it produces land together or not at all.
pub trait TicketStore: Send + Sync + 'static {
    fn find_ticket_by_number(
        &self,
        ticket_number: &str,
    ) -> impl Future<Output = Result<Option<Ticket>>> + Send;

    fn find_tickets_by_draw(&self, draw_id: i64) -> impl Future<Output = Result<Vec<Ticket>>> + Send;

    fn find_wagers_by_ticket(&self, ticket_id: i64) -> impl Future<Output = Result<Vec<Wager>>> + Send;

    fn find_draw_by_id(&self, draw_id: i64) -> impl Future<Output = Result<Option<Draw>>> + Send;

    fn find_agent(&self, agent_id: i64) -> impl Future<Output = Result<Option<Agent>>> + Send;

    fn upsert_agent(&self, agent: Agent) -> impl Future<Output = Result<()>> + Send;

    /// Inserts the ticket only while its draw is open, adding each wager's stake to
    /// the draw's per-number totals. Fails with `AppError::DuplicateTicketNumber` when
    /// the number is taken, `AppError::Validation` when the draw is not open or a
    /// number would go past its limit, and `AppError::NotFound` for an unknown draw.
    fn insert_ticket(
        &self,
        ticket: NewTicket,
        wagers: Vec<NewWager>,
        limits: BetLimits,
    ) -> impl Future<Output = Result<(Ticket, Vec<Wager>)>> + Send;

    /// Compare-and-swap on status that appends `audit` in the same atomic unit.
    /// `None`, with nothing written, if the ticket is no longer in `expected`.
    fn update_ticket_status(
        &self,
        ticket_id: i64,
        expected: TicketStatus,
        next: TicketStatus,
        change: StatusChange,
        audit: ClaimAuditRecord,
    ) -> impl Future<Output = Result<Option<Ticket>>> + Send;

    /// Single read-modify-write: increments only while the ticket is reprintable and
    /// below `max`, appending the matching `ReprintRecord` in the same atomic unit.
    /// `None` if either condition fails.
    fn increment_reprint_count(
        &self,
        ticket_id: i64,
        max: u8,
        reprinted_by: i64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Ticket>>> + Send;

    fn audit_records(&self, ticket_id: i64) -> impl Future<Output = Result<Vec<ClaimAuditRecord>>> + Send;

    fn reprint_records(&self, ticket_id: i64) -> impl Future<Output = Result<Vec<ReprintRecord>>> + Send;

    /// Fails with `AppError::Validation` if a draw already exists for the date and time.
    fn insert_draw(&self, draw: NewDraw) -> impl Future<Output = Result<Draw>> + Send;

    /// Sets the winning number and completes the draw. `None` if a different number
    /// is already recorded; setting the same number again succeeds. A draw that is
    /// still taking bets fails with `AppError::DrawConflict`.
    fn set_draw_result(
        &self,
        draw_id: i64,
        winning_number: &str,
    ) -> impl Future<Output = Result<Option<Draw>>> + Send;

    fn update_draw_status(&self, draw_id: i64, status: DrawStatus) -> impl Future<Output = Result<()>> + Send;
}
