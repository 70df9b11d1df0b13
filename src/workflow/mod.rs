//! Ticket lifecycle operations: issuance, claims, approvals and reprints.

pub mod claim;
pub mod issuance;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::health::HealthState;
use crate::error::{AppError, Result};
use crate::state::TicketStore;
use crate::types::{AuditAction, ClaimAuditRecord, LotteryEvent, StatusChange, Ticket, TicketStatus};

pub use claim::{ClaimWorkflow, TicketDetails};
pub use issuance::{IssuedTicket, TicketIssuer};

// ---------------------------------------------------------------------------
// Event fan-out
// ---------------------------------------------------------------------------

/// Non-blocking sender for LotteryEvents. A full channel drops the event with a warning.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<LotteryEvent>,
    health: Arc<HealthState>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<LotteryEvent>, health: Arc<HealthState>) -> Self {
        Self { tx, health }
    }

    pub fn emit(&self, event: LotteryEvent) {
        self.health.inc_notifications_pending();
        if let Err(e) = self.tx.try_send(event) {
            self.health.dec_notifications_pending();
            warn!("Notification channel full: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Guarded transitions
// ---------------------------------------------------------------------------

pub(crate) struct AuditEntry {
    pub action: AuditAction,
    pub performed_by: i64,
    pub details: Option<String>,
}

pub(crate) enum Transition {
    /// This call moved the ticket; the audit record has been appended.
    Applied(Ticket),
    /// Another writer changed the ticket first. Holds the ticket as it is now.
    Lost(Ticket),
}

/// Compare-and-swap from `ticket.status` to `next`, written together with exactly one
/// audit record. Moves outside the transition table are rejected before storage is touched.
pub(crate) async fn guarded_transition<S: TicketStore>(
    store: &S,
    ticket: &Ticket,
    next: TicketStatus,
    change: StatusChange,
    action_label: &'static str,
    audit: AuditEntry,
) -> Result<Transition> {
    if !ticket.status.can_transition_to(next) {
        return Err(AppError::StateConflict {
            ticket_number: ticket.ticket_number.clone(),
            status: ticket.status,
            action: action_label,
        });
    }

    let record = ClaimAuditRecord {
        ticket_id: ticket.id,
        action: audit.action,
        performed_by: audit.performed_by,
        old_status: ticket.status,
        new_status: next,
        details: audit.details,
        timestamp: Utc::now(),
    };
    match store
        .update_ticket_status(ticket.id, ticket.status, next, change, record)
        .await?
    {
        Some(updated) => {
            debug!(
                ticket_number = %updated.ticket_number,
                from = %ticket.status,
                to = %next,
                "ticket transition applied"
            );
            Ok(Transition::Applied(updated))
        }
        None => {
            let current = store
                .find_ticket_by_number(&ticket.ticket_number)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("ticket {}", ticket.ticket_number)))?;
            Ok(Transition::Lost(current))
        }
    }
}

pub(crate) async fn load_ticket<S: TicketStore>(store: &S, ticket_number: &str) -> Result<Ticket> {
    store
        .find_ticket_by_number(ticket_number)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ticket {ticket_number}")))
}
