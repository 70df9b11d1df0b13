use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::db::models::to_millis;
use crate::error::Result;
use crate::types::LotteryEvent;

/// A notification row destined for the owning agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub agent_id: i64,
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub ticket_number: String,
    pub created_at: i64,
}

impl Notification {
    pub fn from_event(event: &LotteryEvent) -> Self {
        match event {
            LotteryEvent::TicketSettled {
                ticket_number,
                agent_id,
                winning_number,
                expected_payout,
                settled_at,
                ..
            } => Self {
                agent_id: *agent_id,
                kind: "ticket_settled",
                title: "Winning ticket".to_string(),
                message: format!(
                    "Ticket {ticket_number} matched winning number {winning_number}. \
                     Expected payout {expected_payout:.2}."
                ),
                ticket_number: ticket_number.clone(),
                created_at: to_millis(*settled_at),
            },
            LotteryEvent::ClaimApproved {
                ticket_number,
                agent_id,
                prize_amount,
                approved_at,
                ..
            } => Self {
                agent_id: *agent_id,
                kind: "claim_approved",
                title: "Claim approved".to_string(),
                message: format!(
                    "Claim for ticket {ticket_number} approved. Prize {prize_amount:.2}."
                ),
                ticket_number: ticket_number.clone(),
                created_at: to_millis(*approved_at),
            },
        }
    }
}

/// Receives LotteryEvents from settlement and the claim workflow, logs them and
/// persists agent notifications. Without a pool (memory backend) events are only logged.
pub struct NotificationWriter {
    pool: Option<sqlx::SqlitePool>,
    event_rx: mpsc::Receiver<LotteryEvent>,
    health: Arc<HealthState>,
}

impl NotificationWriter {
    pub fn new(
        pool: Option<sqlx::SqlitePool>,
        event_rx: mpsc::Receiver<LotteryEvent>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            pool,
            event_rx,
            health,
        }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.event_rx.recv().await {
            self.health.dec_notifications_pending();
            let note = Notification::from_event(&event);
            info!(
                event = note.kind,
                ticket_number = %note.ticket_number,
                agent_id = note.agent_id,
                "{}",
                note.message,
            );
            if let Some(pool) = &self.pool {
                if let Err(e) = write_notification(pool, &note).await {
                    error!("Notification write error: {e}");
                }
            }
        }
    }
}

async fn write_notification(pool: &sqlx::SqlitePool, n: &Notification) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (agent_id, kind, title, message, ticket_number, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(n.agent_id)
    .bind(n.kind)
    .bind(&n.title)
    .bind(&n.message)
    .bind(&n.ticket_number)
    .bind(n.created_at)
    .execute(pool)
    .await?;
    Ok(())
}
