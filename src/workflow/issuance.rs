use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TICKET_NUMBER_ATTEMPTS;
use crate::error::{AppError, Result};
use crate::identity::{generate_ticket_number, PrintPayload};
use crate::state::TicketStore;
use crate::types::{Actor, BetLimits, DrawStatus, NewTicket, NewWager, Ticket, Wager};
use crate::win::{validate_combination, PrizeCalculator};

#[derive(Debug, Clone, Serialize)]
pub struct IssuedTicket {
    pub ticket: Ticket,
    pub wagers: Vec<Wager>,
    pub print: PrintPayload,
}

/// Produces candidate ticket numbers; uniqueness is left to storage.
pub type TicketNumberSource = Arc<dyn Fn() -> Result<String> + Send + Sync>;

pub struct TicketIssuer<S> {
    store: Arc<S>,
    prizes: PrizeCalculator,
    limits: BetLimits,
    numbers: TicketNumberSource,
}

impl<S> Clone for TicketIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prizes: self.prizes,
            limits: self.limits,
            numbers: Arc::clone(&self.numbers),
        }
    }
}

impl<S: TicketStore> TicketIssuer<S> {
    pub fn new(store: Arc<S>, prizes: PrizeCalculator, limits: BetLimits) -> Self {
        Self {
            store,
            prizes,
            limits,
            numbers: Arc::new(generate_ticket_number),
        }
    }

    /// Replaces the random ticket-number generator.
    pub fn with_number_source(mut self, numbers: TicketNumberSource) -> Self {
        self.numbers = numbers;
        self
    }

    pub async fn issue(
        &self,
        actor: &Actor,
        draw_id: i64,
        wagers: Vec<NewWager>,
    ) -> Result<IssuedTicket> {
        self.issue_at(actor, draw_id, wagers, Utc::now()).await
    }

    /// Validates every wager, then inserts under a fresh ticket number, retrying
    /// when storage reports the number as taken. Per-number bet limits are
    /// enforced by storage in the same write as the ticket.
    pub async fn issue_at(
        &self,
        actor: &Actor,
        draw_id: i64,
        wagers: Vec<NewWager>,
        now: DateTime<Utc>,
    ) -> Result<IssuedTicket> {
        if wagers.is_empty() {
            return Err(AppError::Validation(
                "a ticket needs at least one wager".to_string(),
            ));
        }
        for w in &wagers {
            validate_combination(&w.combination, w.bet_type)?;
            self.prizes.validate_stake(w.amount)?;
        }

        let draw = self
            .store
            .find_draw_by_id(draw_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))?;
        if draw.status != DrawStatus::Open {
            return Err(AppError::Validation(format!(
                "draw {draw_id} is {}, not open for betting",
                draw.status
            )));
        }
        if now >= draw.cutoff_at() {
            return Err(AppError::Validation(format!(
                "betting for draw {draw_id} closed at {}",
                draw.cutoff_at()
            )));
        }

        let total_amount: f64 = wagers.iter().map(|w| w.amount).sum();
        // Stored timestamps keep millisecond precision; the integrity hash must survive a round trip.
        let issued_at = now.trunc_subsecs(3);

        let mut last_err = None;
        for attempt in 1..=TICKET_NUMBER_ATTEMPTS {
            let ticket_number = (self.numbers)()?;
            let new_ticket = NewTicket {
                ticket_number: ticket_number.clone(),
                total_amount,
                draw_id,
                agent_id: actor.id,
                issued_at,
            };
            match self
                .store
                .insert_ticket(new_ticket, wagers.clone(), self.limits)
                .await
            {
                Ok((ticket, stored_wagers)) => {
                    info!(
                        event = "TICKET_ISSUED",
                        ticket_number = %ticket.ticket_number,
                        agent_id = actor.id,
                        draw_id,
                        total_amount,
                        wagers = stored_wagers.len(),
                        "ticket issued"
                    );
                    let print = PrintPayload::build(&ticket, &stored_wagers);
                    return Ok(IssuedTicket {
                        ticket,
                        wagers: stored_wagers,
                        print,
                    });
                }
                Err(AppError::DuplicateTicketNumber(n)) => {
                    warn!(attempt, ticket_number = %n, "ticket number collision, regenerating");
                    last_err = Some(AppError::DuplicateTicketNumber(n));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AppError::Validation("could not allocate a ticket number".to_string())
        }))
    }
}
