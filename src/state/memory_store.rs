use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::state::TicketStore;
use crate::types::{
    Agent, BetLimits, BetType, ClaimAuditRecord, Draw, DrawStatus, DrawTime, NewDraw, NewTicket,
    NewWager, ReprintRecord, StatusChange, Ticket, TicketStatus, Wager,
};

/// In-process store. Each ticket lives in a single `DashMap` entry, so conditional
/// updates run under that entry's write lock and are atomic per ticket. Audit and
/// reprint records are pushed while that lock is still held.
pub struct MemoryStore {
    /// ticket_id → Ticket
    tickets: DashMap<i64, Ticket>,
    /// ticket_number → ticket_id (uniqueness index)
    ticket_numbers: DashMap<String, i64>,
    /// ticket_id → wagers in issuance order
    wagers: DashMap<i64, Vec<Wager>>,
    draws: DashMap<i64, Draw>,
    /// (date, time) → draw_id
    draw_slots: DashMap<(NaiveDate, DrawTime), i64>,
    /// (draw_id, bet_type, combination) → stake sold so far
    bet_totals: DashMap<(i64, BetType, String), f64>,
    agents: DashMap<i64, Agent>,
    audit: DashMap<i64, Vec<ClaimAuditRecord>>,
    reprints: DashMap<i64, Vec<ReprintRecord>>,
    next_ticket_id: AtomicI64,
    next_wager_id: AtomicI64,
    next_draw_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tickets: DashMap::new(),
            ticket_numbers: DashMap::new(),
            wagers: DashMap::new(),
            draws: DashMap::new(),
            draw_slots: DashMap::new(),
            bet_totals: DashMap::new(),
            agents: DashMap::new(),
            audit: DashMap::new(),
            reprints: DashMap::new(),
            next_ticket_id: AtomicI64::new(1),
            next_wager_id: AtomicI64::new(1),
            next_draw_id: AtomicI64::new(1),
        }
    }
}

impl TicketStore for MemoryStore {
    async fn find_ticket_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>> {
        let Some(id) = self.ticket_numbers.get(ticket_number).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.tickets.get(&id).map(|t| t.clone()))
    }

    async fn find_tickets_by_draw(&self, draw_id: i64) -> Result<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|e| e.value().draw_id == draw_id)
            .map(|e| e.value().clone())
            .collect();
        tickets.sort_by_key(|t| t.id);
        Ok(tickets)
    }

    async fn find_wagers_by_ticket(&self, ticket_id: i64) -> Result<Vec<Wager>> {
        Ok(self
            .wagers
            .get(&ticket_id)
            .map(|w| w.clone())
            .unwrap_or_default())
    }

    async fn find_draw_by_id(&self, draw_id: i64) -> Result<Option<Draw>> {
        Ok(self.draws.get(&draw_id).map(|d| d.clone()))
    }

    async fn find_agent(&self, agent_id: i64) -> Result<Option<Agent>> {
        Ok(self.agents.get(&agent_id).map(|a| a.clone()))
    }

    async fn upsert_agent(&self, agent: Agent) -> Result<()> {
        self.agents.insert(agent.id, agent);
        Ok(())
    }

    async fn insert_ticket(
        &self,
        ticket: NewTicket,
        wagers: Vec<NewWager>,
        limits: BetLimits,
    ) -> Result<(Ticket, Vec<Wager>)> {
        // Held for the whole insert: closing the draw and other inserts on it wait.
        let Some(draw) = self.draws.get_mut(&ticket.draw_id) else {
            return Err(AppError::NotFound(format!("draw {}", ticket.draw_id)));
        };
        if draw.status != DrawStatus::Open {
            return Err(AppError::Validation(format!(
                "draw {} is {}, not open for betting",
                draw.id, draw.status
            )));
        }

        let mut added: HashMap<(BetType, &str), f64> = HashMap::new();
        for w in &wagers {
            *added.entry((w.bet_type, w.combination.as_str())).or_default() += w.amount;
        }
        for (&(bet_type, combination), &amount) in &added {
            let Some(cap) = limits.cap(bet_type) else {
                continue;
            };
            let sold = self
                .bet_totals
                .get(&(draw.id, bet_type, combination.to_string()))
                .map(|t| *t)
                .unwrap_or(0.0);
            if sold + amount > cap {
                return Err(BetLimits::sold_out(draw.id, bet_type, combination, cap));
            }
        }

        let slot = match self.ticket_numbers.entry(ticket.ticket_number.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::DuplicateTicketNumber(ticket.ticket_number))
            }
            Entry::Vacant(slot) => slot,
        };

        for ((bet_type, combination), amount) in added {
            *self
                .bet_totals
                .entry((draw.id, bet_type, combination.to_string()))
                .or_default() += amount;
        }

        let id = self.next_ticket_id.fetch_add(1, Ordering::Relaxed);
        let stored = Ticket {
            id,
            ticket_number: ticket.ticket_number,
            status: TicketStatus::Issued,
            total_amount: ticket.total_amount,
            reprint_count: 0,
            draw_id: ticket.draw_id,
            agent_id: ticket.agent_id,
            claimer_name: None,
            claimer_phone: None,
            claimer_address: None,
            prize_amount: None,
            issued_at: ticket.issued_at,
            claimed_at: None,
            approval_requested_at: None,
            approved_at: None,
            approved_by: None,
        };
        let stored_wagers: Vec<Wager> = wagers
            .into_iter()
            .map(|w| Wager {
                id: self.next_wager_id.fetch_add(1, Ordering::Relaxed),
                ticket_id: id,
                bet_type: w.bet_type,
                combination: w.combination,
                amount: w.amount,
            })
            .collect();

        self.wagers.insert(id, stored_wagers.clone());
        self.tickets.insert(id, stored.clone());
        slot.insert(id);
        Ok((stored, stored_wagers))
    }

    async fn update_ticket_status(
        &self,
        ticket_id: i64,
        expected: TicketStatus,
        next: TicketStatus,
        change: StatusChange,
        audit: ClaimAuditRecord,
    ) -> Result<Option<Ticket>> {
        let Some(mut ticket) = self.tickets.get_mut(&ticket_id) else {
            return Err(AppError::NotFound(format!("ticket id {ticket_id}")));
        };
        if ticket.status != expected {
            return Ok(None);
        }
        ticket.apply_status_change(next, &change);
        self.audit.entry(ticket_id).or_default().push(audit);
        Ok(Some(ticket.clone()))
    }

    async fn increment_reprint_count(
        &self,
        ticket_id: i64,
        max: u8,
        reprinted_by: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>> {
        let Some(mut ticket) = self.tickets.get_mut(&ticket_id) else {
            return Err(AppError::NotFound(format!("ticket id {ticket_id}")));
        };
        if !ticket.status.is_reprintable() || ticket.reprint_count >= max {
            return Ok(None);
        }
        ticket.reprint_count += 1;
        self.reprints.entry(ticket_id).or_default().push(ReprintRecord {
            ticket_id,
            reprinted_by,
            reprint_number: ticket.reprint_count,
            timestamp: at,
        });
        Ok(Some(ticket.clone()))
    }

    async fn audit_records(&self, ticket_id: i64) -> Result<Vec<ClaimAuditRecord>> {
        Ok(self
            .audit
            .get(&ticket_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn reprint_records(&self, ticket_id: i64) -> Result<Vec<ReprintRecord>> {
        Ok(self
            .reprints
            .get(&ticket_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn insert_draw(&self, draw: NewDraw) -> Result<Draw> {
        let slot = match self.draw_slots.entry((draw.draw_date, draw.draw_time)) {
            Entry::Occupied(_) => {
                return Err(AppError::Validation(format!(
                    "a {} draw already exists for {}",
                    draw.draw_time, draw.draw_date
                )))
            }
            Entry::Vacant(slot) => slot,
        };
        let id = self.next_draw_id.fetch_add(1, Ordering::Relaxed);
        let stored = Draw {
            id,
            draw_date: draw.draw_date,
            draw_time: draw.draw_time,
            winning_number: None,
            status: draw.status,
        };
        self.draws.insert(id, stored.clone());
        slot.insert(id);
        Ok(stored)
    }

    async fn set_draw_result(&self, draw_id: i64, winning_number: &str) -> Result<Option<Draw>> {
        let Some(mut draw) = self.draws.get_mut(&draw_id) else {
            return Err(AppError::NotFound(format!("draw {draw_id}")));
        };
        if !matches!(draw.status, DrawStatus::Closed | DrawStatus::Completed) {
            return Err(AppError::DrawConflict {
                draw_id,
                message: format!("cannot record a result while the draw is {}", draw.status),
            });
        }
        if draw
            .winning_number
            .as_deref()
            .is_some_and(|existing| existing != winning_number)
        {
            return Ok(None);
        }
        draw.winning_number = Some(winning_number.to_string());
        draw.status = DrawStatus::Completed;
        Ok(Some(draw.clone()))
    }

    async fn update_draw_status(&self, draw_id: i64, status: DrawStatus) -> Result<()> {
        let Some(mut draw) = self.draws.get_mut(&draw_id) else {
            return Err(AppError::NotFound(format!("draw {draw_id}")));
        };
        draw.status = status;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
