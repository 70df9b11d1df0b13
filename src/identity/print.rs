use serde::Serialize;

use crate::identity::{agent_label, draw_label, qr_payload, sequence_label};
use crate::types::{BetType, Ticket, Wager};

#[derive(Debug, Clone, Serialize)]
pub struct PrintedWager {
    pub sequence: char,
    pub bet_type: BetType,
    pub combination: String,
    pub amount: f64,
}

/// Everything a thermal-printer formatter needs. Rendering happens elsewhere.
#[derive(Debug, Clone, Serialize)]
pub struct PrintPayload {
    pub ticket_number: String,
    pub qr_payload: String,
    pub draw_label: String,
    pub agent_label: String,
    pub total_amount: f64,
    pub reprint_count: u8,
    pub wagers: Vec<PrintedWager>,
}

impl PrintPayload {
    pub fn build(ticket: &Ticket, wagers: &[Wager]) -> Self {
        Self {
            ticket_number: ticket.ticket_number.clone(),
            qr_payload: qr_payload(ticket),
            draw_label: draw_label(ticket.draw_id),
            agent_label: agent_label(ticket.agent_id),
            total_amount: ticket.total_amount,
            reprint_count: ticket.reprint_count,
            wagers: wagers
                .iter()
                .enumerate()
                .map(|(i, w)| PrintedWager {
                    sequence: sequence_label(i),
                    bet_type: w.bet_type,
                    combination: w.combination.clone(),
                    amount: w.amount,
                })
                .collect(),
        }
    }
}
