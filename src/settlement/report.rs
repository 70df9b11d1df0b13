use serde::Serialize;

use crate::error::AppError;
use crate::types::WinCategory;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementFailure {
    pub ticket_number: String,
    pub kind: &'static str,
    pub message: String,
}

impl SettlementFailure {
    pub fn new(ticket_number: &str, err: &AppError) -> Self {
        Self {
            ticket_number: ticket_number.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Expected payout for one win category across a settlement pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: WinCategory,
    pub wagers: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementReport {
    pub draw_id: i64,
    pub winning_number: String,
    /// Tickets in ISSUED that were priced in this pass.
    pub evaluated: usize,
    pub newly_validated: usize,
    pub non_winning: usize,
    /// Tickets already past ISSUED, left untouched.
    pub skipped: usize,
    pub failures: Vec<SettlementFailure>,
    pub breakdown: Vec<CategoryTotal>,
    pub expected_payout: f64,
}

impl SettlementReport {
    pub fn new(draw_id: i64, winning_number: &str) -> Self {
        Self {
            draw_id,
            winning_number: winning_number.to_string(),
            evaluated: 0,
            newly_validated: 0,
            non_winning: 0,
            skipped: 0,
            failures: Vec::new(),
            breakdown: [
                WinCategory::Straight,
                WinCategory::RambolitoDouble,
                WinCategory::RambolitoDistinct,
            ]
            .into_iter()
            .map(|category| CategoryTotal {
                category,
                wagers: 0,
                amount: 0.0,
            })
            .collect(),
            expected_payout: 0.0,
        }
    }

    pub fn add_hit(&mut self, category: WinCategory, amount: f64) {
        if let Some(total) = self.breakdown.iter_mut().find(|t| t.category == category) {
            total.wagers += 1;
            total.amount += amount;
        }
        self.expected_payout += amount;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpiryReport {
    pub draw_id: i64,
    pub expired: usize,
    pub skipped: usize,
    /// ISSUED tickets that hit the winning number and were left in place.
    pub unsettled_winners: Vec<String>,
    pub failures: Vec<SettlementFailure>,
}
