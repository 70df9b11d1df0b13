use serde::Serialize;

use crate::config::prize_defaults;
use crate::error::{AppError, Result};
use crate::types::{BetType, Wager, WinCategory};
use crate::win::determiner::determine_win;

/// Unit prizes, paid per unit of stake.
///
/// A distinct-digit rambolito has twice as many winning permutations as a double,
/// so its unit prize is half the double's to keep expected payout per draw level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrizeTable {
    pub straight: f64,
    pub rambolito_double: f64,
    pub rambolito_distinct: f64,
    pub min_stake: f64,
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self {
            straight: prize_defaults::STRAIGHT,
            rambolito_double: prize_defaults::RAMBOLITO_DOUBLE,
            rambolito_distinct: prize_defaults::RAMBOLITO_DISTINCT,
            min_stake: prize_defaults::MIN_STAKE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrizeCalculator {
    table: PrizeTable,
}

impl PrizeCalculator {
    pub fn new(table: PrizeTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PrizeTable {
        &self.table
    }

    /// Unit prize for a category. A category from the other wager family is rejected.
    pub fn base_prize(&self, bet_type: BetType, category: WinCategory) -> Result<f64> {
        match (bet_type, category) {
            (_, WinCategory::None) => Ok(0.0),
            (BetType::Standard, WinCategory::Straight) => Ok(self.table.straight),
            (BetType::Rambolito, WinCategory::RambolitoDouble) => Ok(self.table.rambolito_double),
            (BetType::Rambolito, WinCategory::RambolitoDistinct) => {
                Ok(self.table.rambolito_distinct)
            }
            (bet_type, category) => Err(AppError::Validation(format!(
                "win category {category} does not apply to {bet_type} wagers"
            ))),
        }
    }

    pub fn validate_stake(&self, bet_amount: f64) -> Result<()> {
        if !bet_amount.is_finite() || bet_amount < self.table.min_stake {
            return Err(AppError::Validation(format!(
                "bet amount {bet_amount} is below the minimum stake of {}",
                self.table.min_stake
            )));
        }
        Ok(())
    }

    /// Strictly linear in stake.
    pub fn payout(&self, bet_amount: f64, unit_prize: f64) -> Result<f64> {
        self.validate_stake(bet_amount)?;
        Ok(unit_prize * bet_amount)
    }

    /// Category and payout of one wager against a drawn number.
    pub fn price_wager(&self, wager: &Wager, winning_number: &str) -> Result<(WinCategory, f64)> {
        let category = determine_win(wager, winning_number);
        if !category.is_win() {
            return Ok((category, 0.0));
        }
        let unit = self.base_prize(wager.bet_type, category)?;
        Ok((category, self.payout(wager.amount, unit)?))
    }

    /// Prices every wager of a ticket. Losing wagers are left out of `hits`.
    pub fn price_ticket(&self, wagers: &[Wager], winning_number: &str) -> Result<TicketPayout> {
        let mut payout = TicketPayout::default();
        for wager in wagers {
            let (category, amount) = self.price_wager(wager, winning_number)?;
            if category.is_win() {
                payout.total += amount;
                payout.hits.push(WagerHit {
                    wager_id: wager.id,
                    category,
                    amount,
                });
            }
        }
        Ok(payout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WagerHit {
    pub wager_id: i64,
    pub category: WinCategory,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TicketPayout {
    pub total: f64,
    pub hits: Vec<WagerHit>,
}

impl TicketPayout {
    pub fn is_win(&self) -> bool {
        !self.hits.is_empty()
    }
}
