//! Win determination for the two wager families.
//!
//! Everything here is a pure function of its arguments, so a draw's wagers can be
//! evaluated in parallel without coordination.

use std::collections::BTreeSet;

use crate::error::{AppError, Result};
use crate::types::{BetType, Wager, WinCategory};

/// Index orderings of a 3-element sequence.
const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

fn digits(combo: &str) -> Option<[u8; 3]> {
    let bytes = combo.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some([bytes[0], bytes[1], bytes[2]])
}

fn distinct_digits(d: &[u8; 3]) -> usize {
    d.iter().collect::<BTreeSet<_>>().len()
}

/// Combination must be exactly three digits; rambolito additionally forbids triples.
pub fn validate_combination(combo: &str, bet_type: BetType) -> Result<()> {
    let Some(d) = digits(combo) else {
        return Err(AppError::Validation(format!(
            "bet combination '{combo}' must be exactly 3 digits"
        )));
    };
    if bet_type == BetType::Rambolito && distinct_digits(&d) == 1 {
        return Err(AppError::Validation(format!(
            "triple number '{combo}' is not allowed in rambolito"
        )));
    }
    Ok(())
}

pub fn is_valid_combination(combo: &str, bet_type: BetType) -> bool {
    validate_combination(combo, bet_type).is_ok()
}

/// The set of drawn numbers that make this combination a winner.
///
/// Standard wagers win only on the combination itself. Rambolito wagers win on every
/// distinct ordering of the digits: 6 for three distinct digits, 3 for a double.
/// Malformed combinations yield an empty set.
pub fn enumerate_winning_permutations(combo: &str, bet_type: BetType) -> BTreeSet<String> {
    let Some(d) = digits(combo) else {
        return BTreeSet::new();
    };
    match bet_type {
        BetType::Standard => BTreeSet::from([combo.to_string()]),
        BetType::Rambolito => PERMUTATIONS
            .iter()
            .map(|p| {
                [d[p[0]], d[p[1]], d[p[2]]]
                    .iter()
                    .map(|&b| b as char)
                    .collect::<String>()
            })
            .collect(),
    }
}

/// Category a (bet type, combination) pair wins under against `winning_number`.
pub fn classify(bet_type: BetType, combo: &str, winning_number: &str) -> WinCategory {
    if !is_valid_combination(combo, bet_type) || digits(winning_number).is_none() {
        return WinCategory::None;
    }
    if !enumerate_winning_permutations(combo, bet_type).contains(winning_number) {
        return WinCategory::None;
    }
    match bet_type {
        BetType::Standard => WinCategory::Straight,
        BetType::Rambolito => match digits(combo).map(|d| distinct_digits(&d)) {
            Some(3) => WinCategory::RambolitoDistinct,
            Some(2) => WinCategory::RambolitoDouble,
            _ => WinCategory::None,
        },
    }
}

pub fn determine_win(wager: &Wager, winning_number: &str) -> WinCategory {
    classify(wager.bet_type, &wager.combination, winning_number)
}
