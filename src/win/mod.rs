pub mod determiner;
pub mod prize;

pub use determiner::{determine_win, is_valid_combination, validate_combination};
pub use prize::{PrizeCalculator, PrizeTable, TicketPayout};
