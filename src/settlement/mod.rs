//! Draw management: opening draws, recording results, settling and expiring tickets.

pub mod draw_settler;
pub mod report;

pub use draw_settler::DrawSettler;
pub use report::{CategoryTotal, ExpiryReport, SettlementFailure, SettlementReport};
