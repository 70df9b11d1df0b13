//! Ticket identity: numbers, presentation labels, and the tamper-evident QR payload.

pub mod integrity;
pub mod labels;
pub mod print;
pub mod ticket_number;

pub use integrity::{parse_payload, qr_payload, verify_integrity_hash};
pub use labels::{agent_label, draw_label, sequence_label};
pub use print::PrintPayload;
pub use ticket_number::{generate_ticket_number, is_valid_ticket_number};
