use sha2::{Digest, Sha256};

use crate::config::{INTEGRITY_HASH_LEN, QR_SEPARATOR};
use crate::error::{AppError, Result};
use crate::types::Ticket;

/// Truncated SHA-256 over the fields fixed at issuance:
/// `ticketNumber:totalAmount:drawId:agentId:issuedAtMillis`.
pub fn compute_integrity_hash(ticket: &Ticket) -> String {
    let input = format!(
        "{}:{}:{}:{}:{}",
        ticket.ticket_number,
        ticket.total_amount,
        ticket.draw_id,
        ticket.agent_id,
        ticket.issued_at.timestamp_millis(),
    );
    let digest = Sha256::digest(input.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(INTEGRITY_HASH_LEN);
    hash
}

/// `ticketNumber|hash`, the string encoded into the printed QR code.
pub fn qr_payload(ticket: &Ticket) -> String {
    format!(
        "{}{QR_SEPARATOR}{}",
        ticket.ticket_number,
        compute_integrity_hash(ticket)
    )
}

/// Splits a presented payload into `(ticket_number, hash)`.
pub fn parse_payload(payload: &str) -> Result<(&str, &str)> {
    match payload.trim().split_once(QR_SEPARATOR) {
        Some((number, hash)) if !number.is_empty() && !hash.is_empty() => Ok((number, hash)),
        _ => Err(AppError::Integrity("malformed QR payload".to_string())),
    }
}

/// Recomputes the hash from the stored ticket and compares it with the presented one.
pub fn verify_integrity_hash(payload: &str, stored: &Ticket) -> Result<()> {
    let (number, presented) = parse_payload(payload)?;
    if number != stored.ticket_number {
        return Err(AppError::Integrity(format!(
            "payload names ticket {number}, stored ticket is {}",
            stored.ticket_number
        )));
    }
    let expected = compute_integrity_hash(stored);
    if !constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
        return Err(AppError::Integrity(format!(
            "hash mismatch for ticket {number}"
        )));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
