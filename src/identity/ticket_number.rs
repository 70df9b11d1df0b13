use chrono::Utc;
use rand::Rng;

use crate::config::{TICKET_NUMBER_ATTEMPTS, TICKET_NUMBER_LEN};
use crate::error::{AppError, Result};

/// 17 ASCII digits, not all the same digit.
pub fn is_valid_ticket_number(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    bytes.len() == TICKET_NUMBER_LEN
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes.iter().any(|&b| b != bytes[0])
}

/// Random digits appended to the seconds timestamp.
const SUFFIX_SPACE: u32 = 10_000_000;

/// Unix-seconds prefix (10 digits until 2286) followed by a 7-digit random suffix,
/// keeping the trailing 17 digits. Ten million suffixes per second keep same-second
/// collisions rare. `None` if the result is degenerate.
pub fn compose_ticket_number(epoch_secs: i64, suffix: u32) -> Option<String> {
    if epoch_secs < 0 {
        return None;
    }
    let raw = format!("{epoch_secs}{:07}", suffix % SUFFIX_SPACE);
    let start = raw.len().saturating_sub(TICKET_NUMBER_LEN);
    let candidate = &raw[start..];
    is_valid_ticket_number(candidate).then(|| candidate.to_string())
}

/// Uniqueness is probabilistic: storage may still reject the number, in which case
/// the caller generates a fresh one.
pub fn generate_ticket_number() -> Result<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..TICKET_NUMBER_ATTEMPTS {
        let secs = Utc::now().timestamp();
        let suffix: u32 = rng.gen_range(0..SUFFIX_SPACE);
        if let Some(number) = compose_ticket_number(secs, suffix) {
            return Ok(number);
        }
    }
    Err(AppError::Validation(format!(
        "could not derive a usable ticket number in {TICKET_NUMBER_ATTEMPTS} attempts"
    )))
}
