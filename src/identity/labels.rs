const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A, B, C, ... for wagers on a multi-wager ticket, wrapping after Z.
pub fn sequence_label(index: usize) -> char {
    ALPHABET[index % 26] as char
}

/// `A0000001`-style draw identifier printed on tickets.
pub fn draw_label(draw_id: i64) -> String {
    let letter = ALPHABET[draw_id.rem_euclid(26) as usize] as char;
    format!("{letter}{draw_id:07}")
}

/// `AGENT001`-style agent identifier printed on tickets.
pub fn agent_label(agent_id: i64) -> String {
    format!("AGENT{agent_id:03}")
}
