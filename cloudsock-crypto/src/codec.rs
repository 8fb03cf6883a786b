//! Two-digit numeric alphabet codec.
//!
//! Carries arbitrary text inside the decimal value of a cloud variable:
//! every character maps to a 2-digit, 1-based index into the shared symbol
//! table. `encode`/`decode` are pure and stateless, and round-trip for any
//! string drawn from the table (unknown characters on encode become `?`,
//! out-of-range pairs on decode are dropped rather than rejected).

use crate::alphabet;

/// Number of symbols in the codec alphabet.
pub fn alphabet_len() -> usize {
    alphabet::len()
}

/// Encode `text` into the alphabet's 2-digit decimal form. Characters
/// outside the table encode as `?`.
pub fn encode(text: &str) -> String {
    let qmark = alphabet::index_of('?').expect("'?' is always in the codec alphabet");
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        let idx = alphabet::index_of(c).unwrap_or(qmark) + 1; // 1-based
        out.push_str(&format!("{idx:02}"));
    }
    out
}

/// Decode a string of 2-digit-paired decimals back into text. A trailing
/// unpaired digit, or a pair outside `1..=alphabet_len()`, is dropped and
/// logged rather than treated as an error.
pub fn decode(digits: &str) -> String {
    let digits: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(digits.len() / 2);
    let mut chunks = digits.chunks_exact(2);
    for pair in &mut chunks {
        let text: String = pair.iter().collect();
        match text.parse::<usize>() {
            Ok(n) if n >= 1 && n <= alphabet::len() => out.push(alphabet::chars()[n - 1]),
            _ => log::debug!("codec: dropped out-of-range pair {text:?}"),
        }
    }
    if !chunks.remainder().is_empty() {
        log::debug!("codec: dropped trailing unpaired digit");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_letters_and_symbols() {
        for s in ["hello", "Hello, World!", "ABCxyz123", ""] {
            assert_eq!(decode(&encode(s)), s);
        }
    }

    #[test]
    fn unknown_char_becomes_question_mark() {
        assert_eq!(decode(&encode("h€llo")), "h?llo");
    }

    #[test]
    fn out_of_range_pair_is_dropped_not_fatal() {
        // "99" is outside the table (91 symbols); "01" decodes to 'a'.
        assert_eq!(decode("9901"), "a");
    }

    #[test]
    fn trailing_unpaired_digit_is_dropped() {
        assert_eq!(decode("015"), "a");
    }

    #[test]
    fn alphabet_has_ninety_one_symbols() {
        assert_eq!(alphabet_len(), 91);
    }
}
