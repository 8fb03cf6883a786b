//! Decomposition of a raw cloud-variable decimal value into its framing
//! fields. Pure parsing; no I/O, no client/fragment state.

use crate::FramingError;

/// One inbound cloud-variable write, split into its framing fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPacket {
    /// `0` = key fragment, `1`/`2` = normal (the two normal markers are not
    /// distinguished further downstream).
    pub kind: u8,
    /// Everything after the type digit, up to the first `.`.
    pub body: String,
    /// The 5-digit client tag following the first `.`.
    pub client_id: String,
    /// `true` when this packet is the last part of a message (the original
    /// decimal value was non-negative); `false` signals more parts follow.
    pub terminal: bool,
}

/// Parse the decimal string carried by `FROM_CLIENT`.
///
/// `raw` is the value exactly as received (it may start with `-`, the sign
/// used as the continuation marker rather than arithmetic negation).
pub fn parse(raw: &str) -> Result<RawPacket, FramingError> {
    let terminal = !raw.contains('-');
    let value: String = raw.chars().filter(|&c| c != '-').collect();

    let mut parts = value.splitn(2, '.');
    let head = parts.next().ok_or(FramingError::Malformed)?;
    let tail = parts.next().ok_or(FramingError::Malformed)?;

    let mut head_chars = head.chars();
    let kind_char = head_chars.next().ok_or(FramingError::Malformed)?;
    let kind = kind_char.to_digit(10).ok_or(FramingError::Malformed)? as u8;
    let body: String = head_chars.collect();

    if tail.len() < 5 {
        return Err(FramingError::Malformed);
    }
    let client_id = tail[..5].to_string();

    Ok(RawPacket { kind, body, client_id, terminal })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_terminal_normal_packet() {
        let p = parse("113409.1234500101").unwrap();
        assert_eq!(p.kind, 1);
        assert_eq!(p.body, "3409");
        assert_eq!(p.client_id, "12345");
        assert!(p.terminal);
    }

    #[test]
    fn leading_dash_marks_continuation() {
        let p = parse("-113409.1234500101").unwrap();
        assert!(!p.terminal);
        assert_eq!(p.client_id, "12345");
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(parse("1340912345").unwrap_err(), FramingError::Malformed);
    }

    #[test]
    fn key_fragment_kind_is_zero() {
        let p = parse("012345abcde.1234500101").unwrap();
        assert_eq!(p.kind, 0);
        assert_eq!(p.body, "2345abcde");
    }
}
