//! Parsing for the two accepted sub-request syntaxes: whitespace-separated
//! literals, and a restricted `name(pos, kw=val)` call form. Neither syntax
//! supports nested expressions; every argument is a single literal.

use crate::arg::Arg;
use crate::errors::RequestError;

pub struct ParsedRequest {
    pub name: String,
    pub args: Vec<Arg>,
    pub kwargs: Vec<(String, Arg)>,
}

/// Splits a message on `;` into sub-request texts, trimming surrounding
/// whitespace and dropping empty pieces (e.g. a trailing `;`).
pub fn split_subrequests(msg: &str) -> Vec<&str> {
    msg.split(';').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Splits off the leading `\w+` name, returning `(name, rest)` where `rest`
/// is everything immediately following it (not trimmed, so callers can tell
/// `name(...)` from `name (...)`).
fn leading_name(raw: &str) -> Option<(&str, &str)> {
    let end = raw.find(|c: char| !is_name_char(c)).unwrap_or(raw.len());
    if end == 0 {
        return None;
    }
    Some((&raw[..end], &raw[end..]))
}

/// The leading `\w+` name of a sub-request, without committing to parsing
/// the rest of it. Used to look up a handler's `allow_python_syntax`/
/// `thread` flags before choosing how to parse the remainder.
pub fn peek_name(raw: &str) -> Option<&str> {
    leading_name(raw).map(|(name, _)| name)
}

/// A sub-request is in call form only when its name is immediately followed
/// by `(` and the whole (trimmed) text ends with `)`.
fn is_call_form(rest: &str, raw: &str) -> bool {
    rest.starts_with('(') && raw.trim_end().ends_with(')')
}

/// Parses one sub-request, choosing the call form when the text looks like
/// one and the handler allows it, the whitespace form otherwise. Returns
/// [`RequestError::Permission`] if call syntax was used against a handler
/// that disallows it.
pub fn parse_subrequest(raw: &str, allow_python_syntax: bool) -> Result<ParsedRequest, RequestError> {
    let (name, rest) = leading_name(raw).ok_or(RequestError::Syntax)?;
    if is_call_form(rest, raw) {
        if !allow_python_syntax {
            return Err(RequestError::Permission(name.to_string()));
        }
        let trimmed = raw.trim_end();
        let inside = &trimmed[name.len() + 1..trimmed.len() - 1];
        parse_call(name, inside)
    } else {
        parse_whitespace(name, rest.trim_start())
    }
}

fn parse_whitespace(name: &str, rest: &str) -> Result<ParsedRequest, RequestError> {
    let args = tokenize_literals(rest)?;
    Ok(ParsedRequest { name: name.to_string(), args, kwargs: Vec::new() })
}

/// Character-at-a-time literal tokenizer for the whitespace form: a quoted
/// string (`\` escapes), a run of digits (int), or a run of digits with one
/// `.` (float).
fn tokenize_literals(s: &str) -> Result<Vec<Arg>, RequestError> {
    let mut chars = s.chars().peekable();
    let mut tokens = Vec::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut content = String::new();
            loop {
                match chars.next() {
                    Some('\\') => content.push(chars.next().ok_or(RequestError::Syntax)?),
                    Some(ch) if ch == quote => break,
                    Some(ch) => content.push(ch),
                    None => return Err(RequestError::Syntax),
                }
            }
            tokens.push(Arg::Str(content));
        } else if c.is_ascii_digit() || c == '-' {
            let mut content = String::new();
            if c == '-' {
                content.push(c);
                chars.next();
            }
            let mut is_float = false;
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_digit() {
                    content.push(ch);
                    chars.next();
                } else if ch == '.' && !is_float {
                    is_float = true;
                    content.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if is_float {
                tokens.push(Arg::Float(content.parse().map_err(|_| RequestError::Syntax)?));
            } else {
                tokens.push(Arg::Int(content.parse().map_err(|_| RequestError::Syntax)?));
            }
        } else {
            return Err(RequestError::Syntax);
        }
    }
    Ok(tokens)
}

fn parse_call(name: &str, inside: &str) -> Result<ParsedRequest, RequestError> {
    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    for piece in split_top_level(inside) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match split_kwarg(piece) {
            Some((key, value)) => kwargs.push((key.to_string(), literal_value(value.trim())?)),
            None => args.push(literal_value(piece)?),
        }
    }
    Ok(ParsedRequest { name: name.to_string(), args, kwargs })
}

/// Splits a call's argument list on top-level commas, respecting quoting so
/// a comma inside a string literal does not split the argument.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if let Some(q) = in_quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                in_quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => in_quote = Some(ch),
            ',' => {
                parts.push(&s[start..i]);
                start = i + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// `key=value` at the top level of one call argument, or `None` if `piece`
/// is a bare positional literal.
fn split_kwarg(piece: &str) -> Option<(&str, &str)> {
    let eq = piece.find('=')?;
    let (key, value) = (piece[..eq].trim(), &piece[eq + 1..]);
    let mut key_chars = key.chars();
    let first = key_chars.next()?;
    if !first.is_alphabetic() || !key_chars.all(is_name_char) {
        return None;
    }
    Some((key, value))
}

/// Parses a single literal token: a quoted string (with `\` escapes), an
/// integer, or a float. No bare identifiers, no nested expressions.
fn literal_value(token: &str) -> Result<Arg, RequestError> {
    let token = token.trim();
    let mut chars = token.chars().peekable();
    match chars.peek().copied() {
        Some(q @ ('\'' | '"')) => {
            chars.next();
            let mut content = String::new();
            loop {
                match chars.next() {
                    Some('\\') => content.push(chars.next().ok_or(RequestError::Syntax)?),
                    Some(c) if c == q => break,
                    Some(c) => content.push(c),
                    None => return Err(RequestError::Syntax),
                }
            }
            if chars.next().is_some() {
                return Err(RequestError::Syntax);
            }
            Ok(Arg::Str(content))
        }
        Some(c) if c == '-' || c.is_ascii_digit() => {
            if token.contains('.') {
                token.parse::<f64>().map(Arg::Float).map_err(|_| RequestError::Syntax)
            } else {
                token.parse::<i64>().map(Arg::Int).map_err(|_| RequestError::Syntax)
            }
        }
        _ => Err(RequestError::Syntax),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_form_parses_quoted_string_then_int() {
        let parsed = parse_subrequest("echo \"hi\" 3", false).unwrap();
        assert_eq!(parsed.name, "echo");
        assert_eq!(parsed.args, vec![Arg::Str("hi".to_string()), Arg::Int(3)]);
    }

    #[test]
    fn whitespace_form_parses_a_float() {
        let parsed = parse_subrequest("scale 1.5", false).unwrap();
        assert_eq!(parsed.args, vec![Arg::Float(1.5)]);
    }

    #[test]
    fn call_form_parses_positional_literals() {
        let parsed = parse_subrequest("add(2, 3)", true).unwrap();
        assert_eq!(parsed.name, "add");
        assert_eq!(parsed.args, vec![Arg::Int(2), Arg::Int(3)]);
    }

    #[test]
    fn call_form_is_rejected_when_not_allowed() {
        let err = parse_subrequest("add(2, 3)", false).unwrap_err();
        assert!(matches!(err, RequestError::Permission(name) if name == "add"));
    }

    #[test]
    fn call_form_parses_keyword_arguments() {
        let parsed = parse_subrequest("greet(name='world')", true).unwrap();
        assert_eq!(parsed.kwargs, vec![("name".to_string(), Arg::Str("world".to_string()))]);
    }

    #[test]
    fn split_subrequests_drops_empty_trailing_pieces() {
        assert_eq!(split_subrequests("a; b; c;"), vec!["a", "b", "c"]);
    }

    #[test]
    fn garbage_text_is_a_syntax_error() {
        assert!(matches!(parse_subrequest("!!!", false), Err(RequestError::Syntax)));
    }
}
