//! Per-parameter type coercion, replacing the reference's "invoke the
//! annotation as a unary function" trick with a small closed set of target
//! kinds. A failed coercion leaves the value as received.

use crate::arg::Arg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceKind {
    Any,
    Int,
    Float,
    Str,
}

pub fn coerce(value: Arg, kind: CoerceKind) -> Arg {
    match kind {
        CoerceKind::Any => value,
        CoerceKind::Int => match &value {
            Arg::Int(_) => value,
            Arg::Float(f) => Arg::Int(*f as i64),
            Arg::Str(s) => s.trim().parse::<i64>().map(Arg::Int).unwrap_or(value),
        },
        CoerceKind::Float => match &value {
            Arg::Float(_) => value,
            Arg::Int(i) => Arg::Float(*i as f64),
            Arg::Str(s) => s.trim().parse::<f64>().map(Arg::Float).unwrap_or(value),
        },
        CoerceKind::Str => match &value {
            Arg::Str(_) => value,
            Arg::Int(i) => Arg::Str(i.to_string()),
            Arg::Float(f) => Arg::Str(f.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_a_numeric_string_into_an_int() {
        assert_eq!(coerce(Arg::Str("42".to_string()), CoerceKind::Int), Arg::Int(42));
    }

    #[test]
    fn failed_coercion_passes_the_original_value_through() {
        let original = Arg::Str("not a number".to_string());
        assert_eq!(coerce(original.clone(), CoerceKind::Int), original);
    }

    #[test]
    fn any_never_touches_the_value() {
        let original = Arg::Float(1.5);
        assert_eq!(coerce(original.clone(), CoerceKind::Any), original);
    }
}
