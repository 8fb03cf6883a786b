//! The runtime value a request argument, keyword argument, or handler return
//! value carries. Stands in for annotation-driven duck typing: handlers
//! declare the [`crate::coerce::CoerceKind`] they want for each parameter
//! instead of an arbitrary callable annotation.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Arg::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(i) => write!(f, "{i}"),
            Arg::Float(x) => write!(f, "{x}"),
            Arg::Str(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_the_bare_value_not_a_debug_repr() {
        assert_eq!(Arg::Int(5).to_string(), "5");
        assert_eq!(Arg::Str("hi".to_string()).to_string(), "hi");
    }
}
