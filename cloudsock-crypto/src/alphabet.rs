//! Shared symbol table backing both [`crate::codec`] (1-based decimal
//! pairs) and [`crate::cipher`] (0-based substitution). Not public: the two
//! modules expose their own indexing conventions, the table itself is an
//! implementation detail.

use std::sync::OnceLock;

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SPECIAL: &str = " .,-:;_'#!\"§$%&/()=?{[]}\\0123456789<>ß*";

pub(crate) fn chars() -> &'static [char] {
    static TABLE: OnceLock<Vec<char>> = OnceLock::new();
    TABLE.get_or_init(|| LOWER.chars().chain(UPPER.chars()).chain(SPECIAL.chars()).collect())
}

pub(crate) fn len() -> usize {
    chars().len()
}

pub(crate) fn index_of(c: char) -> Option<usize> {
    chars().iter().position(|&x| x == c)
}
