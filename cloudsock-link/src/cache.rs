//! In-memory mirror of the last-known value of every cloud variable the
//! link has observed. Written only from the reader thread on `set`; read
//! from anywhere, so a reader may observe a stale value but never a torn
//! one (guarded by the mutex rather than relying on platform word-atomicity).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct VariableCache {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl VariableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.lock().expect("variable cache mutex poisoned").insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.lock().expect("variable cache mutex poisoned").get(name).cloned()
    }

    pub fn remove(&self, name: &str) {
        self.values.lock().expect("variable cache mutex poisoned").remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = VariableCache::new();
        cache.set("score", "10");
        assert_eq!(cache.get("score"), Some("10".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn remove_clears_the_entry() {
        let cache = VariableCache::new();
        cache.set("score", "10");
        cache.remove("score");
        assert_eq!(cache.get("score"), None);
    }
}
