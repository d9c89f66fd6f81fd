//! Abstract persistent key/value variable store.
//!
//! The real host keeps these in a `save_variables`-style file and only
//! guarantees durability once its own save call returns; callers must not
//! assume a write is durable before that completes. We model that contract
//! with a trait so tests can substitute an in-memory store.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::AceError;

pub const KEY_CURRENT_INDEX: &str = "ace_current_index";
pub const KEY_FILAMENT_POS: &str = "ace_filament_pos";
pub const KEY_INVENTORY: &str = "ace_inventory";
pub const KEY_ENDLESS_SPOOL_ENABLED: &str = "ace_endless_spool_enabled";

/// A key/value store of JSON-encoded values, addressed by string key.
pub trait VariableStore: Send {
    fn get_raw(&self, key: &str) -> Option<String>;
    fn set_raw(&mut self, key: &str, value: String);

    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_raw(key).and_then(|raw| serde_json::from_str(&raw).ok())
    }

    fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), AceError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, raw);
        Ok(())
    }
}

/// In-memory implementation backing the real process's persistent store.
#[derive(Debug, Default)]
pub struct InMemoryVariableStore {
    values: std::collections::HashMap<String, String>,
}

impl VariableStore for InMemoryVariableStore {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
