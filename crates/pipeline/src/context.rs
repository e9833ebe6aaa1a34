//! The pipeline context: a dotted-key store over JSON values plus an
//! append-only log list.
//!
//! Keys are flat strings; the dots are meaningful only at lookup time.
//! `get("a.b.c")` first tries the exact key, then walks down from the
//! longest stored prefix (`a.b`, then `a`) through the structured value
//! by the remaining segments. This is a flat map with an on-lookup path
//! walk, not a tree.

use std::fmt;
use std::sync::{RwLock, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;

struct ContextInner {
    values: IndexMap<String, Value>,
    logs: Vec<String>,
}

/// Thread-safe shared context for one pipeline run.
pub struct Context {
    inner: RwLock<ContextInner>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Context")
            .field("values", &inner.values)
            .field("logs", &inner.logs.len())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ContextInner {
                values: IndexMap::new(),
                logs: Vec::new(),
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ContextInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ContextInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a value, replacing any previous value at this exact key.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.write().values.insert(key.into(), value);
    }

    /// Look up a value.
    ///
    /// A value stored directly at the full key always wins. Otherwise the
    /// longest stored prefix of the key (splitting on `.`) is found and
    /// the remaining segments are walked through its structured value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let inner = self.read();
        if let Some(value) = inner.values.get(key) {
            return Some(value.clone());
        }

        // Progressive prefix descent, longest prefix first.
        let segments: Vec<&str> = key.split('.').collect();
        for split in (1..segments.len()).rev() {
            let prefix = segments[..split].join(".");
            if let Some(root) = inner.values.get(&prefix) {
                let mut current = root;
                for segment in &segments[split..] {
                    match current.get(segment) {
                        Some(next) => current = next,
                        None => return None,
                    }
                }
                return Some(current.clone());
            }
        }
        None
    }

    /// String coercion: missing keys are `""`, strings come back bare,
    /// scalars via `to_string`, containers as JSON.
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            None => String::new(),
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        }
    }

    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// An independent snapshot of every stored key.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.read().values.clone()
    }

    /// A fully independent copy, logs included. Mutations on either side
    /// never show through to the other.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let inner = self.read();
        Self {
            inner: RwLock::new(ContextInner {
                values: inner.values.clone(),
                logs: inner.logs.clone(),
            }),
        }
    }

    /// Overwrite a batch of keys.
    pub fn apply_updates(&self, updates: &IndexMap<String, Value>) {
        let mut inner = self.write();
        for (key, value) in updates {
            inner.values.insert(key.clone(), value.clone());
        }
    }

    pub fn append_log(&self, entry: impl Into<String>) {
        self.write().logs.push(entry.into());
    }

    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.read().logs.clone()
    }

    /// Rebuild a context from checkpoint data.
    #[must_use]
    pub fn from_parts(values: IndexMap<String, Value>, logs: Vec<String>) -> Self {
        Self {
            inner: RwLock::new(ContextInner { values, logs }),
        }
    }
}
