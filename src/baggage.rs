//! Shared, single-writer-per-key state passed between pipeline tools.
//!
//! Each baggage key has exactly one owning tool, decided when the pipeline
//! is built (see [`crate::scheduler::PipelineBuilder`]). Readers fetch a
//! typed value with [`Baggage::get`]; only the owning tool may [`Baggage::set`]
//! a given key, and a second write to the same key is an internal invariant
//! violation rather than a silent overwrite.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{PipelineError, Result};

type BoxedValue = Box<dyn Any + Send + Sync>;

/// Type-erased, thread-safe store keyed by well-known baggage key names.
#[derive(Default)]
pub struct Baggage {
    inner: RwLock<HashMap<&'static str, BoxedValue>>,
    /// Ordered `(tool name, prompt_context fragment)` pairs, appended by the
    /// scheduler after each tool runs. Unlike the typed store this is not
    /// single-writer: every registered tool may contribute one fragment.
    /// `transaction_explainer` reads the whole collection to assemble its
    /// prompt.
    context_fragments: RwLock<Vec<(String, String)>>,
}

impl Baggage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a typed value out of baggage. Returns `None` if the key was
    /// never written (the owning tool may not have run, or tolerated a
    /// failure and skipped its write).
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &'static str) -> Option<T> {
        let guard = self.inner.read().expect("baggage lock poisoned");
        guard.get(key).and_then(|v| v.downcast_ref::<T>()).cloned()
    }

    /// Write a value to a baggage key. Fails if the key has already been
    /// written during this execution -- the single-writer invariant is
    /// enforced at runtime here and at build time by the scheduler's
    /// `writes()` overlap check.
    pub fn set<T: Send + Sync + 'static>(&self, key: &'static str, value: T) -> Result<()> {
        let mut guard = self.inner.write().expect("baggage lock poisoned");
        if guard.contains_key(key) {
            return Err(PipelineError::Invariant(format!(
                "baggage key '{key}' was written more than once"
            )));
        }
        guard.insert(key, Box::new(value));
        Ok(())
    }

    pub fn contains(&self, key: &'static str) -> bool {
        self.inner.read().expect("baggage lock poisoned").contains_key(key)
    }

    /// Record a tool's `prompt_context` fragment, in execution order.
    pub fn push_context_fragment(&self, tool_name: &str, fragment: String) {
        self.context_fragments
            .write()
            .expect("baggage lock poisoned")
            .push((tool_name.to_string(), fragment));
    }

    /// All fragments contributed so far, in the order tools ran.
    pub fn context_fragments(&self) -> Vec<(String, String)> {
        self.context_fragments
            .read()
            .expect("baggage lock poisoned")
            .clone()
    }
}

/// Shared handle passed to every tool.
pub type SharedBaggage = Arc<Baggage>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_typed_values() {
        let bag = Baggage::new();
        bag.set("k", 42i64).unwrap();
        assert_eq!(bag.get::<i64>("k"), Some(42));
    }

    #[test]
    fn rejects_double_write() {
        let bag = Baggage::new();
        bag.set("k", "first".to_string()).unwrap();
        let err = bag.set("k", "second".to_string());
        assert!(err.is_err());
    }

    #[test]
    fn missing_key_is_none_not_error() {
        let bag = Baggage::new();
        assert_eq!(bag.get::<i64>("missing"), None);
    }

    #[test]
    fn contains_reflects_writes() {
        let bag = Baggage::new();
        assert!(!bag.contains("k"));
        bag.set("k", 1u32).unwrap();
        assert!(bag.contains("k"));
    }

    #[test]
    fn context_fragments_preserve_contribution_order() {
        let bag = Baggage::new();
        bag.push_context_fragment("b", "### B:\n- two".to_string());
        bag.push_context_fragment("a", "### A:\n- one".to_string());
        let fragments = bag.context_fragments();
        assert_eq!(fragments, vec![
            ("b".to_string(), "### B:\n- two".to_string()),
            ("a".to_string(), "### A:\n- one".to_string()),
        ]);
    }
}
