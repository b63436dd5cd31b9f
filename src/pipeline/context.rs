// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Shared key/value state for processors in a pipeline.
//!
//! For cross-cutting annotations that do not belong on individual frames
//! (session identifiers, negotiated media parameters). Cheap to clone; all
//! clones see the same store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-guarded shared context for processors in a pipeline.
#[derive(Clone, Default)]
pub struct PipelineContext {
    data: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a context value.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data
            .lock()
            .expect("context lock poisoned")
            .insert(key.into(), value);
    }

    /// Get a context value.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data
            .lock()
            .expect("context lock poisoned")
            .get(key)
            .cloned()
    }

    /// Check whether a key exists.
    pub fn has(&self, key: &str) -> bool {
        self.data
            .lock()
            .expect("context lock poisoned")
            .contains_key(key)
    }

    /// Delete a key; returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.data
            .lock()
            .expect("context lock poisoned")
            .remove(key)
            .is_some()
    }

    /// Clear all context values.
    pub fn clear(&self) {
        self.data.lock().expect("context lock poisoned").clear();
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().expect("context lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.data.lock().expect("context lock poisoned");
        f.debug_struct("PipelineContext")
            .field("keys", &guard.keys().collect::<Vec<_>>())
            .finish()
    }
}
