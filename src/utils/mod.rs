// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Shared utilities: unique object identifiers and timestamp helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Global monotonically-increasing object ID counter.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique object identifier.
pub fn obj_id() -> u64 {
    OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Per-type instance counters, used for auto-generated `Type#N` names.
static OBJ_COUNTS: std::sync::OnceLock<std::sync::Mutex<HashMap<String, u64>>> =
    std::sync::OnceLock::new();

/// Return a per-type instance count for the given type name, then increment.
///
/// The first call for a given `type_name` returns 0, the second returns 1, etc.
pub fn obj_count(type_name: &str) -> u64 {
    let mut map = OBJ_COUNTS
        .get_or_init(|| std::sync::Mutex::new(HashMap::new()))
        .lock()
        .expect("obj_count lock poisoned");
    let entry = map.entry(type_name.to_string()).or_insert(0);
    let val = *entry;
    *entry += 1;
    val
}

/// Current wall-clock time as a presentation timestamp in nanoseconds.
pub fn now_pts() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
