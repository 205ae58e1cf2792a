//! Stage and execution id generation.

use parking_lot::{const_mutex, Mutex};
use uuid::Uuid;

static LAST_ID: Mutex<Option<Uuid>> = const_mutex(None);

/// Generates a process-unique, strictly increasing UUID v7.
///
/// Two ids minted in the same millisecond are ordered by bumping the random
/// tail of the previous id, so hyphenated string order matches creation order.
#[must_use]
pub fn generate_monotonic_id() -> Uuid {
    let candidate = Uuid::now_v7();
    let mut last = LAST_ID.lock();

    let next = match *last {
        Some(previous) if candidate <= previous => Uuid::from_u128(previous.as_u128() + 1),
        _ => candidate,
    };

    *last = Some(next);
    next
}

/// Returns a new stage id as a hyphenated lower-case string.
#[must_use]
pub fn next_stage_id() -> String {
    generate_monotonic_id().hyphenated().to_string()
}

/// Returns a new execution id as a hyphenated lower-case string.
#[must_use]
pub fn next_execution_id() -> String {
    generate_monotonic_id().hyphenated().to_string()
}
