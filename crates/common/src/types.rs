use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

static LAST_ISSUED_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Unique identifier for an order.
///
/// Freshly minted ids are the number of milliseconds since the Unix epoch
/// (UTC), rendered as a decimal string. Within a process the sequence is
/// strictly increasing: when two ids are requested in the same millisecond
/// the second one is bumped forward, so ids stay unique and roughly
/// chronological.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Mints a new time-derived order id.
    pub fn new() -> Self {
        Self(next_millis().to_string())
    }

    /// Wraps an existing identifier, e.g. one read back from storage or a message.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn next_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ISSUED_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_ISSUED_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// Current UTC time truncated to microseconds.
///
/// Postgres stores timestamps with microsecond precision; truncating up front
/// keeps in-memory and persisted orders comparable field by field.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
