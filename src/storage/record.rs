//! Stored Record
//!
//! A string payload plus the absolute instant (epoch millis) it expires at.

use chrono::Utc;

/// Default time to live for records put without an explicit TTL (1 minute)
pub const DEFAULT_TTL_MS: i64 = 60_000;

/// Upper bound for caller-supplied TTLs (~100 years)
pub const MAX_TTL_MS: i64 = 3_153_600_000_000;

/// Current wall-clock time in milliseconds since the Unix epoch
#[inline]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Resolve the TTL actually applied to a put.
///
/// A missing TTL or one above [`MAX_TTL_MS`] falls back to [`DEFAULT_TTL_MS`].
/// Zero and negative values are kept as-is and yield an already expired record.
pub fn effective_ttl_ms(ttl_ms: Option<i64>) -> i64 {
    match ttl_ms {
        Some(ttl) if ttl <= MAX_TTL_MS => ttl,
        _ => DEFAULT_TTL_MS,
    }
}

/// Value stored under a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    value: String,
    expires_at: i64,
}

impl Record {
    /// Build a record that lives `ttl_ms` past `now`
    pub fn new(value: impl Into<String>, ttl_ms: i64, now: i64) -> Self {
        Self {
            value: value.into(),
            expires_at: now.saturating_add(ttl_ms),
        }
    }

    /// Build a record from an absolute expiration instant
    pub fn with_expiration(value: impl Into<String>, expires_at: i64) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_value(self) -> String {
        self.value
    }

    /// Expiration instant in epoch millis
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Remaining lifetime relative to `now`, negative once expired
    pub fn ttl_ms(&self, now: i64) -> i64 {
        self.expires_at.saturating_sub(now)
    }

    #[inline]
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at > now
    }

    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        !self.is_valid_at(now)
    }

    /// Shift the expiration instant by `delta_ms`
    pub(crate) fn rebase(&mut self, delta_ms: i64) {
        self.expires_at = self.expires_at.saturating_add(delta_ms);
    }
}
