//! Time types for dryrun.
//!
//! Wall clock time is only used for run metadata (start/finish, report
//! duration), never to order execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall clock timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current time
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap a chrono datetime
    #[must_use]
    pub const fn from_datetime(value: DateTime<Utc>) -> Self {
        Self(value)
    }

    /// Underlying chrono datetime
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Duration since an earlier timestamp, saturating at zero
    #[must_use]
    pub fn duration_since(&self, earlier: &Timestamp) -> Duration {
        let delta = self.0.signed_duration_since(earlier.0);
        Duration::from_millis(delta.num_milliseconds().max(0).unsigned_abs())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// A duration between timestamps, millisecond resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Duration {
    millis: u64,
}

impl Duration {
    /// Zero duration
    #[must_use]
    pub const fn zero() -> Self {
        Self { millis: 0 }
    }

    /// Create from milliseconds
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    /// Total milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Fractional seconds, as shown in reports
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.millis as f64 / 1_000.0
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}
