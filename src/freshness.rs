/// Reading age classification against the provider's fixed UTC-5 clock.
///
/// SIATA publishes `date` as epoch seconds that encode the Colombian wall
/// clock, so the epoch is read as a naive calendar value and compared with
/// "now" shifted to the same fixed offset. There is no daylight-saving
/// adjustment in Colombia; the offset is constant.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Provider wall clock offset from UTC, in hours.
pub const PROVIDER_UTC_OFFSET_HOURS: i64 = -5;

/// Readings older than this are stale.
pub const STALE_AFTER_HOURS: i64 = 2;

/// Readings older than this mark the station as permanently inactive.
pub const INACTIVE_AFTER_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now". Collectors never read the wall clock directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a single instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Offset conversion
// ---------------------------------------------------------------------------

/// `now` as a naive calendar value on the provider's wall clock.
pub fn provider_now(now: DateTime<Utc>) -> NaiveDateTime {
    now.naive_utc() + Duration::hours(PROVIDER_UTC_OFFSET_HOURS)
}

/// Calendar value encoded by a provider epoch. `None` when out of range.
pub fn provider_wall_time(epoch_secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(epoch_secs, 0).map(|dt| dt.naive_utc())
}

/// Age of a reading at `now`. Negative when the provider clock runs ahead.
pub fn reading_age(now: DateTime<Utc>, epoch_secs: i64) -> Option<Duration> {
    provider_wall_time(epoch_secs).map(|observed| provider_now(now) - observed)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// At most 2 hours old; eligible for insertion.
    Fresh,
    /// Older than 2 hours, at most 24 hours.
    Stale,
    /// Older than 24 hours.
    Expired,
}

impl Freshness {
    pub fn classify(age: Duration) -> Self {
        if age > Duration::hours(INACTIVE_AFTER_HOURS) {
            Freshness::Expired
        } else if age > Duration::hours(STALE_AFTER_HOURS) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}
