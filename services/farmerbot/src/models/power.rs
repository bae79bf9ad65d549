//! Power policy.

use std::fmt;

use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Threshold used when none is configured.
pub const DEFAULT_WAKE_UP_THRESHOLD: u64 = 80;

/// Lowest accepted wake-up threshold.
pub const MIN_WAKE_UP_THRESHOLD: u64 = 50;

/// Highest accepted wake-up threshold.
pub const MAX_WAKE_UP_THRESHOLD: u64 = 80;

const WAKEUP_FORMAT: &str = "%I:%M%p";

/// Daily time of day (UTC) at which one sleeping node is woken.
///
/// Written as a 12-hour clock, e.g. `"08:30PM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WakeupTime(NaiveTime);

impl WakeupTime {
    pub fn new(time: NaiveTime) -> Self {
        Self(time)
    }

    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveTime::parse_from_str(s.trim(), WAKEUP_FORMAT).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// This time of day on the date of `now`.
    pub fn today(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.date_naive().and_time(self.0).and_utc()
    }

    /// The first occurrence at or after `now`.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.today(now);
        if today >= now {
            return today;
        }
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    }
}

impl Default for WakeupTime {
    fn default() -> Self {
        Self(NaiveTime::MIN)
    }
}

impl fmt::Display for WakeupTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WAKEUP_FORMAT))
    }
}

impl Serialize for WakeupTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WakeupTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(|e| {
            serde::de::Error::custom(format!("invalid wake-up time {s:?} (expected hh:mmAM/PM): {e}"))
        })
    }
}

/// Power policy of the farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Power {
    /// Farm usage percentage at which another node is woken.
    #[serde(default)]
    pub wake_up_threshold: u64,

    #[serde(rename = "periodicWakeUp", default)]
    pub periodic_wake_up: WakeupTime,
}

impl Default for Power {
    fn default() -> Self {
        Self {
            wake_up_threshold: DEFAULT_WAKE_UP_THRESHOLD,
            periodic_wake_up: WakeupTime::default(),
        }
    }
}

impl Power {
    /// Apply the default and clamp the threshold into range.
    ///
    /// Returns the policy and whether the configured threshold was out of
    /// range.
    pub fn normalized(mut self) -> (Self, bool) {
        if self.wake_up_threshold == 0 {
            self.wake_up_threshold = DEFAULT_WAKE_UP_THRESHOLD;
        }
        let clamped = self
            .wake_up_threshold
            .clamp(MIN_WAKE_UP_THRESHOLD, MAX_WAKE_UP_THRESHOLD);
        let out_of_range = clamped != self.wake_up_threshold;
        self.wake_up_threshold = clamped;
        (self, out_of_range)
    }

    /// The policy as reported to operators.
    pub fn status(&self, now: DateTime<Utc>) -> PowerStatus {
        PowerStatus {
            wake_up_threshold: self.wake_up_threshold,
            periodic_wake_up: self.periodic_wake_up,
            next_periodic_wake_up: self.periodic_wake_up.next_occurrence(now),
        }
    }
}

/// Power policy plus the next scheduled wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerStatus {
    pub wake_up_threshold: u64,
    #[serde(rename = "periodicWakeUp")]
    pub periodic_wake_up: WakeupTime,
    #[serde(rename = "nextPeriodicWakeUp")]
    pub next_periodic_wake_up: DateTime<Utc>,
}
