/// Time ranges, request sizing and fixed-width chart bucketing

use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::models::{Bucket, ChartPoint, HistoricalSample, SensorType};

/// Largest page the feed endpoint will return
pub const MAX_RESULTS: u32 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeRange {
    TwelveHours,
    #[default]
    Day,
    Week,
    Month,
}

impl TimeRange {
    pub const ALL: [TimeRange; 4] = [
        TimeRange::TwelveHours,
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::TwelveHours => "12h",
            TimeRange::Day => "24h",
            TimeRange::Week => "1w",
            TimeRange::Month => "1m",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::TwelveHours => "12 Hours",
            TimeRange::Day => "24 Hours",
            TimeRange::Week => "1 Week",
            TimeRange::Month => "1 Month",
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            TimeRange::TwelveHours => Duration::hours(12),
            TimeRange::Day => Duration::hours(24),
            TimeRange::Week => Duration::weeks(1),
            TimeRange::Month => Duration::days(30),
        }
    }

    /// Slot width; the window is always a whole multiple of it
    pub fn interval(&self) -> Duration {
        match self {
            TimeRange::TwelveHours => Duration::minutes(30),
            TimeRange::Day => Duration::hours(1),
            TimeRange::Week => Duration::hours(12),
            TimeRange::Month => Duration::days(1),
        }
    }

    /// Records to request so the window is covered at the usual upload cadence
    pub fn results(&self) -> u32 {
        let wanted = match self {
            TimeRange::TwelveHours => 72, // ~10 min cadence
            TimeRange::Day => 144,        // ~10 min cadence
            TimeRange::Week => 504,       // ~20 min cadence
            TimeRange::Month => 720,      // ~1 hour cadence
        };
        wanted.min(MAX_RESULTS)
    }

    /// Number of slots `bucket` produces for this range
    pub fn slot_count(&self) -> usize {
        (self.window().whole_seconds() / self.interval().whole_seconds()) as usize + 1
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TimeRange::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown time range '{}' (expected 12h, 24h, 1w or 1m)", wanted))
    }
}

/// Fetch size for a range
pub fn results_for(range: TimeRange) -> u32 {
    range.results()
}

/// Floor a timestamp to a multiple of `interval` since the Unix epoch, in UTC
pub fn floor_to_interval(timestamp: OffsetDateTime, interval: Duration) -> OffsetDateTime {
    let utc = timestamp.to_offset(UtcOffset::UTC);
    let step = interval.whole_seconds().max(1);
    let remainder = utc.unix_timestamp().rem_euclid(step);
    utc - Duration::seconds(remainder) - Duration::nanoseconds(utc.nanosecond() as i64)
}

/// Project one sensor's values out of the history
pub fn series(history: &[HistoricalSample], sensor_type: SensorType) -> Vec<ChartPoint> {
    history
        .iter()
        .filter_map(|sample| {
            sample.get(sensor_type).map(|value| ChartPoint {
                timestamp: sample.timestamp,
                value,
            })
        })
        .collect()
}

#[derive(Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

/// Resample points into contiguous fixed-width buckets
///
/// Every slot from the floor of `now - window` to the floor of `now` is
/// present, even with no data. Points outside `[now - window, now]` are
/// ignored.
///
/// # Arguments
/// * `points` - Timestamped values in any order
/// * `range` - Selected range, giving the window and the slot width
/// * `now` - End of the window
///
/// # Returns
/// Buckets ascending by slot start, each holding the mean of its points or 0
pub fn bucket(points: &[ChartPoint], range: TimeRange, now: OffsetDateTime) -> Vec<Bucket> {
    let interval = range.interval();
    let step = interval.whole_seconds();
    let window_start = now - range.window();

    let first_slot = floor_to_interval(window_start, interval);
    let last_slot = floor_to_interval(now, interval);
    let slots = ((last_slot - first_slot).whole_seconds() / step) as usize + 1;

    let mut accumulators = vec![Accumulator::default(); slots];

    for point in points {
        if point.timestamp < window_start || point.timestamp > now {
            continue;
        }
        let slot = floor_to_interval(point.timestamp, interval);
        let index = ((slot - first_slot).whole_seconds() / step) as usize;
        if let Some(acc) = accumulators.get_mut(index) {
            acc.sum += point.value;
            acc.count += 1;
        }
    }

    accumulators
        .into_iter()
        .enumerate()
        .map(|(i, acc)| Bucket {
            slot_start: first_slot + interval * i as i32,
            value: if acc.count == 0 {
                0.0
            } else {
                acc.sum / acc.count as f64
            },
            samples: acc.count,
        })
        .collect()
}

/// `bucket` applied to one sensor's values from the history
pub fn bucket_history(
    history: &[HistoricalSample],
    sensor_type: SensorType,
    range: TimeRange,
    now: OffsetDateTime,
) -> Vec<Bucket> {
    bucket(&series(history, sensor_type), range, now)
}
