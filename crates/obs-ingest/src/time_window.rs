//! Time-window filtering and missing-value substitution.
//!
//! Legacy files carry a scalar `date_time` attribute (`yyyymmddhh`) and a
//! float `time` variable of per-observation hour offsets. The filter turns
//! those into absolute timestamps, drops observations outside the window
//! and derives integer `yyyymmdd` / `hhmmss` vectors for the survivors.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use tracing::debug;

use obs_store::MISSING_FLOAT;

use crate::distribution::Distribution;
use crate::error::{IngestError, IngestResult};

/// Float magnitudes above this are treated as missing on ingest.
///
/// The substitution applies to `x > threshold` only: very negative values
/// pass through untouched. That asymmetry is longstanding pipeline
/// behavior and is kept as-is.
pub const MISSING_THRESHOLD: f32 = 1.0e8;

/// The assimilation window `(begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeWindow { begin, end }
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Half-open containment: `begin < t <= end`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.begin < t && t <= self.end
    }
}

/// Decode a `yyyymmddhh` reference timestamp.
pub fn decode_reference(date_time: i32) -> IngestResult<DateTime<Utc>> {
    let date = date_time / 100;
    let hour = date_time % 100;
    let year = date / 10000;
    let month = (date / 100 % 100) as u32;
    let day = (date % 100) as u32;
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .map(|d| d + Duration::seconds(i64::from(hour) * 3600))
        .ok_or_else(|| {
            IngestError::InvalidConfig(format!("unparseable date_time attribute: {}", date_time))
        })
}

/// Absolute observation times from a reference plus hour offsets,
/// rounded to second precision.
pub fn obs_times(reference: DateTime<Utc>, offsets_hours: &[f32]) -> Vec<DateTime<Utc>> {
    offsets_hours
        .iter()
        .map(|&h| reference + Duration::seconds((f64::from(h) * 3600.0).round() as i64))
        .collect()
}

/// Integer date/time fields derived for the retained observations, in
/// owned-index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedDateTime {
    /// `yyyy*10000 + mm*100 + dd`
    pub date: Vec<i32>,
    /// `hh*10000 + mm*100 + ss`
    pub time: Vec<i32>,
}

/// Drop the distribution's indices whose timestamp falls outside the
/// window, deriving date/time fields for the survivors.
pub fn apply_window(
    dist: &mut dyn Distribution,
    times: &[DateTime<Utc>],
    window: &TimeWindow,
) -> DerivedDateTime {
    let mut derived = DerivedDateTime::default();
    let mut to_remove = Vec::new();

    for &index in dist.index() {
        let t = times[index];
        if window.contains(t) {
            derived.date.push(t.year() * 10000 + t.month() as i32 * 100 + t.day() as i32);
            derived
                .time
                .push(t.hour() as i32 * 10000 + t.minute() as i32 * 100 + t.second() as i32);
        } else {
            to_remove.push(index);
        }
    }
    if !to_remove.is_empty() {
        debug!(dropped = to_remove.len(), "observations outside time window");
    }
    for index in to_remove {
        dist.erase(index);
    }
    derived
}

/// Replace out-of-range float values with the missing sentinel.
/// Returns how many values were substituted.
pub fn substitute_missing(values: &mut [f32]) -> usize {
    let mut count = 0;
    for v in values.iter_mut() {
        if *v > MISSING_THRESHOLD {
            *v = MISSING_FLOAT;
            count += 1;
        }
    }
    count
}
