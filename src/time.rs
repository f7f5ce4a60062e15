use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Half-open `[start_ms, end_ms)` window in UTC milliseconds covering one
/// local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl DayWindow {
    pub fn contains(&self, ms: i64) -> bool {
        self.start_ms <= ms && ms < self.end_ms
    }
}

/// The local calendar date that `ms` falls on in `tz`.
pub fn local_date(tz: Tz, ms: i64) -> NaiveDate {
    let utc = DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default();
    utc.with_timezone(&tz).date_naive()
}

fn local_midnight_ms(tz: Tz, date: NaiveDate) -> i64 {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        // Midnight skipped by a DST jump; the day starts at the first valid instant.
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.timestamp_millis())
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive).timestamp_millis())
        }
    }
}

/// Window of the local day containing `now_ms`.
pub fn day_window(tz: Tz, now_ms: i64) -> DayWindow {
    let date = local_date(tz, now_ms);
    let next = date.succ_opt().unwrap_or(date);
    DayWindow {
        start_ms: local_midnight_ms(tz, date),
        end_ms: local_midnight_ms(tz, next),
    }
}
