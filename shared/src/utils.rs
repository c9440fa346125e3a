// Time helpers shared by the engine and its consumers.
// Indian exchanges quote in IST (UTC+05:30, no daylight saving).
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Epoch millis as exchange-local (IST) time.
pub fn millis_to_ist(ts_millis: i64) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_millis(ts_millis).map(|utc| utc.with_timezone(&ist_offset()))
}

/// Interprets a naive exchange-local timestamp as IST and returns epoch millis.
pub fn ist_naive_to_millis(naive: NaiveDateTime) -> Option<i64> {
    ist_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_ist_market_open_maps_to_utc() {
        // 09:15 IST is 03:45 UTC
        let naive = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        let millis = ist_naive_to_millis(naive).unwrap();
        assert_eq!(millis % 86_400_000, (3 * 3600 + 45 * 60) * 1000);
        let local = millis_to_ist(millis).unwrap();
        assert_eq!(local.naive_local(), naive);
    }
}
