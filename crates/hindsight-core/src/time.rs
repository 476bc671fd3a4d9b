//! The `yyyyMMdd_HHmmss_fff` file-stamp format used by segments,
//! snapshots, and clips.

use chrono::{DateTime, NaiveDateTime, Utc};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
const STAMP_FORMAT_SECONDS: &str = "%Y%m%d_%H%M%S";

/// Render a UTC instant as a millisecond-precision file stamp,
/// e.g. `20250301_142559_017`.
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Parse a file stamp produced by [`format_stamp`]. Stamps from older runs
/// without the millisecond suffix parse too.
pub fn parse_stamp(stem: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stem, STAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stem, STAMP_FORMAT_SECONDS))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stamp_round_trips_at_millisecond_precision() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 14, 25, 59).unwrap()
            + chrono::TimeDelta::milliseconds(17);
        let stamp = format_stamp(at);
        assert_eq!(stamp, "20250301_142559_017");
        assert_eq!(parse_stamp(&stamp), Some(at));
    }

    #[test]
    fn second_precision_stamps_still_parse() {
        let parsed = parse_stamp("20240615_080102").unwrap();
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2024, 6, 15, 8, 1, 2).unwrap()
        );
    }

    #[test]
    fn garbage_does_not_parse() {
        assert_eq!(parse_stamp("not_a_stamp"), None);
        assert_eq!(parse_stamp("2024"), None);
    }
}
