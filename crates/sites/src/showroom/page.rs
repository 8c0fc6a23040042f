//! Extraction of embedded room data from Showroom pages.
//!
//! Room pages carry their state in `<script id="js-initial-data"
//! data-json="...">` and `<script id="js-live-data" data-json="...">`
//! tags. The attribute value is HTML-entity encoded JSON; live data
//! overlays initial data key by key.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::SiteError;
use crate::showroom::model::RoomStatus;

static INITIAL_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="js-initial-data"[^>]*\bdata-json="([^"]*)""#).unwrap()
});
static INITIAL_DATA_REV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-json="([^"]*)"[^>]*\bid="js-initial-data""#).unwrap()
});
static LIVE_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="js-live-data"[^>]*\bdata-json="([^"]*)""#).unwrap());
static LIVE_DATA_REV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-json="([^"]*)"[^>]*\bid="js-live-data""#).unwrap());

/// Parse the room state out of a room page body.
pub(crate) fn parse_room_page(html: &str) -> Result<RoomStatus, SiteError> {
    let initial = capture(html, &INITIAL_DATA_RE, &INITIAL_DATA_REV_RE);
    let live = capture(html, &LIVE_DATA_RE, &LIVE_DATA_REV_RE);

    if initial.is_none() && live.is_none() {
        return Err(SiteError::MalformedPage("no embedded room data".into()));
    }

    let mut merged = serde_json::Map::new();
    for blob in [initial, live].into_iter().flatten() {
        let decoded = decode_entities(&blob);
        let value: serde_json::Value = serde_json::from_str(&decoded)
            .map_err(|e| SiteError::MalformedPage(format!("bad room json: {e}")))?;
        if let serde_json::Value::Object(map) = value {
            merged.extend(map);
        }
    }

    serde_json::from_value(serde_json::Value::Object(merged))
        .map_err(|e| SiteError::MalformedPage(format!("unexpected room shape: {e}")))
}

fn capture(html: &str, re: &Regex, reversed: &Regex) -> Option<String> {
    re.captures(html)
        .or_else(|| reversed.captures(html))
        .map(|c| c[1].to_string())
}

/// Decode the handful of entities Showroom uses in attribute values.
fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Parse an upcoming broadcast time of the form "month/day hour:minute".
///
/// The site omits the year and reports JST; the year is inferred from
/// `now`, wrapping to the next year when the month has already passed.
/// Malformed input falls back to `now`, which makes the engine probe
/// immediately instead of never.
pub(crate) fn parse_upcoming_date(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some((month_day, clock)) = text.trim().split_once(' ') else {
        return now;
    };
    let Some((month, day)) = month_day.split_once('/') else {
        return now;
    };
    let Some((hour, minute)) = clock.split_once(':') else {
        return now;
    };

    let parsed = (|| {
        let month: u32 = month.parse().ok()?;
        let day: u32 = day.parse().ok()?;
        let hour: u32 = hour.parse().ok()?;
        let minute: u32 = minute.parse().ok()?;
        let jst_now = now + Duration::hours(9);
        let mut year = jst_now.year();
        if month < jst_now.month() {
            year += 1;
        }
        let naive: NaiveDateTime = NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, minute, 0)?;
        // JST is UTC+9 with no daylight saving.
        Some(DateTime::<Utc>::from_naive_utc_and_offset(
            naive - Duration::hours(9),
            Utc,
        ))
    })();

    parsed.unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = concat!(
        "<html><head></head><body>",
        r#"<script id="js-initial-data" data-json="{&quot;roomId&quot;:42,&quot;roomName&quot;:&quot;Mano&quot;,&quot;isLive&quot;:false,&quot;room&quot;:{&quot;room_url_key&quot;:&quot;mano&quot;}}"></script>"#,
        r#"<script id="js-live-data" data-json="{&quot;isLive&quot;:true,&quot;streamingUrlHls&quot;:&quot;https://hls/x.m3u8&quot;}"></script>"#,
        "</body></html>"
    );

    #[test]
    fn parses_and_merges_page_data() {
        let status = parse_room_page(PAGE).unwrap();
        assert_eq!(status.room_id, 42);
        assert_eq!(status.room_name, "Mano");
        assert_eq!(status.live_room.url_key, "mano");
        // live data overlays initial data
        assert!(status.is_live);
        assert_eq!(status.stream_url, "https://hls/x.m3u8");
    }

    #[test]
    fn reversed_attribute_order() {
        let html = r#"<script data-json="{&quot;roomId&quot;:7}" id="js-initial-data"></script>"#;
        let status = parse_room_page(html).unwrap();
        assert_eq!(status.room_id, 7);
    }

    #[test]
    fn page_without_data_is_rejected() {
        let err = parse_room_page("<html></html>").unwrap_err();
        assert!(matches!(err, SiteError::MalformedPage(_)));
    }

    #[test]
    fn upcoming_date_same_year() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let at = parse_upcoming_date("3/15 21:00", now);
        // 21:00 JST on 3/15 is 12:00 UTC.
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn upcoming_date_wraps_to_next_year() {
        let now = Utc.with_ymd_and_hms(2024, 11, 20, 0, 0, 0).unwrap();
        let at = parse_upcoming_date("1/5 18:30", now);
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 1, 5, 9, 30, 0).unwrap());
    }

    #[test]
    fn malformed_date_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_upcoming_date("TBD", now), now);
        assert_eq!(parse_upcoming_date("13:00", now), now);
        assert_eq!(parse_upcoming_date("x/y 1:2", now), now);
    }
}
