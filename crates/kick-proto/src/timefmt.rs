use chrono::{DateTime, Utc};

use crate::model::parse_timestamp;

const NOT_AVAILABLE: &str = "N/A";

/// Relative "time ago" phrase for an ISO timestamp, measured from `now`.
///
/// Buckets: seconds < 60, minutes < 60, hours < 24, days < 30,
/// months (30 days) < 12, then years (12 months).
pub fn humanize_time(iso: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(then) = parse_timestamp(iso) else {
        return NOT_AVAILABLE.to_string();
    };
    let seconds = (now - then).num_seconds();

    if seconds < 60 {
        return relative(seconds, "second");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return relative(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return relative(hours, "hour");
    }
    let days = hours / 24;
    if days < 30 {
        return relative(days, "day");
    }
    let months = days / 30;
    if months < 12 {
        return relative(months, "month");
    }
    relative(months / 12, "year")
}

/// English phrasing with numeric-auto wording for 0 and 1 where it
/// exists ("now", "yesterday", "last month").
fn relative(amount: i64, unit: &str) -> String {
    match (amount, unit) {
        (0, "second") => return "now".to_string(),
        (1, "day") => return "yesterday".to_string(),
        (1, "month") => return "last month".to_string(),
        (1, "year") => return "last year".to_string(),
        (0, _) => return format!("this {}", unit),
        _ => {}
    }
    if amount < 0 {
        let n = -amount;
        return format!("in {} {}", n, pluralize(n, unit));
    }
    format!("{} {} ago", amount, pluralize(amount, unit))
}

fn pluralize(n: i64, unit: &str) -> String {
    if n == 1 {
        unit.to_string()
    } else {
        format!("{}s", unit)
    }
}

/// Medium date + short time, e.g. `Nov 9, 2025, 9:00 PM` (UTC).
pub fn format_full_date_time(iso: Option<&str>) -> String {
    match parse_timestamp(iso) {
        Some(dt) => dt.format("%b %-d, %Y, %-I:%M %p").to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 9, 21, 0, 0).unwrap()
    }

    fn ago(d: Duration) -> String {
        (now() - d).to_rfc3339()
    }

    #[test]
    fn hour_ago() {
        let iso = ago(Duration::seconds(3600));
        assert_eq!(humanize_time(Some(&iso), now()), "1 hour ago");
        // deterministic for a fixed reference
        assert_eq!(humanize_time(Some(&iso), now()), humanize_time(Some(&iso), now()));
    }

    #[test]
    fn buckets() {
        assert_eq!(humanize_time(Some(&ago(Duration::seconds(0))), now()), "now");
        assert_eq!(humanize_time(Some(&ago(Duration::seconds(45))), now()), "45 seconds ago");
        assert_eq!(humanize_time(Some(&ago(Duration::minutes(1))), now()), "1 minute ago");
        assert_eq!(humanize_time(Some(&ago(Duration::hours(5))), now()), "5 hours ago");
        assert_eq!(humanize_time(Some(&ago(Duration::days(1))), now()), "yesterday");
        assert_eq!(humanize_time(Some(&ago(Duration::days(12))), now()), "12 days ago");
        assert_eq!(humanize_time(Some(&ago(Duration::days(31))), now()), "last month");
        assert_eq!(humanize_time(Some(&ago(Duration::days(100))), now()), "3 months ago");
        assert_eq!(humanize_time(Some(&ago(Duration::days(370))), now()), "last year");
        assert_eq!(humanize_time(Some(&ago(Duration::days(800))), now()), "2 years ago");
    }

    #[test]
    fn future_and_missing() {
        assert_eq!(
            humanize_time(Some(&(now() + Duration::seconds(30)).to_rfc3339()), now()),
            "in 30 seconds"
        );
        assert_eq!(humanize_time(None, now()), "N/A");
        assert_eq!(humanize_time(Some("garbage"), now()), "N/A");
    }

    #[test]
    fn full_date_time() {
        assert_eq!(
            format_full_date_time(Some("2025-11-09T21:00:00Z")),
            "Nov 9, 2025, 9:00 PM"
        );
        assert_eq!(format_full_date_time(Some("")), "N/A");
    }
}
