//! Date handling for upstream formats: everything on the league site is
//! local Europe/Berlin time, labels are German (`12.10.2025, 17:00`).

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Berlin;
use once_cell::sync::Lazy;
use regex::Regex;

/// All parsed timestamps are pinned to the Berlin UTC offset in effect at
/// that local time, so serialized values stay unambiguous.
pub type BerlinTime = DateTime<FixedOffset>;

pub fn berlin_now() -> BerlinTime {
    Utc::now().with_timezone(&Berlin).fixed_offset()
}

pub fn berlin_local(naive: NaiveDateTime) -> Option<BerlinTime> {
    Berlin
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}

static DATE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<day>\d{1,2})\.(?P<month>\d{1,2})\.(?P<year>\d{2,4})(?:,\s*(?P<hour>\d{1,2}):(?P<minute>\d{2}))?")
        .unwrap()
});

/// Parse a German date label (`DD.MM.YYYY` with an optional `, HH:MM`)
/// anywhere in the given text. Two-digit years are 2000-based.
pub fn parse_date_label(value: &str) -> Option<BerlinTime> {
    let caps = DATE_LABEL_RE.captures(value)?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let month: u32 = caps.name("month")?.as_str().parse().ok()?;
    let mut year: i32 = caps.name("year")?.as_str().parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    let hour: u32 = caps
        .name("hour")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let minute: u32 = caps
        .name("minute")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    berlin_local(date.and_hms_opt(hour, minute, 0)?)
}

/// True when the text begins with something shaped like a German date,
/// even if the date itself turns out to be invalid.
pub fn starts_with_date_label(value: &str) -> bool {
    DATE_LABEL_RE
        .find(value)
        .map_or(false, |m| m.start() == 0)
}

pub const GERMAN_WEEKDAYS: [&str; 7] = ["Mo", "Di", "Mi", "Do", "Fr", "Sa", "So"];
pub const GERMAN_WEEKDAYS_LONG: [&str; 7] = [
    "Montag",
    "Dienstag",
    "Mittwoch",
    "Donnerstag",
    "Freitag",
    "Samstag",
    "Sonntag",
];
pub const GERMAN_MONTHS: [&str; 12] = [
    "Januar",
    "Februar",
    "März",
    "April",
    "Mai",
    "Juni",
    "Juli",
    "August",
    "September",
    "Oktober",
    "November",
    "Dezember",
];

pub fn german_weekday(value: &BerlinTime) -> &'static str {
    GERMAN_WEEKDAYS[value.weekday().num_days_from_monday() as usize]
}

/// `Sonntag, 12. Oktober 2025 um 17:00`
pub fn format_generation_timestamp(value: &BerlinTime) -> String {
    let weekday = GERMAN_WEEKDAYS_LONG[value.weekday().num_days_from_monday() as usize];
    let month = GERMAN_MONTHS[value.month0() as usize];
    format!(
        "{weekday}, {day:02}. {month} {year} um {time}",
        day = value.day(),
        year = value.year(),
        time = value.format("%H:%M"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_labels_with_and_without_time() {
        let with_time = parse_date_label("Stand: 12.10.2025, 17:05 Uhr").unwrap();
        assert_eq!(with_time.format("%d.%m.%Y %H:%M").to_string(), "12.10.2025 17:05");

        let date_only = parse_date_label("03.01.24").unwrap();
        assert_eq!(date_only.format("%d.%m.%Y %H:%M").to_string(), "03.01.2024 00:00");

        assert!(parse_date_label("kein Datum").is_none());
    }

    #[test]
    fn berlin_offset_follows_daylight_saving() {
        let winter = parse_date_label("15.01.2025").unwrap();
        assert_eq!(winter.offset().local_minus_utc(), 3600);

        let summer = parse_date_label("15.06.2025").unwrap();
        assert_eq!(summer.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn formats_generation_timestamps_in_german() {
        let value = parse_date_label("12.10.2025, 17:00").unwrap();
        assert_eq!(
            format_generation_timestamp(&value),
            "Sonntag, 12. Oktober 2025 um 17:00"
        );
    }
}
