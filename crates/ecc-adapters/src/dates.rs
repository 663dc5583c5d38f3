//! Lenient date parsing for the shapes results pages actually print.

use chrono::{Datelike, Local, NaiveDate};

use crate::patterns::{BARE_DAY_MONTH, FULL_DATE};

const FORMATS: &[&str] = &[
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%Y-%m-%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d.%m.%y",
    "%d/%m/%y",
];

fn plausible(date: NaiveDate) -> bool {
    (1900..=2100).contains(&date.year())
}

/// Parses `text` against today's local date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    parse_date_at(text, Local::now().date_naive())
}

/// Tries the fixed formats, then an embedded `D.M.YYYY`/`D/M/YYYY`, then a
/// bare `D.M` whose year is inferred relative to `today`.
pub fn parse_date_at(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if plausible(date) {
                return Some(date);
            }
        }
    }

    if let Some(date) = find_full_date(text) {
        return Some(date);
    }

    find_day_month(text, today)
}

/// First `D.M.YYYY` or `D/M/YYYY` anywhere in `text` that names a real day.
pub fn find_full_date(text: &str) -> Option<NaiveDate> {
    FULL_DATE.captures_iter(text).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// First bare `D.M` without a trailing year, with the year inferred.
pub fn find_day_month(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    BARE_DAY_MONTH
        .captures_iter(text)
        .filter(|caps| caps.get(3).is_none())
        .find_map(|caps| {
            let day = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            infer_year(day, month, today)
        })
}

/// Day and month with an explicit year; two-digit years follow the `%y` pivot.
pub fn date_with_year(day: u32, month: u32, year: &str) -> Option<NaiveDate> {
    let text = format!("{day}.{month}.{year}");
    ["%d.%m.%Y", "%d.%m.%y"].iter().find_map(|format| {
        NaiveDate::parse_from_str(&text, format)
            .ok()
            .filter(|date| plausible(*date))
    })
}

/// Year for a day-month pair so the result never lies after `today`.
pub fn infer_year(day: u32, month: u32, today: NaiveDate) -> Option<NaiveDate> {
    let mut year = today.year();
    if month > today.month() {
        year -= 1;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    if date > today {
        return NaiveDate::from_ymd_opt(year - 1, month, day);
    }
    Some(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_fixed_formats() {
        let today = d(2025, 3, 1);
        let cases = [
            ("10.12.2024", d(2024, 12, 10)),
            ("10/12/2024", d(2024, 12, 10)),
            ("2024-12-10", d(2024, 12, 10)),
            ("10 December 2024", d(2024, 12, 10)),
            ("10 Dec 2024", d(2024, 12, 10)),
            ("December 10, 2024", d(2024, 12, 10)),
            ("Dec 10, 2024", d(2024, 12, 10)),
            ("10.12.24", d(2024, 12, 10)),
            ("10/12/24", d(2024, 12, 10)),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_date_at(text, today), Some(expected), "{text}");
        }
    }

    #[test]
    fn finds_dates_embedded_in_longer_text() {
        let today = d(2025, 3, 1);
        assert_eq!(parse_date_at("10.12.2024 21:00", today), Some(d(2024, 12, 10)));
        assert_eq!(parse_date_at("Played 5/11/2024", today), Some(d(2024, 11, 5)));
        assert_eq!(parse_date_at("10.12. 21:00", today), Some(d(2024, 12, 10)));
    }

    #[test]
    fn bare_day_month_never_lands_in_the_future() {
        assert_eq!(parse_date_at("31.12", d(2025, 1, 10)), Some(d(2024, 12, 31)));
        assert_eq!(parse_date_at("10.12", d(2024, 12, 15)), Some(d(2024, 12, 10)));
        assert_eq!(parse_date_at("20.12", d(2024, 12, 15)), Some(d(2023, 12, 20)));
        assert_eq!(parse_date_at("05.01", d(2025, 1, 10)), Some(d(2025, 1, 5)));
    }

    #[test]
    fn rejects_non_dates() {
        let today = d(2025, 3, 1);
        for text in ["", "   ", "not a date", "32.13", "2:1"] {
            assert_eq!(parse_date_at(text, today), None, "{text:?}");
        }
    }

    #[test]
    fn explicit_year_matches_fixed_format_reading() {
        assert_eq!(date_with_year(10, 12, "2023"), Some(d(2023, 12, 10)));
        assert_eq!(date_with_year(10, 12, "23"), Some(d(2023, 12, 10)));
        assert_eq!(
            date_with_year(10, 12, "23"),
            parse_date_at("10.12.23", d(2025, 6, 15))
        );
        assert_eq!(date_with_year(31, 2, "24"), None);
        assert_eq!(date_with_year(1, 1, "0099"), None);
    }

    #[test]
    fn leap_day_resolves_only_in_leap_years() {
        // no 29 February in 2025
        assert_eq!(parse_date_at("29.02", d(2025, 3, 1)), None);
        assert_eq!(parse_date_at("29.02", d(2024, 3, 1)), Some(d(2024, 2, 29)));
    }
}
