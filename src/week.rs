use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

// Date-times arrive as ISO-ish strings whose precision varies between server
// versions (`2024-03-04T08:00Z`, `2024-03-04T08:00:00`, ...).
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Monday and Sunday of the ISO week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = i64::from(date.weekday().num_days_from_monday());
    (
        date - Duration::days(offset),
        date + Duration::days(6 - offset),
    )
}

/// Steps forward from a start date, yielding the Monday/Sunday bounds of the
/// week containing each step, and stops once the end date is reached
/// (exclusive).
///
/// A plain value type: cloning it, or rebuilding it from the same arguments,
/// reproduces the same sequence.
#[derive(Debug, Clone)]
pub struct WeekIter {
    current: NaiveDate,
    end: NaiveDate,
    step: Duration,
}

impl WeekIter {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self::with_step(start, end, Duration::weeks(1))
    }

    pub fn with_step(start: NaiveDate, end: NaiveDate, step: Duration) -> Self {
        Self {
            current: start,
            end,
            step,
        }
    }
}

impl Iterator for WeekIter {
    type Item = (NaiveDate, NaiveDate);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.end {
            return None;
        }
        let bounds = week_bounds(self.current);
        self.current += self.step;
        Some(bounds)
    }
}

/// Parses a wire date, tolerating a trailing time part.
pub(crate) fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), DATE_FORMAT).ok()
}

pub(crate) fn parse_wire_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bounds_of_a_midweek_date() {
        assert_eq!(
            week_bounds(date(2024, 3, 6)),
            (date(2024, 3, 4), date(2024, 3, 10))
        );
    }

    #[test]
    fn bounds_are_identity_on_monday_and_land_on_sunday() {
        assert_eq!(
            week_bounds(date(2024, 3, 4)),
            (date(2024, 3, 4), date(2024, 3, 10))
        );
        assert_eq!(
            week_bounds(date(2024, 3, 10)),
            (date(2024, 3, 4), date(2024, 3, 10))
        );
    }

    #[test]
    fn iteration_stops_before_the_end_date() {
        let weeks: Vec<_> = WeekIter::new(date(2024, 3, 4), date(2024, 3, 18)).collect();
        assert_eq!(
            weeks,
            vec![
                (date(2024, 3, 4), date(2024, 3, 10)),
                (date(2024, 3, 11), date(2024, 3, 17)),
            ]
        );
    }

    #[test]
    fn iteration_is_restartable() {
        let iter = WeekIter::new(date(2024, 3, 4), date(2024, 5, 1));
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn custom_step_is_honored() {
        let weeks: Vec<_> =
            WeekIter::with_step(date(2024, 3, 4), date(2024, 4, 2), Duration::weeks(2)).collect();
        assert_eq!(
            weeks,
            vec![
                (date(2024, 3, 4), date(2024, 3, 10)),
                (date(2024, 3, 18), date(2024, 3, 24)),
                (date(2024, 4, 1), date(2024, 4, 7)),
            ]
        );
    }

    #[test]
    fn wire_dates_parse_with_and_without_time_part() {
        assert_eq!(parse_wire_date("2024-03-04"), Some(date(2024, 3, 4)));
        assert_eq!(parse_wire_date("2024-03-04T08:00Z"), Some(date(2024, 3, 4)));
        assert_eq!(parse_wire_date("nonsense"), None);

        let start = parse_wire_datetime("2024-03-04T08:00Z").unwrap();
        assert_eq!(start.date(), date(2024, 3, 4));
        assert_eq!(
            parse_wire_datetime("2024-03-04T08:00:00"),
            parse_wire_datetime("2024-03-04T08:00Z")
        );
    }
}
