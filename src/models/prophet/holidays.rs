//! US holidays that move pharmaceutical demand.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// A dated holiday with its effect window in days around the date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holiday {
    pub name: &'static str,
    pub date: NaiveDate,
    pub lower_window: i64,
    pub upper_window: i64,
}

impl Holiday {
    fn new(name: &'static str, date: NaiveDate) -> Self {
        Self {
            name,
            date,
            lower_window: 0,
            upper_window: 1,
        }
    }

    fn with_lower_window(mut self, days: i64) -> Self {
        self.lower_window = days;
        self
    }

    /// First affected day.
    pub fn first_day(&self) -> NaiveDate {
        self.date + Duration::days(self.lower_window)
    }

    /// Last affected day (inclusive).
    pub fn last_day(&self) -> NaiveDate {
        self.date + Duration::days(self.upper_window)
    }
}

/// Pharma holiday calendar: US federal holidays plus the Thanksgiving
/// retail weekend.
#[derive(Debug, Clone, Copy, Default)]
pub struct PharmaCalendar;

impl PharmaCalendar {
    /// Holidays observed in `year`, in calendar order.
    pub fn holidays(&self, year: i32) -> Vec<Holiday> {
        let fixed = |month, day| NaiveDate::from_ymd_opt(year, month, day);
        let nth = |month, weekday, n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n);
        let last_monday_of_may =
            nth(5, Weekday::Mon, 5).or_else(|| nth(5, Weekday::Mon, 4));
        let thanksgiving = nth(11, Weekday::Thu, 4);

        let dated = [
            ("New Year", fixed(1, 1)),
            ("MLK Day", nth(1, Weekday::Mon, 3)),
            ("Presidents Day", nth(2, Weekday::Mon, 3)),
            ("Memorial Day", last_monday_of_may),
            ("Independence Day", fixed(7, 4)),
            ("Labor Day", nth(9, Weekday::Mon, 1)),
            ("Columbus Day", nth(10, Weekday::Mon, 2)),
            ("Veterans Day", fixed(11, 11)),
            ("Thanksgiving", thanksgiving),
            ("Black Friday", thanksgiving.map(|d| d + Duration::days(1))),
            ("Cyber Monday", thanksgiving.map(|d| d + Duration::days(4))),
            ("Christmas", fixed(12, 25)),
        ];

        dated
            .into_iter()
            .filter_map(|(name, date)| {
                let holiday = Holiday::new(name, date?);
                Some(if name == "Thanksgiving" {
                    holiday.with_lower_window(-1)
                } else {
                    holiday
                })
            })
            .collect()
    }

    /// Whether any holiday window touches the days `[start, end)`.
    pub fn touches(&self, start: NaiveDate, end: NaiveDate) -> bool {
        if end <= start {
            return false;
        }
        // Windows reach at most one day across a year boundary
        (start.year() - 1..=end.year()).any(|year| {
            self.holidays(year)
                .iter()
                .any(|h| h.first_day() < end && h.last_day() >= start)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn floating_holidays_2023() {
        let holidays = PharmaCalendar.holidays(2023);
        let find = |name: &str| holidays.iter().find(|h| h.name == name).unwrap().date;

        assert_eq!(holidays.len(), 12);
        assert_eq!(find("MLK Day"), date(2023, 1, 16));
        assert_eq!(find("Presidents Day"), date(2023, 2, 20));
        assert_eq!(find("Memorial Day"), date(2023, 5, 29));
        assert_eq!(find("Labor Day"), date(2023, 9, 4));
        assert_eq!(find("Columbus Day"), date(2023, 10, 9));
        assert_eq!(find("Thanksgiving"), date(2023, 11, 23));
        assert_eq!(find("Black Friday"), date(2023, 11, 24));
        assert_eq!(find("Cyber Monday"), date(2023, 11, 27));
    }

    #[test]
    fn memorial_day_when_may_has_four_mondays() {
        let holidays = PharmaCalendar.holidays(2024);
        let memorial = holidays.iter().find(|h| h.name == "Memorial Day").unwrap();
        assert_eq!(memorial.date, date(2024, 5, 27));
    }

    #[test]
    fn thanksgiving_window_starts_the_day_before() {
        let holidays = PharmaCalendar.holidays(2023);
        let thanksgiving = holidays.iter().find(|h| h.name == "Thanksgiving").unwrap();
        assert_eq!(thanksgiving.first_day(), date(2023, 11, 22));
        assert_eq!(thanksgiving.last_day(), date(2023, 11, 24));
    }

    #[test]
    fn weekly_buckets() {
        let calendar = PharmaCalendar;
        // Week of July 3rd 2023 contains Independence Day
        assert!(calendar.touches(date(2023, 7, 3), date(2023, 7, 10)));
        // Mid-August has no holidays
        assert!(!calendar.touches(date(2023, 8, 14), date(2023, 8, 21)));
        // New Year window of 2024 is reached from the last week of 2023
        assert!(calendar.touches(date(2023, 12, 26), date(2024, 1, 2)));
        assert!(!calendar.touches(date(2023, 8, 21), date(2023, 8, 21)));
    }
}
