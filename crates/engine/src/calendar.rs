use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use configuration::CalendarConfig;

use crate::error::EngineError;

/// The trading-hours collaborator. The engine consults it; it never computes
/// session boundaries itself.
pub trait TradingCalendar: Send + Sync {
    fn is_open(&self, ts: DateTime<Utc>) -> bool;

    /// The next instant at or after `ts` when the market is open.
    fn next_open(&self, ts: DateTime<Utc>) -> DateTime<Utc>;

    /// Which session a timestamp belongs to. Evening trade after the session
    /// open dates to the *next* exchange day, so the daily reset follows the
    /// exchange convention rather than wall-clock midnight.
    fn session_date(&self, ts: DateTime<Utc>) -> NaiveDate;
}

/// CME-style near-24x6 schedule for equity index futures.
///
/// Exchange-local (default America/Chicago):
/// - daily maintenance break 16:00-17:00, every day;
/// - Saturday closed all day;
/// - Sunday opens at 17:00;
/// - Friday closes at 16:00 for the weekend.
///
/// Holidays close the whole session they date to.
pub struct FuturesCalendar {
    tz: Tz,
    holidays: HashSet<NaiveDate>,
}

const MAINTENANCE_START_MIN: u32 = 16 * 60;
const SESSION_OPEN_MIN: u32 = 17 * 60;

impl FuturesCalendar {
    pub fn new(config: &CalendarConfig) -> Result<Self, EngineError> {
        let tz = Tz::from_str(&config.timezone)
            .map_err(|_| EngineError::InvalidTimezone(config.timezone.clone()))?;
        Ok(Self {
            tz,
            holidays: config.holidays.iter().copied().collect(),
        })
    }

    fn schedule_open(&self, local_minutes: u32, weekday: Weekday) -> bool {
        // Daily maintenance break.
        if (MAINTENANCE_START_MIN..SESSION_OPEN_MIN).contains(&local_minutes) {
            return false;
        }
        match weekday {
            Weekday::Sat => false,
            Weekday::Sun => local_minutes >= SESSION_OPEN_MIN,
            Weekday::Fri => local_minutes < MAINTENANCE_START_MIN,
            _ => true,
        }
    }
}

impl TradingCalendar for FuturesCalendar {
    fn is_open(&self, ts: DateTime<Utc>) -> bool {
        let local = ts.with_timezone(&self.tz);
        let minutes = local.hour() * 60 + local.minute();
        if !self.schedule_open(minutes, local.weekday()) {
            return false;
        }
        !self.holidays.contains(&self.session_date(ts))
    }

    fn next_open(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_open(ts) {
            return ts;
        }
        // Candidate: the next 17:00 local session open, skipping Saturdays
        // and holidays. Bounded scan; two weeks covers any holiday cluster
        // this calendar is configured with in practice.
        let local = ts.with_timezone(&self.tz);
        let mut day = local.date_naive();
        for _ in 0..21 {
            if let Some(open_naive) = day.and_hms_opt(17, 0, 0) {
                if let Some(open_local) = self.tz.from_local_datetime(&open_naive).earliest() {
                    let open_utc = open_local.with_timezone(&Utc);
                    if open_utc >= ts && self.is_open(open_utc) {
                        return open_utc;
                    }
                }
            }
            day += Duration::days(1);
        }
        ts
    }

    fn session_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        let local = ts.with_timezone(&self.tz);
        let minutes = local.hour() * 60 + local.minute();
        if minutes >= SESSION_OPEN_MIN {
            local.date_naive() + Duration::days(1)
        } else {
            local.date_naive()
        }
    }
}

/// Calendar for replaying recorded history: every bar in the record was
/// trading, and sessions follow the bars' UTC dates.
pub struct AlwaysOpen;

impl TradingCalendar for AlwaysOpen {
    fn is_open(&self, _ts: DateTime<Utc>) -> bool {
        true
    }

    fn next_open(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        ts
    }

    fn session_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> FuturesCalendar {
        FuturesCalendar::new(&CalendarConfig::default()).unwrap()
    }

    fn calendar_with_holiday(date: NaiveDate) -> FuturesCalendar {
        FuturesCalendar::new(&CalendarConfig {
            timezone: "America/Chicago".to_string(),
            holidays: vec![date],
        })
        .unwrap()
    }

    /// Builds a UTC timestamp from Chicago wall-clock time.
    fn chicago(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        chrono_tz::America::Chicago
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn open_midweek_and_closed_in_maintenance() {
        let cal = calendar();
        // Tuesday 2024-03-05 10:00 CT.
        assert!(cal.is_open(chicago(2024, 3, 5, 10, 0)));
        // Tuesday 16:30 CT is the maintenance break.
        assert!(!cal.is_open(chicago(2024, 3, 5, 16, 30)));
        // Reopens at 17:00.
        assert!(cal.is_open(chicago(2024, 3, 5, 17, 0)));
    }

    #[test]
    fn weekend_schedule() {
        let cal = calendar();
        // Friday 2024-03-08 15:59 open, 16:00 closed for the weekend.
        assert!(cal.is_open(chicago(2024, 3, 8, 15, 59)));
        assert!(!cal.is_open(chicago(2024, 3, 8, 17, 30)));
        // Saturday all day closed.
        assert!(!cal.is_open(chicago(2024, 3, 9, 11, 0)));
        // Sunday before 17:00 closed, after open.
        assert!(!cal.is_open(chicago(2024, 3, 10, 12, 0)));
        assert!(cal.is_open(chicago(2024, 3, 10, 17, 5)));
    }

    #[test]
    fn evening_trade_dates_to_next_session() {
        let cal = calendar();
        // Sunday 17:30 CT belongs to Monday's session.
        let sunday_evening = chicago(2024, 3, 10, 17, 30);
        assert_eq!(
            cal.session_date(sunday_evening),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
        // Monday 10:00 CT is still Monday's session.
        assert_eq!(
            cal.session_date(chicago(2024, 3, 11, 10, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
    }

    #[test]
    fn holiday_closes_the_whole_session() {
        let holiday = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let cal = calendar_with_holiday(holiday);
        // Wednesday evening July 3rd dates to the July 4th session: closed.
        assert!(!cal.is_open(chicago(2024, 7, 3, 18, 0)));
        assert!(!cal.is_open(chicago(2024, 7, 4, 10, 0)));
        // July 4th 17:00 dates to July 5th: open again.
        assert!(cal.is_open(chicago(2024, 7, 4, 17, 30)));
    }

    #[test]
    fn next_open_from_saturday_is_sunday_evening() {
        let cal = calendar();
        let saturday = chicago(2024, 3, 9, 11, 0);
        let next = cal.next_open(saturday);
        assert_eq!(next, chicago(2024, 3, 10, 17, 0));
    }

    #[test]
    fn next_open_of_open_instant_is_identity() {
        let cal = calendar();
        let ts = chicago(2024, 3, 5, 10, 0);
        assert_eq!(cal.next_open(ts), ts);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let config = CalendarConfig {
            timezone: "Mars/Olympus".to_string(),
            holidays: vec![],
        };
        assert!(FuturesCalendar::new(&config).is_err());
    }
}
