//! Market clock and schedule parameters.
//!
//! Schedule parameters are military integers (`HHMM`). Every "start of day"
//! is the start of the current day in Bogota, resolved as a real instant.

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::America::Bogota;
use chrono_tz::Tz;

pub const MARKET_TIME_ZONE: Tz = Bogota;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("'{0}' is not a military time (HHMM)")]
    InvalidMilitaryTime(String),
    #[error("{name} must be a positive number of seconds, got {value}")]
    InvalidRate { name: &'static str, value: i64 },
    #[error("market close {close} must be after market open {open}")]
    CloseBeforeOpen {
        open: MilitaryTime,
        close: MilitaryTime,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MilitaryTime {
    hour: u32,
    minute: u32,
}

impl MilitaryTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidMilitaryTime(format!(
                "{hour:02}{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn from_hhmm(value: i64) -> Result<Self, ScheduleError> {
        if !(0..=2359).contains(&value) {
            return Err(ScheduleError::InvalidMilitaryTime(value.to_string()));
        }
        Self::new((value / 100) as u32, (value % 100) as u32)
            .map_err(|_| ScheduleError::InvalidMilitaryTime(value.to_string()))
    }

    pub fn parse(text: &str) -> Result<Self, ScheduleError> {
        let value = text
            .trim()
            .parse::<i64>()
            .map_err(|_| ScheduleError::InvalidMilitaryTime(text.trim().to_string()))?;
        Self::from_hhmm(value)
    }

    fn from_minutes(minutes: i64) -> Self {
        let clamped = minutes.clamp(0, 23 * 60 + 59);
        Self {
            hour: (clamped / 60) as u32,
            minute: (clamped % 60) as u32,
        }
    }

    pub fn minutes_from_midnight(self) -> i64 {
        i64::from(self.hour) * 60 + i64::from(self.minute)
    }

    pub fn seconds_from_midnight(self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60
    }

    pub fn as_hhmm(self) -> i64 {
        i64::from(self.hour) * 100 + i64::from(self.minute)
    }
}

impl fmt::Display for MilitaryTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.hour, self.minute)
    }
}

/// Wall-clock time at which end-of-day curve clients re-poll.
pub fn default_eod_reset() -> MilitaryTime {
    MilitaryTime {
        hour: 20,
        minute: 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSchedule {
    pub open: MilitaryTime,
    pub close: MilitaryTime,
    pub pre_eod: MilitaryTime,
    pub final_eod: MilitaryTime,
    pub intra_rate_secs: i64,
    pub market_rate_secs: i64,
}

impl MarketSchedule {
    pub fn validate(self) -> Result<Self, ScheduleError> {
        if self.intra_rate_secs <= 0 {
            return Err(ScheduleError::InvalidRate {
                name: "intra_rate",
                value: self.intra_rate_secs,
            });
        }
        if self.market_rate_secs <= 0 {
            return Err(ScheduleError::InvalidRate {
                name: "market_rate",
                value: self.market_rate_secs,
            });
        }
        if self.close <= self.open {
            return Err(ScheduleError::CloseBeforeOpen {
                open: self.open,
                close: self.close,
            });
        }
        Ok(self)
    }

    /// Last intraday run of the day: market open stepped by the intraday
    /// rate (whole minutes, at least one) while staying before the close.
    /// A rate that is not a multiple of 60 rounds down to whole minutes.
    pub fn last_intraday_execution(&self) -> MilitaryTime {
        let step = (self.intra_rate_secs / 60).max(1);
        let end = self.close.minutes_from_midnight();
        let mut last = self.open.minutes_from_midnight();
        while last + step < end {
            last += step;
        }
        MilitaryTime::from_minutes(last)
    }
}

pub fn market_now(now: DateTime<Utc>) -> DateTime<Tz> {
    now.with_timezone(&MARKET_TIME_ZONE)
}

/// Calendar day in Bogota for `now`.
pub fn valuation_date(now: DateTime<Utc>) -> NaiveDate {
    market_now(now).date_naive()
}

fn start_of_day_on(date: NaiveDate, fallback: i64) -> i64 {
    MARKET_TIME_ZONE
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|start| start.timestamp())
        .unwrap_or(fallback)
}

/// Epoch seconds of the start of the current Bogota day.
pub fn start_of_market_day(now: DateTime<Utc>) -> i64 {
    let local = market_now(now);
    let elapsed = i64::from(local.num_seconds_from_midnight());
    start_of_day_on(local.date_naive(), now.timestamp() - elapsed)
}

/// Epoch seconds of `time` on the current Bogota day.
pub fn at_market_time(now: DateTime<Utc>, time: MilitaryTime) -> i64 {
    start_of_market_day(now) + time.seconds_from_midnight()
}

/// Epoch seconds of the next occurrence of `time`, today if still ahead.
pub fn next_market_time(now: DateTime<Utc>, time: MilitaryTime) -> i64 {
    let today = at_market_time(now, time);
    if today > now.timestamp() {
        return today;
    }
    let tomorrow = valuation_date(now)
        .checked_add_days(Days::new(1))
        .map(|date| start_of_day_on(date, start_of_market_day(now) + 86_400))
        .unwrap_or(start_of_market_day(now) + 86_400);
    tomorrow + time.seconds_from_midnight()
}
