//! Data-version ledger state machine.
//!
//! Within a market day a component moves `intraday -> pre_eod -> final_eod`;
//! the init job resets every component to version 1 each business day.

use chrono::{DateTime, Utc};

use crate::contract::{Component, NextStatus, VersionRecord};
use crate::schedule::{at_market_time, next_market_time, MarketSchedule, MilitaryTime};

/// Fresh ledger row written by the init job.
pub fn reset_record(
    component: Component,
    now: DateTime<Utc>,
    schedule: &MarketSchedule,
) -> VersionRecord {
    VersionRecord {
        component,
        version: 1,
        next_update: at_market_time(now, schedule.open) + schedule.intra_rate_secs,
        next_status: NextStatus::Intraday,
    }
}

/// Ledger update after an intraday job wrote new documents.
pub fn advance_intraday(
    record: &VersionRecord,
    now: DateTime<Utc>,
    schedule: &MarketSchedule,
) -> VersionRecord {
    let last_run = at_market_time(now, schedule.last_intraday_execution());
    let (next_status, next_update) = if now.timestamp() >= last_run {
        (NextStatus::PreEod, at_market_time(now, schedule.pre_eod))
    } else {
        (NextStatus::Intraday, now.timestamp() + schedule.intra_rate_secs)
    };
    VersionRecord {
        component: record.component,
        version: record.version + 1,
        next_update,
        next_status,
    }
}

/// Ledger update after an end-of-day job wrote new documents.
pub fn advance_end_of_day(
    record: &VersionRecord,
    now: DateTime<Utc>,
    schedule: &MarketSchedule,
) -> VersionRecord {
    VersionRecord {
        component: record.component,
        version: record.version + 1,
        next_update: at_market_time(now, schedule.final_eod),
        next_status: NextStatus::FinalEod,
    }
}

pub fn pre_eod_reached(now: DateTime<Utc>, schedule: &MarketSchedule) -> bool {
    now.timestamp() >= at_market_time(now, schedule.pre_eod)
}

/// Seconds a polling client should wait before asking again.
pub fn client_wait(record: &VersionRecord, now: DateTime<Utc>, market_rate_secs: i64) -> i64 {
    let remaining = record.next_update - now.timestamp();
    match record.next_status {
        NextStatus::Intraday | NextStatus::FinalEod => remaining,
        NextStatus::PreEod if remaining >= 0 => remaining,
        NextStatus::PreEod => market_rate_secs,
    }
}

/// Wait used by intraday curve clients: zero once the intraday phase ends.
pub fn intraday_only_wait(record: &VersionRecord, now: DateTime<Utc>) -> i64 {
    match record.next_status {
        NextStatus::Intraday => record.next_update - now.timestamp(),
        NextStatus::PreEod | NextStatus::FinalEod => 0,
    }
}

/// Seconds until end-of-day curve clients should re-poll.
pub fn eod_reset_wait(now: DateTime<Utc>, eod_reset: MilitaryTime) -> i64 {
    next_market_time(now, eod_reset) - now.timestamp()
}
