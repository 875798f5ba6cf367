//! Decoding of CF-convention time axes (`<unit> since <reference>`).

use crate::assembly::error::AssemblyError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

const SECONDS_PER_DAY: i64 = 86_400;
/// Offsets beyond about 290 million years cannot be represented by chrono.
const MAX_OFFSET_MS: f64 = 9.0e18;
const NOLEAP_MONTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const LEAP_MONTHS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Calendars found on model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// Mixed Gregorian/Julian, proleptic Gregorian and `standard`. Decoded as proleptic
    /// Gregorian.
    Standard,
    NoLeap,
    AllLeap,
    Day360,
}

impl Calendar {
    pub fn parse(name: Option<&str>) -> Result<Self, AssemblyError> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(Calendar::Standard);
        };
        match name.to_ascii_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" | "julian" => Ok(Calendar::Standard),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            _ => Err(AssemblyError::Calendar(name.to_string())),
        }
    }

    fn year_length(self) -> i64 {
        match self {
            Calendar::Standard | Calendar::NoLeap => 365,
            Calendar::AllLeap => 366,
            Calendar::Day360 => 360,
        }
    }

    /// Day count of `(year, month, day)` in this calendar, from year 0. Standard uses
    /// chrono instead.
    fn day_number(self, year: i32, month: u32, day: u32) -> Option<i64> {
        let month_offset: i64 = match self {
            Calendar::Standard => return None,
            Calendar::NoLeap => NOLEAP_MONTHS[..(month as usize - 1)]
                .iter()
                .map(|&d| d as i64)
                .sum(),
            Calendar::AllLeap => LEAP_MONTHS[..(month as usize - 1)]
                .iter()
                .map(|&d| d as i64)
                .sum(),
            Calendar::Day360 => 30 * (month as i64 - 1),
        };
        Some(year as i64 * self.year_length() + month_offset + day as i64 - 1)
    }

    /// Maps a day number of this calendar onto a real date.
    ///
    /// `noleap` dates exist in every real year. `all_leap` February 29ths in common years
    /// have no real counterpart and yield `None`. `360_day` days are spread over the real
    /// year by day-of-year scaling, which keeps them unique and ordered.
    fn to_real_date(self, day_number: i64) -> Option<NaiveDate> {
        let length = self.year_length();
        let year = i32::try_from(day_number.div_euclid(length)).ok()?;
        let day_of_year = day_number.rem_euclid(length) as u32;
        match self {
            Calendar::Standard => None,
            Calendar::NoLeap => month_day(year, day_of_year, &NOLEAP_MONTHS),
            Calendar::AllLeap => month_day(year, day_of_year, &LEAP_MONTHS),
            Calendar::Day360 => {
                let real_length = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                    366
                } else {
                    365
                };
                let scaled = day_of_year * real_length / 360;
                NaiveDate::from_yo_opt(year, scaled + 1)
            }
        }
    }
}

fn month_day(year: i32, mut day_of_year: u32, months: &[u32; 12]) -> Option<NaiveDate> {
    for (index, &length) in months.iter().enumerate() {
        if day_of_year < length {
            return NaiveDate::from_ymd_opt(year, index as u32 + 1, day_of_year + 1);
        }
        day_of_year -= length;
    }
    None
}

/// A parsed `units` attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub seconds_per_unit: f64,
    pub reference: NaiveDateTime,
}

impl TimeUnits {
    /// Parses strings such as `days since 1850-01-01`, `hours since 1950-1-1 00:00:00` or
    /// `seconds since 2015-01-01T12:00:00Z`.
    pub fn parse(units: &str) -> Result<Self, AssemblyError> {
        let invalid = || AssemblyError::TimeUnits(units.to_string());
        let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;
        let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => 86_400.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3_600.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            _ => return Err(invalid()),
        };
        let reference = parse_reference(reference.trim()).ok_or_else(invalid)?;
        Ok(Self {
            seconds_per_unit,
            reference,
        })
    }
}

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim_end_matches('Z');
    let (date, time) = match text.split_once(['T', ' ']) {
        Some((date, time)) => (date, Some(time.trim())),
        None => (text, None),
    };

    let mut date_parts = date.splitn(3, '-');
    let year: i32 = date_parts.next()?.parse().ok()?;
    let month: u32 = date_parts.next()?.parse().ok()?;
    let day: u32 = date_parts.next()?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    // Drop a trailing UTC offset such as "+00:00" or " UTC".
    let time = time
        .map(|t| t.split([' ', '+']).next().unwrap_or(t))
        .filter(|t| !t.is_empty());
    let time = match time {
        None => NaiveTime::MIN,
        Some(t) => {
            let mut parts = t.splitn(3, ':');
            let hour: u32 = parts.next()?.parse().ok()?;
            let minute: u32 = parts.next().map(str::parse::<u32>).transpose().ok()?.unwrap_or(0);
            let second: f64 = parts.next().map(str::parse::<f64>).transpose().ok()?.unwrap_or(0.0);
            let whole = second.trunc() as u32;
            let millis = ((second - second.trunc()) * 1000.0).round() as u32;
            NaiveTime::from_hms_milli_opt(hour, minute, whole, millis)?
        }
    };
    Some(date.and_time(time))
}

/// Converts raw time values to timestamps.
///
/// Entries that have no real-calendar date (see [`Calendar`]) or are not finite are
/// `None`.
pub fn decode_time_axis(
    values: &[f64],
    units: &str,
    calendar: Option<&str>,
) -> Result<Vec<Option<NaiveDateTime>>, AssemblyError> {
    let units = TimeUnits::parse(units)?;
    let calendar = Calendar::parse(calendar)?;

    let decoded = values
        .iter()
        .map(|&value| {
            let offset_ms = (value * units.seconds_per_unit * 1000.0).round();
            if !offset_ms.is_finite() || offset_ms.abs() > MAX_OFFSET_MS {
                return None;
            }
            decode_one(calendar, units.reference, offset_ms as i64)
        })
        .collect();
    Ok(decoded)
}

fn decode_one(calendar: Calendar, reference: NaiveDateTime, offset_ms: i64) -> Option<NaiveDateTime> {
    if calendar == Calendar::Standard {
        return reference.checked_add_signed(TimeDelta::try_milliseconds(offset_ms)?);
    }

    let date = reference.date();
    let reference_day = calendar.day_number(date.year(), date.month(), date.day())?;
    let time = reference.time();
    let reference_ms =
        time.num_seconds_from_midnight() as i64 * 1000 + (time.nanosecond() / 1_000_000) as i64;

    let total_ms = reference_day
        .checked_mul(SECONDS_PER_DAY * 1000)?
        .checked_add(reference_ms)?
        .checked_add(offset_ms)?;
    let day_number = total_ms.div_euclid(SECONDS_PER_DAY * 1000);
    let ms_of_day = total_ms.rem_euclid(SECONDS_PER_DAY * 1000);

    let date = calendar.to_real_date(day_number)?;
    let midnight = date.and_time(NaiveTime::MIN);
    midnight.checked_add_signed(TimeDelta::try_milliseconds(ms_of_day)?)
}
