// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider timestamp codec.
//!
//! Two encodings are in use:
//!
//! - **Tick counts**: 100-nanosecond intervals since 1601-01-01T00:00:00,
//!   used for `TIME_CREATED` on events. Converted with [`from_1601`].
//! - **CIM datetime strings**: `yyyymmddHHMMSS.mmmmmmsUUU`, where any
//!   element may be replaced by stars to act as a wildcard. Converted with
//!   [`WmiTime::to_wmi_time`] and [`parse_wmi_time`].
//!
//! ```text
//! 2026 10 18 14 05 09 . 123456 +060
//! |yr |mo|dy|hh|mm|ss| |usec  |tz |
//! ```

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use std::fmt;

/// Element widths of a CIM datetime, in order.
const WIDTHS: [usize; 6] = [4, 2, 2, 2, 2, 2];
const MICROS_WIDTH: usize = 6;
const TZ_WIDTH: usize = 4;

fn epoch_1601() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1601, 1, 1)?.and_hms_opt(0, 0, 0)
}

/// Convert a tick count (100 ns units since 1601) to a naive timestamp.
///
/// Sub-microsecond precision is dropped (integer division by 10). No timezone
/// adjustment is applied.
pub fn from_1601(ticks: u64) -> Result<NaiveDateTime> {
    let micros = i64::try_from(ticks / 10).map_err(|_| Error::InvalidTimestamp(ticks.to_string()))?;
    epoch_1601()
        .and_then(|base| base.checked_add_signed(Duration::microseconds(micros)))
        .ok_or_else(|| Error::InvalidTimestamp(ticks.to_string()))
}

/// Convert a tick count carried as decimal text.
pub fn from_1601_str(raw: &str) -> Result<NaiveDateTime> {
    let ticks: u64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidTimestamp(raw.to_string()))?;
    from_1601(ticks)
}

/// A possibly partial CIM datetime.
///
/// `None` elements render as stars and act as wildcards in queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WmiTime {
    pub year: Option<u32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hours: Option<u32>,
    pub minutes: Option<u32>,
    pub seconds: Option<u32>,
    pub microseconds: Option<u32>,
    /// UTC offset element, kept verbatim (`+060`, `-300`).
    pub timezone: Option<String>,
}

impl WmiTime {
    /// Fully specified date and time, no sub-second part or timezone.
    pub fn new(year: u32, month: u32, day: u32, hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
            hours: Some(hours),
            minutes: Some(minutes),
            seconds: Some(seconds),
            microseconds: None,
            timezone: None,
        }
    }

    /// Date only; time elements stay wildcards.
    pub fn date(year: u32, month: u32, day: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
            ..Self::default()
        }
    }

    /// Set the microseconds element.
    #[must_use]
    pub fn with_microseconds(mut self, microseconds: u32) -> Self {
        self.microseconds = Some(microseconds);
        self
    }

    /// Set the timezone element verbatim.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Set the timezone element from a UTC offset in minutes (`+060`).
    #[must_use]
    pub fn with_offset_minutes(mut self, minutes: i32) -> Self {
        let sign = if minutes < 0 { '-' } else { '+' };
        self.timezone = Some(format!("{}{:03}", sign, minutes.unsigned_abs()));
        self
    }

    /// True when every element is present.
    pub fn is_complete(&self) -> bool {
        self.year.is_some()
            && self.month.is_some()
            && self.day.is_some()
            && self.hours.is_some()
            && self.minutes.is_some()
            && self.seconds.is_some()
            && self.microseconds.is_some()
            && self.timezone.is_some()
    }

    /// Render as a provider datetime string.
    ///
    /// Present elements are right-justified with `'0'` to their width;
    /// absent ones become that many `*`.
    pub fn to_wmi_time(&self) -> String {
        fn push(out: &mut String, value: Option<String>, width: usize) {
            match value {
                Some(v) => {
                    for _ in v.chars().count()..width {
                        out.push('0');
                    }
                    out.push_str(&v);
                }
                None => out.extend(std::iter::repeat('*').take(width)),
            }
        }

        let date_parts = [
            self.year,
            self.month,
            self.day,
            self.hours,
            self.minutes,
            self.seconds,
        ];
        let mut out = String::with_capacity(25);
        for (value, width) in date_parts.iter().zip(WIDTHS) {
            push(&mut out, value.map(|v| v.to_string()), width);
        }
        out.push('.');
        push(&mut out, self.microseconds.map(|v| v.to_string()), MICROS_WIDTH);
        push(&mut out, self.timezone.clone(), TZ_WIDTH);
        out
    }

    /// Build from a timezone-aware timestamp.
    pub fn from_datetime(dt: &DateTime<FixedOffset>) -> Self {
        let offset_minutes = dt.offset().local_minus_utc() / 60;
        Self {
            year: u32::try_from(dt.year()).ok(),
            month: Some(dt.month()),
            day: Some(dt.day()),
            hours: Some(dt.hour()),
            minutes: Some(dt.minute()),
            seconds: Some(dt.second()),
            microseconds: Some(dt.nanosecond() % 1_000_000_000 / 1_000),
            timezone: None,
        }
        .with_offset_minutes(offset_minutes)
    }

    /// Convert back to a timezone-aware timestamp.
    ///
    /// Every element must be present and the timezone must be a signed
    /// minute offset.
    pub fn to_datetime(&self) -> Result<DateTime<FixedOffset>> {
        let invalid = || Error::InvalidTimestamp(self.to_wmi_time());
        if !self.is_complete() {
            return Err(invalid());
        }
        let offset_minutes: i32 = self
            .timezone
            .as_deref()
            .and_then(|tz| tz.trim().parse().ok())
            .ok_or_else(invalid)?;
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(invalid)?;
        let naive = NaiveDate::from_ymd_opt(
            self.year.and_then(|y| i32::try_from(y).ok()).ok_or_else(invalid)?,
            self.month.unwrap_or_default(),
            self.day.unwrap_or_default(),
        )
        .and_then(|date| {
            date.and_hms_micro_opt(
                self.hours.unwrap_or_default(),
                self.minutes.unwrap_or_default(),
                self.seconds.unwrap_or_default(),
                self.microseconds.unwrap_or_default(),
            )
        })
        .ok_or_else(invalid)?;
        offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(invalid)
    }
}

impl fmt::Display for WmiTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wmi_time())
    }
}

/// Split a provider datetime string into its elements.
///
/// Elements that are stars, malformed or missing come back as `None`; the
/// timezone is the verbatim remainder after the microseconds.
pub fn parse_wmi_time(raw: &str) -> WmiTime {
    fn int(raw: &str, start: usize, end: usize) -> Option<u32> {
        raw.get(start..end)?.parse().ok()
    }

    let timezone = raw.get(21..).filter(|tz| !tz.is_empty()).map(str::to_string);
    WmiTime {
        year: int(raw, 0, 4),
        month: int(raw, 4, 6),
        day: int(raw, 6, 8),
        hours: int(raw, 8, 10),
        minutes: int(raw, 10, 12),
        seconds: int(raw, 12, 14),
        microseconds: int(raw, 15, 21),
        timezone,
    }
}
