//! Calendar dates and the packed sequence/date stamp of ROM headers.
//!
//! Stamp bytes:
//! - `[0]`: sequence number bits 0..8;
//! - `[1]`: day-of-year bits 0..6 in bits 2..8, sequence bits 8..10 in bits 0..2;
//! - `[2]`: odd-year flag in bit 7, month - 1 in bits 3..7, day-of-year bits 6..9
//!   in bits 0..3;
//! - `[3]`: `(year - 1900) / 2`.
//!
//! The day of year counts from 0 (1 January).

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

const EPOCH_YEAR: u16 = 1900;
/// Last year the stamp can represent.
const LAST_YEAR: u16 = EPOCH_YEAR + 2 * 255 + 1;
/// Largest sequence number (10 bits).
pub const MAX_SEQUENCE: u16 = 0x3ff;

/// A proleptic Gregorian calendar date, serialised as `YYYY-MM-DD`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RomDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

fn is_leap(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn days_in_year(year: u16) -> u16 {
    if is_leap(year) {
        366
    } else {
        365
    }
}

impl RomDate {
    /// `None` unless the date exists.
    pub fn new(year: u16, month: u8, day: u8) -> Option<Self> {
        (day >= 1 && day <= days_in_month(year, month)).then_some(Self { year, month, day })
    }

    /// Date `ordinal` days after 1 January of `year`; rolls into later years.
    pub fn from_ordinal(mut year: u16, mut ordinal: u16) -> Self {
        while ordinal >= days_in_year(year) {
            ordinal -= days_in_year(year);
            year += 1;
        }
        let mut month = 1;
        while ordinal >= days_in_month(year, month) as u16 {
            ordinal -= days_in_month(year, month) as u16;
            month += 1;
        }
        Self {
            year,
            month,
            day: ordinal as u8 + 1,
        }
    }

    /// Days since 1 January of the same year.
    pub fn ordinal(&self) -> u16 {
        (1..self.month)
            .map(|m| days_in_month(self.year, m) as u16)
            .sum::<u16>()
            + self.day as u16
            - 1
    }

    /// Today's date in UTC.
    pub fn today_utc() -> Self {
        let days = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(0);
        civil_from_days(days as i64)
    }
}

/// Days since 1970-01-01 to a civil date (H. Hinnant's algorithm).
fn civil_from_days(days: i64) -> RomDate {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    RomDate {
        year: year.clamp(0, u16::MAX as i64) as u16,
        month,
        day,
    }
}

impl fmt::Display for RomDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for RomDate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("invalid date `{s}` (expected YYYY-MM-DD)");
        let mut parts = s.trim().splitn(3, '-');
        let mut next = || parts.next().and_then(|p| p.parse().ok());
        let (Some(year), Some(month), Some(day)) = (next(), next(), next()) else {
            return Err(bad());
        };
        let month = u8::try_from(month).map_err(|_| bad())?;
        let day = u8::try_from(day).map_err(|_| bad())?;
        RomDate::new(year, month, day).ok_or_else(bad)
    }
}

impl TryFrom<String> for RomDate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RomDate> for String {
    fn from(date: RomDate) -> Self {
        date.to_string()
    }
}

struct Unpacked {
    sequence: u16,
    ordinal: u16,
    year: u16,
    month: u8,
    date: RomDate,
}

fn unpack(stamp: [u8; 4]) -> Unpacked {
    let ordinal = (u16::from(stamp[2] & 0b111) << 6) | u16::from(stamp[1] >> 2);
    let year = EPOCH_YEAR + 2 * u16::from(stamp[3]) + u16::from(stamp[2] >> 7);
    Unpacked {
        sequence: u16::from(stamp[0]) | (u16::from(stamp[1] & 0b11) << 8),
        ordinal,
        year,
        month: ((stamp[2] & 0x7f) >> 3) + 1,
        date: RomDate::from_ordinal(year, ordinal),
    }
}

/// Unpack a header stamp into `(sequence, date)`.
///
/// The date comes from the year and day-of-year bits; a disagreeing month
/// field is logged.
pub(crate) fn decode_stamp(stamp: [u8; 4]) -> (u16, RomDate) {
    let Unpacked {
        sequence,
        ordinal,
        year,
        month,
        date,
    } = unpack(stamp);
    if date.month != month || date.year != year {
        warn!(
            "inconsistent ROM date stamp: day {ordinal} of {year} is {date}, \
             but month field says {month}"
        );
    }
    (sequence, date)
}

/// Whether `stamp` unpacks to exactly `(sequence, date)`.
pub(crate) fn stamp_reads_as(stamp: [u8; 4], sequence: u16, date: &RomDate) -> bool {
    let unpacked = unpack(stamp);
    unpacked.sequence == sequence && unpacked.date == *date
}

/// Pack `(sequence, date)`; `None` when either does not fit.
pub(crate) fn encode_stamp(sequence: u16, date: &RomDate) -> Option<[u8; 4]> {
    if sequence > MAX_SEQUENCE || !(EPOCH_YEAR..=LAST_YEAR).contains(&date.year) {
        return None;
    }
    let ordinal = date.ordinal();
    let years = date.year - EPOCH_YEAR;
    Some([
        (sequence & 0xff) as u8,
        (((ordinal & 0x3f) << 2) as u8) | ((sequence >> 8) & 0b11) as u8,
        (((years % 2) << 7) as u8) | ((date.month - 1) << 3) | (ordinal >> 6) as u8,
        (years / 2) as u8,
    ])
}
