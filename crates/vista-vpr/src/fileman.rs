//! FileMan date conversion.
//!
//! VistA encodes dates as `YYYMMDD[.HHMMSS]` where `YYY` is the year
//! offset from 1700. `3250819.1146` is 2025-08-19 11:46:00. The
//! fractional part is read in 2-digit groups left to right and each group
//! is optional; a lone trailing digit is a truncated decimal, so `.1`
//! means 10 o'clock, not 01.

use chrono::{NaiveDate, NaiveDateTime};

/// FileMan's year zero.
const YEAR_OFFSET: i32 = 1700;

/// Convert a FileMan date to an ISO-8601 timestamp
/// (`YYYY-MM-DDTHH:MM:SS`).
///
/// Returns `None` for anything that is not a valid FileMan date resolving
/// to a real calendar date.
pub fn fileman_to_iso(raw: &str) -> Option<String> {
    parse_fileman(raw).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Parse a FileMan date into a `NaiveDateTime`.
pub fn parse_fileman(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    let (date_part, time_part) = match trimmed.split_once('.') {
        Some((d, t)) => (d, Some(t)),
        None => (trimmed, None),
    };

    if date_part.len() != 7 || !date_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = date_part[..3].parse::<i32>().ok()? + YEAR_OFFSET;
    let month: u32 = date_part[3..5].parse().ok()?;
    let day: u32 = date_part[5..7].parse().ok()?;

    let (hour, minute, second) = match time_part {
        Some(t) => parse_time_fraction(t)?,
        None => (0, 0, 0),
    };

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Whether a string looks like a FileMan date.
pub fn looks_like_fileman(raw: &str) -> bool {
    let trimmed = raw.trim();
    let date_part = trimmed.split_once('.').map(|(d, _)| d).unwrap_or(trimmed);
    date_part.len() == 7 && trimmed.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

fn parse_time_fraction(fraction: &str) -> Option<(u32, u32, u32)> {
    if fraction.len() > 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // A truncated decimal keeps its place value: ".1" is ".10".
    let mut padded = fraction.to_string();
    if padded.len() % 2 == 1 {
        padded.push('0');
    }
    let group = |i: usize| -> Option<u32> {
        if padded.len() >= (i + 1) * 2 {
            padded[i * 2..(i + 1) * 2].parse().ok()
        } else {
            Some(0)
        }
    };
    let (hour, minute, second) = (group(0)?, group(1)?, group(2)?);
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    Some((hour, minute, second))
}
