//! Attendance record file names.
//!
//! `Alice` captured on Thursday 2024-03-21 at 14:05 becomes
//! `Alice_Thursday_March_21st_2024_present_at_2:05pm.png`.

use chrono::{Datelike, NaiveDateTime, Timelike};

/// English ordinal suffix for a day of the month; 11, 12 and 13 take "th".
pub fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

pub fn ordinal_day(day: u32) -> String {
    format!("{}{}", day, ordinal_suffix(day))
}

/// 12-hour clock without padding on the hour: `12:00am`, `2:05pm`.
pub fn clock_12h(at: &NaiveDateTime) -> String {
    let (pm, hour) = at.hour12();
    format!(
        "{}:{:02}{}",
        hour,
        at.minute(),
        if pm { "pm" } else { "am" }
    )
}

/// Human-readable stamp, e.g. `Thursday, March 21st, 2024 present at 2:05pm`.
pub fn attendance_stamp_readable(at: &NaiveDateTime) -> String {
    format!(
        "{}, {} {}, {} present at {}",
        at.format("%A"),
        at.format("%B"),
        ordinal_day(at.day()),
        at.year(),
        clock_12h(at)
    )
}

/// Readable stamp with every run of spaces and commas collapsed to one underscore.
pub fn attendance_stamp(at: &NaiveDateTime) -> String {
    attendance_stamp_readable(at)
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn attendance_filename(name: &str, at: &NaiveDateTime) -> String {
    format!("{}_{}.png", name, attendance_stamp(at))
}
