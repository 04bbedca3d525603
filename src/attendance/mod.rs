//! Attendance snapshots: capture the current frame, ask for a name, and save
//! it as a timestamped PNG.

mod capture;
mod download;
mod filename;

pub use capture::{AttendanceDesk, CaptureOutcome, PendingCapture};
pub use download::{DirectorySink, DownloadSink};
pub use filename::{
    attendance_filename, attendance_stamp, attendance_stamp_readable, clock_12h, ordinal_day,
    ordinal_suffix,
};
