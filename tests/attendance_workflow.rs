use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tempfile::tempdir;

use attendance_cam::{
    AttendanceDesk, CaptureOutcome, DirectorySink, Frame, LatestFrame, Session,
};

fn ready_session() -> Arc<Session> {
    let session = Arc::new(Session::new());
    session.mark_source_ready();
    session.mark_detector_ready();
    session
}

fn march_21_afternoon() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 21)
        .and_then(|d| d.and_hms_opt(14, 5, 0))
        .unwrap()
}

#[test]
fn named_capture_writes_png_and_resumes_detection() -> Result<()> {
    let dir = tempdir()?;
    let session = ready_session();
    let frames = LatestFrame::new();
    frames.publish(Frame::filled(32, 24, [200, 10, 10], 7)?);

    let mut desk = AttendanceDesk::new(session.clone(), frames, DirectorySink::new(dir.path()))
        .with_clock(march_21_afternoon);

    let pending = desk.begin()?.expect("frame available");
    assert!(!session.is_detecting(), "detection pauses while naming");

    let outcome = desk.complete(pending, Some("Alice"))?;
    let expected = dir
        .path()
        .join("Alice_Thursday_March_21st_2024_present_at_2:05pm.png");
    assert_eq!(outcome, CaptureOutcome::Saved(expected.clone()));
    assert!(session.is_detecting());

    let saved = image::open(&expected)?.to_rgb8();
    assert_eq!(saved.dimensions(), (32, 24));
    assert_eq!(saved.get_pixel(0, 0).0, [200, 10, 10]);
    Ok(())
}

#[test]
fn declining_saves_nothing_and_still_resumes() -> Result<()> {
    let dir = tempdir()?;
    let session = ready_session();
    let frames = LatestFrame::new();
    frames.publish(Frame::filled(8, 8, [0, 0, 0], 1)?);
    let mut desk = AttendanceDesk::new(session.clone(), frames, DirectorySink::new(dir.path()));

    let pending = desk.begin()?.expect("frame available");
    assert_eq!(desk.complete(pending, None)?, CaptureOutcome::Declined);
    assert!(session.is_detecting());

    let pending = desk.begin()?.expect("frame available");
    assert_eq!(desk.complete(pending, Some("   "))?, CaptureOutcome::Declined);
    assert!(session.is_detecting());

    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn same_name_in_the_same_minute_overwrites() -> Result<()> {
    let dir = tempdir()?;
    let session = ready_session();
    let frames = LatestFrame::new();
    let mut desk = AttendanceDesk::new(session, frames.clone(), DirectorySink::new(dir.path()))
        .with_clock(march_21_afternoon);

    frames.publish(Frame::filled(4, 4, [9, 9, 9], 1)?);
    let pending = desk.begin()?.expect("frame available");
    desk.complete(pending, Some("Carol"))?;

    frames.publish(Frame::filled(4, 4, [50, 60, 70], 2)?);
    let pending = desk.begin()?.expect("frame available");
    let CaptureOutcome::Saved(path) = desk.complete(pending, Some("Carol"))? else {
        panic!("expected a saved capture");
    };

    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
    let saved = image::open(&path)?.to_rgb8();
    assert_eq!(saved.get_pixel(0, 0).0, [50, 60, 70]);
    Ok(())
}

#[test]
fn capture_is_ignored_until_camera_and_detector_are_ready() -> Result<()> {
    let dir = tempdir()?;
    let session = Arc::new(Session::new());
    let frames = LatestFrame::new();
    frames.publish(Frame::filled(4, 4, [0, 0, 0], 1)?);
    let desk = AttendanceDesk::new(session.clone(), frames, DirectorySink::new(dir.path()));

    assert!(desk.begin()?.is_none());
    session.mark_source_ready();
    assert!(desk.begin()?.is_none());
    assert!(!session.is_detecting());
    Ok(())
}
