//! Session controller.
//!
//! All process-wide UI state lives here: whether detection is running, whether
//! the raw video surface is shown, and which prerequisites (capture source,
//! detector) are available. Every read and write goes through one lock, so the
//! controller is the single writer of these flags. A condition variable wakes
//! the detection worker when detection is switched on or the session shuts down.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

pub const HIDE_VIDEO_LABEL: &str = "Hide Video";
pub const SHOW_VIDEO_LABEL: &str = "Show Video";
pub const START_DETECTING_LABEL: &str = "Start Detecting";
pub const STOP_DETECTING_LABEL: &str = "Stop Detecting";

/// Point-in-time copy of the session flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub detecting: bool,
    pub video_visible: bool,
    pub source_ready: bool,
    pub detector_ready: bool,
    pub shutdown: bool,
}

impl SessionSnapshot {
    pub fn video_label(&self) -> &'static str {
        if self.video_visible {
            HIDE_VIDEO_LABEL
        } else {
            SHOW_VIDEO_LABEL
        }
    }

    pub fn detect_label(&self) -> &'static str {
        if self.detecting {
            STOP_DETECTING_LABEL
        } else {
            START_DETECTING_LABEL
        }
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            detecting: false,
            video_visible: true,
            source_ready: false,
            detector_ready: false,
            shutdown: false,
        }
    }
}

/// Outcome of waiting for detection to be switched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Detecting,
    TimedOut,
    Shutdown,
}

#[derive(Debug, Default)]
pub struct Session {
    state: Mutex<SessionSnapshot>,
    changed: Condvar,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.lock()
    }

    pub fn is_detecting(&self) -> bool {
        self.lock().detecting
    }

    pub fn is_video_visible(&self) -> bool {
        self.lock().video_visible
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub fn video_label(&self) -> &'static str {
        self.snapshot().video_label()
    }

    pub fn detect_label(&self) -> &'static str {
        self.snapshot().detect_label()
    }

    pub fn mark_source_ready(&self) {
        self.lock().source_ready = true;
    }

    pub fn mark_detector_ready(&self) {
        self.lock().detector_ready = true;
    }

    /// Show or hide the raw video surface.
    ///
    /// Returns the new visibility, or `None` when there is no capture source.
    pub fn toggle_video(&self) -> Option<bool> {
        let mut state = self.lock();
        if !state.source_ready {
            return None;
        }
        state.video_visible = !state.video_visible;
        Some(state.video_visible)
    }

    /// Start or stop the detection cycle.
    ///
    /// Returns the new flag, or `None` when the capture source or the detector
    /// is missing. Stopping never cancels a request already in flight.
    pub fn toggle_detecting(&self) -> Option<bool> {
        let mut state = self.lock();
        if !state.source_ready || !state.detector_ready {
            return None;
        }
        state.detecting = !state.detecting;
        let detecting = state.detecting;
        drop(state);
        self.changed.notify_all();
        Some(detecting)
    }

    /// Switch detection off for the duration of a capture. Returns the previous flag.
    pub fn pause_detection(&self) -> bool {
        let mut state = self.lock();
        std::mem::replace(&mut state.detecting, false)
    }

    /// Switch detection on after a capture, whatever the state before it.
    pub fn resume_detection(&self) {
        self.lock().detecting = true;
        self.changed.notify_all();
    }

    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.changed.notify_all();
    }

    /// Block until detection is on, the session shuts down, or `timeout` passes.
    pub fn wait_until_detecting(&self, timeout: Duration) -> WaitOutcome {
        let guard = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| !s.detecting && !s.shutdown)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.shutdown {
            WaitOutcome::Shutdown
        } else if state.detecting {
            WaitOutcome::Detecting
        } else {
            WaitOutcome::TimedOut
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        // Plain flags; a panicked holder cannot leave them inconsistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ready_session() -> Session {
        let session = Session::new();
        session.mark_source_ready();
        session.mark_detector_ready();
        session
    }

    #[test]
    fn toggles_are_noops_without_prerequisites() {
        let session = Session::new();
        assert_eq!(session.toggle_video(), None);
        assert_eq!(session.toggle_detecting(), None);

        session.mark_source_ready();
        assert_eq!(session.toggle_detecting(), None);
        assert!(!session.is_detecting());
        assert_eq!(session.detect_label(), START_DETECTING_LABEL);
    }

    #[test]
    fn toggling_video_twice_restores_visibility_and_label() {
        let session = ready_session();
        let before = (session.is_video_visible(), session.video_label());
        assert_eq!(before, (true, HIDE_VIDEO_LABEL));

        assert_eq!(session.toggle_video(), Some(false));
        assert_eq!(session.video_label(), SHOW_VIDEO_LABEL);

        assert_eq!(session.toggle_video(), Some(true));
        assert_eq!((session.is_video_visible(), session.video_label()), before);
    }

    #[test]
    fn toggling_detection_relabels_control() {
        let session = ready_session();
        assert_eq!(session.toggle_detecting(), Some(true));
        assert_eq!(session.detect_label(), STOP_DETECTING_LABEL);
        assert_eq!(session.toggle_detecting(), Some(false));
        assert_eq!(session.detect_label(), START_DETECTING_LABEL);
    }

    #[test]
    fn pause_and_resume_report_previous_state() {
        let session = ready_session();
        assert!(!session.pause_detection());
        session.resume_detection();
        assert!(session.is_detecting());
        assert!(session.pause_detection());
        assert!(!session.is_detecting());
    }

    #[test]
    fn waiters_wake_on_toggle_and_shutdown() {
        let session = Arc::new(ready_session());
        assert_eq!(
            session.wait_until_detecting(Duration::from_millis(10)),
            WaitOutcome::TimedOut
        );

        let waiter = {
            let session = session.clone();
            std::thread::spawn(move || session.wait_until_detecting(Duration::from_secs(5)))
        };
        session.toggle_detecting();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Detecting);

        session.shutdown();
        assert_eq!(
            session.wait_until_detecting(Duration::from_secs(5)),
            WaitOutcome::Shutdown
        );
    }
}
