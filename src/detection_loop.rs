//! Detection cycle.
//!
//! One worker thread runs the request/result cycle as an explicit loop:
//! wait for the detecting flag, take the latest frame, run exactly one
//! detection, store its result, then check the flag again. Because the loop
//! awaits each result before deciding whether to continue, at most one
//! request is ever in flight. Each frame is detected at most once.
//!
//! Switching detection off never aborts a running request. The result is
//! still stored; the loop just stops issuing new ones.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::{Detection, SharedBackend};
use crate::frame::{Frame, LatestFrame};
use crate::session::{Session, WaitOutcome};

/// How long the idle worker sleeps between checks of the session flags.
const IDLE_WAIT: Duration = Duration::from_millis(250);
/// Back-off while detection is on but no new frame has been published.
const NO_FRAME_WAIT: Duration = Duration::from_millis(20);

// ----------------------------------------------------------------------------
// DetectionCycle: Idle / Requesting state machine
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Requesting,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub issued: u64,
    pub completed: u64,
    pub failed: u64,
    /// Failures since the last successful result.
    pub consecutive_failures: u64,
}

#[derive(Debug)]
pub struct DetectionCycle {
    state: CycleState,
    stats: CycleStats,
}

impl DetectionCycle {
    pub fn new() -> Self {
        Self {
            state: CycleState::Idle,
            stats: CycleStats::default(),
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Issue a request. Returns its 1-based request number.
    ///
    /// Fails when a request is already in flight.
    pub fn begin(&mut self) -> Result<u64> {
        if self.state == CycleState::Requesting {
            return Err(anyhow!(
                "detection request #{} still in flight",
                self.stats.issued
            ));
        }
        self.state = CycleState::Requesting;
        self.stats.issued += 1;
        Ok(self.stats.issued)
    }

    /// Record the outcome of the in-flight request and pick the next state.
    ///
    /// `Requesting` means the caller should issue the next request right away.
    /// Success or failure does not matter for re-arming; only `still_enabled` does.
    pub fn finish(&mut self, succeeded: bool, still_enabled: bool) -> CycleState {
        if succeeded {
            self.stats.completed += 1;
            self.stats.consecutive_failures = 0;
        } else {
            self.stats.failed += 1;
            self.stats.consecutive_failures += 1;
        }
        // Nothing is in flight until the caller re-issues with begin().
        self.state = CycleState::Idle;
        if still_enabled {
            CycleState::Requesting
        } else {
            CycleState::Idle
        }
    }
}

impl Default for DetectionCycle {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// SharedDetections: latest result list
// ----------------------------------------------------------------------------

/// Most recent detection results. Each cycle replaces the whole list.
#[derive(Clone, Debug, Default)]
pub struct SharedDetections {
    inner: Arc<Mutex<Vec<Detection>>>,
}

impl SharedDetections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, detections: Vec<Detection>) {
        *self.lock() = detections;
    }

    pub fn snapshot(&self) -> Vec<Detection> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Detection>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// DetectionWorker
// ----------------------------------------------------------------------------

pub struct DetectionWorker {
    session: Arc<Session>,
    frames: LatestFrame,
    detections: SharedDetections,
    backend: SharedBackend,
    stats: Arc<Mutex<CycleStats>>,
}

impl DetectionWorker {
    pub fn new(
        session: Arc<Session>,
        frames: LatestFrame,
        detections: SharedDetections,
        backend: SharedBackend,
    ) -> Self {
        Self {
            session,
            frames,
            detections,
            backend,
            stats: Arc::new(Mutex::new(CycleStats::default())),
        }
    }

    /// Handle for reading cycle counters from other threads.
    pub fn stats_handle(&self) -> Arc<Mutex<CycleStats>> {
        self.stats.clone()
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let join = std::thread::Builder::new()
            .name("detection".to_string())
            .spawn(move || self.run())?;
        Ok(join)
    }

    /// Run until the session shuts down.
    pub fn run(self) {
        let mut cycle = DetectionCycle::new();
        let mut last_sequence = None;
        loop {
            match self.session.wait_until_detecting(IDLE_WAIT) {
                WaitOutcome::Shutdown => break,
                WaitOutcome::TimedOut => continue,
                WaitOutcome::Detecting => {}
            }
            let frame = match self.frames.latest() {
                Some(frame) if last_sequence != Some(frame.sequence) => frame,
                _ => {
                    std::thread::sleep(NO_FRAME_WAIT);
                    continue;
                }
            };
            last_sequence = Some(frame.sequence);
            if self.step(&mut cycle, &frame) == CycleState::Idle {
                log::debug!("detection cycle idle after {} requests", cycle.stats().issued);
            }
        }
        log::debug!("detection worker stopped: {:?}", cycle.stats());
    }

    /// Issue one request for `frame`, store its result and report the next state.
    pub fn step(&self, cycle: &mut DetectionCycle, frame: &Frame) -> CycleState {
        let request = match cycle.begin() {
            Ok(request) => request,
            Err(err) => {
                log::error!("{}", err);
                return cycle.state();
            }
        };

        let outcome = self
            .backend
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))
            .and_then(|mut backend| backend.detect(frame));

        let succeeded = match outcome {
            Ok(results) => {
                log::trace!(
                    "detection request #{} on frame {}: {} objects",
                    request,
                    frame.sequence,
                    results.len()
                );
                self.detections.replace(results);
                true
            }
            Err(err) => {
                log::error!("detection request #{} failed: {:#}", request, err);
                false
            }
        };

        let next = cycle.finish(succeeded, self.session.is_detecting());
        let stats = cycle.stats();
        if stats.consecutive_failures > 0 && stats.consecutive_failures % 100 == 0 {
            log::warn!(
                "detector has failed {} requests in a row",
                stats.consecutive_failures
            );
        }
        *self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = stats;
        next
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectorBackend, StubBackend};

    struct FailingBackend;

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(anyhow!("model exploded"))
        }
    }

    fn ready_session(detecting: bool) -> Arc<Session> {
        let session = Arc::new(Session::new());
        session.mark_source_ready();
        session.mark_detector_ready();
        if detecting {
            session.toggle_detecting();
        }
        session
    }

    #[test]
    fn cycle_refuses_second_in_flight_request() -> Result<()> {
        let mut cycle = DetectionCycle::new();
        assert_eq!(cycle.begin()?, 1);
        assert!(cycle.begin().is_err());
        assert_eq!(cycle.finish(true, true), CycleState::Requesting);
        assert_eq!(cycle.begin()?, 2);
        assert_eq!(cycle.stats().issued, 2);
        Ok(())
    }

    #[test]
    fn cycle_goes_idle_when_disabled_mid_flight() -> Result<()> {
        let mut cycle = DetectionCycle::new();
        cycle.begin()?;
        assert_eq!(cycle.finish(true, false), CycleState::Idle);
        assert_eq!(cycle.state(), CycleState::Idle);
        assert_eq!(cycle.stats().completed, 1);
        Ok(())
    }

    #[test]
    fn step_stores_results_and_rearms_while_enabled() -> Result<()> {
        let session = ready_session(true);
        let detections = SharedDetections::new();
        let backend: SharedBackend = Arc::new(Mutex::new(StubBackend::with_detections(vec![
            Detection::new("person", 0.9, 1.0, 2.0, 3.0, 4.0),
        ])));
        let worker = DetectionWorker::new(
            session.clone(),
            LatestFrame::new(),
            detections.clone(),
            backend,
        );
        let frame = Frame::filled(10, 10, [0, 0, 0], 1)?;

        let mut cycle = DetectionCycle::new();
        assert_eq!(worker.step(&mut cycle, &frame), CycleState::Requesting);
        assert_eq!(detections.snapshot()[0].label, "person");
        assert_eq!(cycle.stats().issued, 1);
        Ok(())
    }

    #[test]
    fn failures_are_counted_and_do_not_stop_the_cycle() -> Result<()> {
        let session = ready_session(true);
        let detections = SharedDetections::new();
        detections.replace(vec![Detection::new("cup", 0.5, 0.0, 0.0, 1.0, 1.0)]);
        let backend: SharedBackend = Arc::new(Mutex::new(FailingBackend));
        let worker =
            DetectionWorker::new(session, LatestFrame::new(), detections.clone(), backend);
        let frame = Frame::filled(4, 4, [0, 0, 0], 1)?;

        let mut cycle = DetectionCycle::new();
        for _ in 0..3 {
            assert_eq!(worker.step(&mut cycle, &frame), CycleState::Requesting);
        }
        assert_eq!(cycle.stats().failed, 3);
        assert_eq!(cycle.stats().consecutive_failures, 3);
        assert_eq!(detections.len(), 1, "failed requests keep the previous overlay");
        assert_eq!(worker.stats_handle().lock().unwrap().failed, 3);
        Ok(())
    }
}
