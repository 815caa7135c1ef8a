//! Daily rotation scheduler.
//!
//! A single background thread checks the calendar date at a fixed interval
//! and rotates the sink once each time the date changes. Dates are compared,
//! not elapsed durations, so a day with a million writes and a day with none
//! both produce exactly one rotation.
//!
//! The date marker is advanced *before* `rotate` is called. A slow or
//! failing rotation can therefore never be attempted twice for the same
//! day; a failed rotation is reported and not retried until the next day.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use time::Date;

use crate::clock::Clock;
use crate::sink::RotatingSink;

/// First wait before probing a sink that was not ready. Doubles up to the
/// polling interval.
pub const READINESS_BACKOFF: Duration = Duration::from_millis(50);

const THREAD_NAME: &str = "daylog-rotator";

/// What happened when the scheduler decided to rotate.
#[derive(Debug)]
pub enum RotationEvent<'a> {
    /// The sink was rotated for `date`.
    Rotated { date: Date },
    /// Rotating for `date` failed. No retry happens before the next day.
    Failed { date: Date, error: &'a io::Error },
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    NotReady,
    Idle,
    Rotated,
    Failed,
}

/// State shared between the rotation thread and its handle.
#[derive(Debug)]
struct RotationState {
    last_rotation_date: Mutex<Date>,
    rotations: AtomicU64,
    failures: AtomicU64,
}

impl RotationState {
    fn new(today: Date) -> Self {
        Self {
            last_rotation_date: Mutex::new(today),
            rotations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn last_rotation_date(&self) -> Date {
        *self
            .last_rotation_date
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_last_rotation_date(&self, date: Date) {
        *self
            .last_rotation_date
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = date;
    }
}

/// The body of the rotation thread, kept apart from the thread so a check
/// can be driven step by step.
struct RotationTask<S: ?Sized, C, R> {
    sink: Arc<S>,
    clock: C,
    state: Arc<RotationState>,
    report: R,
}

impl<S, C, R> RotationTask<S, C, R>
where
    S: RotatingSink + ?Sized,
    C: Clock,
    R: FnMut(RotationEvent<'_>),
{
    fn check(&mut self) -> Check {
        if !self.sink.is_ready() {
            tracing::debug!("log sink not ready, skipping rotation check");
            return Check::NotReady;
        }

        let today = self.clock.today();
        if today == self.state.last_rotation_date() {
            return Check::Idle;
        }

        // Idle -> Rotating. The marker moves first so this day is never
        // rotated twice, even if `rotate` fails or stalls.
        self.state.set_last_rotation_date(today);
        match self.sink.rotate() {
            Ok(()) => {
                self.state.rotations.fetch_add(1, Ordering::SeqCst);
                (self.report)(RotationEvent::Rotated { date: today });
                Check::Rotated
            }
            Err(error) => {
                self.state.failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    "daily log rotation for {} failed, next attempt on the next day: {}",
                    today,
                    error
                );
                (self.report)(RotationEvent::Failed {
                    date: today,
                    error: &error,
                });
                Check::Failed
            }
        }
    }

    fn run(mut self, stop: Receiver<()>, interval: Duration) {
        let initial_backoff = READINESS_BACKOFF.min(interval);
        let mut backoff = initial_backoff;
        // The first check happens right away.
        let mut wait = Duration::ZERO;

        loop {
            match stop.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            wait = match self.check() {
                Check::NotReady => {
                    let current = backoff;
                    backoff = (backoff * 2).min(interval);
                    current
                }
                Check::Idle | Check::Rotated | Check::Failed => {
                    backoff = initial_backoff;
                    interval
                }
            };
        }
        tracing::debug!("daily rotation scheduler stopped");
    }
}

/// Handle to the background thread that rotates a sink once per calendar day.
///
/// Only one scheduler should run per sink. Dropping the handle stops the
/// thread.
#[derive(Debug)]
pub struct DailyRotationScheduler {
    state: Arc<RotationState>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DailyRotationScheduler {
    /// Start rotating `sink` whenever `clock` reports a new date, checking
    /// every `interval`. Rotations are reported as `tracing` events.
    pub fn spawn<S, C>(sink: Arc<S>, clock: C, interval: Duration) -> io::Result<Self>
    where
        S: RotatingSink + ?Sized + 'static,
        C: Clock + 'static,
    {
        Self::spawn_with_reporter(sink, clock, interval, trace_event)
    }

    /// Like [`spawn`](Self::spawn), but every rotation attempt is passed to
    /// `report` on the scheduler thread.
    pub fn spawn_with_reporter<S, C, R>(
        sink: Arc<S>,
        clock: C,
        interval: Duration,
        report: R,
    ) -> io::Result<Self>
    where
        S: RotatingSink + ?Sized + 'static,
        C: Clock + 'static,
        R: FnMut(RotationEvent<'_>) + Send + 'static,
    {
        let state = Arc::new(RotationState::new(clock.today()));
        let task = RotationTask {
            sink,
            clock,
            state: Arc::clone(&state),
            report,
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || task.run(stop_rx, interval))?;
        tracing::debug!("daily rotation scheduler started, interval {:?}", interval);

        Ok(Self {
            state,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Date of the most recent rotation attempt, or the start date.
    pub fn last_rotation_date(&self) -> Date {
        self.state.last_rotation_date()
    }

    /// Number of successful rotations.
    pub fn rotations(&self) -> u64 {
        self.state.rotations.load(Ordering::SeqCst)
    }

    /// Number of failed rotation attempts.
    pub fn failed_rotations(&self) -> u64 {
        self.state.failures.load(Ordering::SeqCst)
    }

    /// Whether the background thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the thread and wait for it to exit. An in-flight rotation is
    /// allowed to finish. Calling this more than once is harmless.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("daily rotation scheduler panicked");
        }
    }
}

impl Drop for DailyRotationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn trace_event(event: RotationEvent<'_>) {
    if let RotationEvent::Rotated { date } = event {
        tracing::info!("log rotated for {}", date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Instant;
    use time::macros::date;

    #[derive(Default)]
    struct FakeSink {
        calls: AtomicUsize,
        not_ready: AtomicBool,
        failing: AtomicBool,
    }

    impl FakeSink {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RotatingSink for FakeSink {
        fn rotate(&self) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(io::Error::other("disk on fire"))
            } else {
                Ok(())
            }
        }

        fn is_ready(&self) -> bool {
            !self.not_ready.load(Ordering::SeqCst)
        }
    }

    fn task(
        sink: &Arc<FakeSink>,
        clock: &ManualClock,
    ) -> RotationTask<FakeSink, ManualClock, impl FnMut(RotationEvent<'_>)> {
        RotationTask {
            sink: Arc::clone(sink),
            clock: clock.clone(),
            state: Arc::new(RotationState::new(clock.today())),
            report: |_: RotationEvent<'_>| {},
        }
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_same_day_checks_do_nothing() {
        let sink = Arc::new(FakeSink::default());
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let mut task = task(&sink, &clock);

        for _ in 0..100 {
            assert_eq!(task.check(), Check::Idle);
        }
        assert_eq!(sink.calls(), 0);
    }

    #[test]
    fn test_one_rotation_per_day_transition() {
        let sink = Arc::new(FakeSink::default());
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let mut task = task(&sink, &clock);

        clock.advance_days(1);
        assert_eq!(task.check(), Check::Rotated);
        for _ in 0..10 {
            assert_eq!(task.check(), Check::Idle);
        }
        assert_eq!(sink.calls(), 1);
        assert_eq!(task.state.last_rotation_date(), date!(2024 - 05 - 02));

        clock.advance_days(1);
        assert_eq!(task.check(), Check::Rotated);
        assert_eq!(task.check(), Check::Idle);
        assert_eq!(sink.calls(), 2);
        assert_eq!(task.state.rotations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_skipping_several_days_rotates_once() {
        let sink = Arc::new(FakeSink::default());
        let clock = ManualClock::new(date!(2024 - 12 - 30));
        let mut task = task(&sink, &clock);

        clock.advance_days(5);
        assert_eq!(task.check(), Check::Rotated);
        assert_eq!(task.check(), Check::Idle);
        assert_eq!(sink.calls(), 1);
        assert_eq!(task.state.last_rotation_date(), date!(2025 - 01 - 04));
    }

    #[test]
    fn test_not_ready_sink_is_skipped_then_rotated() {
        let sink = Arc::new(FakeSink::default());
        sink.not_ready.store(true, Ordering::SeqCst);
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let mut task = task(&sink, &clock);

        clock.advance_days(1);
        assert_eq!(task.check(), Check::NotReady);
        assert_eq!(task.check(), Check::NotReady);
        assert_eq!(sink.calls(), 0);
        assert_eq!(task.state.last_rotation_date(), date!(2024 - 05 - 01));

        sink.not_ready.store(false, Ordering::SeqCst);
        assert_eq!(task.check(), Check::Rotated);
        assert_eq!(sink.calls(), 1);
    }

    #[test]
    fn test_failed_rotation_is_not_retried_same_day() {
        let sink = Arc::new(FakeSink::default());
        sink.failing.store(true, Ordering::SeqCst);
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let mut task = task(&sink, &clock);

        clock.advance_days(1);
        assert_eq!(task.check(), Check::Failed);
        assert_eq!(task.check(), Check::Idle);
        assert_eq!(sink.calls(), 1);
        assert_eq!(task.state.last_rotation_date(), date!(2024 - 05 - 02));
        assert_eq!(task.state.failures.load(Ordering::SeqCst), 1);

        sink.failing.store(false, Ordering::SeqCst);
        assert_eq!(task.check(), Check::Idle);
        clock.advance_days(1);
        assert_eq!(task.check(), Check::Rotated);
        assert_eq!(sink.calls(), 2);
    }

    #[test]
    fn test_reporter_sees_each_attempt() {
        let sink = Arc::new(FakeSink::default());
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_task = Arc::clone(&seen);
        let mut task = RotationTask {
            sink: Arc::clone(&sink),
            clock: clock.clone(),
            state: Arc::new(RotationState::new(clock.today())),
            report: move |event: RotationEvent<'_>| {
                let line = match event {
                    RotationEvent::Rotated { date } => format!("rotated {date}"),
                    RotationEvent::Failed { date, error } => format!("failed {date}: {error}"),
                };
                seen_by_task.lock().unwrap().push(line);
            },
        };

        clock.advance_days(1);
        task.check();
        sink.failing.store(true, Ordering::SeqCst);
        clock.advance_days(1);
        task.check();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "rotated 2024-05-02".to_string(),
                "failed 2024-05-03: disk on fire".to_string()
            ]
        );
    }

    #[test]
    fn test_scheduler_thread_rotates_on_day_change() {
        let sink = Arc::new(FakeSink::default());
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let mut scheduler = DailyRotationScheduler::spawn(
            Arc::clone(&sink),
            clock.clone(),
            Duration::from_millis(10),
        )
        .expect("spawn scheduler");
        assert!(scheduler.is_running());

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.calls(), 0);
        assert_eq!(scheduler.last_rotation_date(), date!(2024 - 05 - 01));

        clock.advance_days(1);
        wait_until("rotation", || scheduler.rotations() == 1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.calls(), 1);
        assert_eq!(scheduler.last_rotation_date(), date!(2024 - 05 - 02));

        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_scheduler_keeps_polling_after_failure() {
        let sink = Arc::new(FakeSink::default());
        sink.failing.store(true, Ordering::SeqCst);
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let scheduler = DailyRotationScheduler::spawn(
            Arc::clone(&sink),
            clock.clone(),
            Duration::from_millis(10),
        )
        .expect("spawn scheduler");

        clock.advance_days(1);
        wait_until("failed attempt", || scheduler.failed_rotations() == 1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.calls(), 1, "no retry on the same day");
        assert!(scheduler.is_running());

        sink.failing.store(false, Ordering::SeqCst);
        clock.advance_days(1);
        wait_until("next day's rotation", || scheduler.rotations() == 1);
        assert_eq!(sink.calls(), 2);
    }

    #[test]
    fn test_scheduler_waits_for_sink_readiness() {
        let sink = Arc::new(FakeSink::default());
        sink.not_ready.store(true, Ordering::SeqCst);
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let scheduler = DailyRotationScheduler::spawn(
            Arc::clone(&sink),
            clock.clone(),
            Duration::from_millis(10),
        )
        .expect("spawn scheduler");

        clock.advance_days(1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.calls(), 0);
        assert!(scheduler.is_running());

        sink.not_ready.store(false, Ordering::SeqCst);
        wait_until("rotation after readiness", || scheduler.rotations() == 1);
    }

    #[test]
    fn test_drop_stops_thread_promptly() {
        let sink = Arc::new(FakeSink::default());
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let scheduler =
            DailyRotationScheduler::spawn(Arc::clone(&sink), clock, Duration::from_secs(3600))
                .expect("spawn scheduler");

        let started = Instant::now();
        drop(scheduler);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(Arc::strong_count(&sink), 1, "thread released the sink");
    }
}
