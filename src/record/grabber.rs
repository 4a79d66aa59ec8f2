//! Fixed-rate frame scheduling
//!
//! A `FrameGrabber` is spawned fresh for every recording session and drives
//! the owner's capture hook on a dedicated thread. Capture latency is
//! subtracted from the sleep before the next frame; when a capture overruns
//! the interval the next one follows immediately and no catch-up frames are
//! produced.

use anyhow::{bail, Context, Result};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::lifecycle::panic_message;
use super::recorder::FrameCapturable;

/// How often a paused grabber re-checks its flags
pub const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Counters of one grabbing session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GrabberStats {
    /// Hook invocations that succeeded
    pub frames_grabbed: u64,
    /// Hook invocations that reported an error (or panicked)
    pub frames_failed: u64,
    /// Captures that took longer than one frame interval
    pub overruns: u64,
}

#[derive(Debug)]
struct Flags {
    running: bool,
    paused: bool,
}

struct Shared {
    flags: Mutex<Flags>,
    wake: Condvar,
    grabbed: AtomicU64,
    failed: AtomicU64,
    overruns: AtomicU64,
}

impl Shared {
    fn stats(&self) -> GrabberStats {
        GrabberStats {
            frames_grabbed: self.grabbed.load(Ordering::SeqCst),
            frames_failed: self.failed.load(Ordering::SeqCst),
            overruns: self.overruns.load(Ordering::SeqCst),
        }
    }
}

pub struct FrameGrabber {
    name: String,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl FrameGrabber {
    /// Starts grabbing at `fps` frames per second on a new thread
    pub fn spawn(name: &str, fps: f64, target: Arc<dyn FrameCapturable>) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            bail!("frame rate must be > 0, got {}", fps);
        }

        let interval = Duration::from_secs_f64(1.0 / fps);
        let shared = Arc::new(Shared {
            flags: Mutex::new(Flags {
                running: true,
                paused: false,
            }),
            wake: Condvar::new(),
            grabbed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_name = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("grabber-{}", name))
            .spawn(move || run(&worker_name, interval, &worker_shared, target.as_ref()))
            .context("Failed to spawn frame grabber thread")?;

        info!(
            "{}: frame grabber started ({:.2} fps, {:?} per frame)",
            name, fps, interval
        );

        Ok(Self {
            name: name.to_string(),
            shared,
            handle: Some(handle),
        })
    }

    /// Suspends grabbing; no-op unless running
    pub fn pause(&self) {
        let mut flags = self.shared.flags.lock();
        if flags.running {
            flags.paused = true;
            self.shared.wake.notify_all();
        }
    }

    /// Resumes grabbing; no-op unless paused
    pub fn resume(&self) {
        let mut flags = self.shared.flags.lock();
        if flags.paused {
            flags.paused = false;
            self.shared.wake.notify_all();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.flags.lock().paused
    }

    pub fn is_running(&self) -> bool {
        self.shared.flags.lock().running
    }

    pub fn stats(&self) -> GrabberStats {
        self.shared.stats()
    }

    /// Stops grabbing and waits for an in-flight capture to finish
    pub fn stop(&mut self) -> GrabberStats {
        {
            let mut flags = self.shared.flags.lock();
            flags.running = false;
            flags.paused = false;
            self.shared.wake.notify_all();
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{}: frame grabber thread panicked", self.name);
            }
        }

        let stats = self.shared.stats();
        info!(
            "{}: frame grabber stopped ({} frames, {} failed, {} overruns)",
            self.name, stats.frames_grabbed, stats.frames_failed, stats.overruns
        );
        stats
    }
}

impl Drop for FrameGrabber {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run(name: &str, interval: Duration, shared: &Shared, target: &dyn FrameCapturable) {
    loop {
        {
            let mut flags = shared.flags.lock();
            if !flags.running {
                break;
            }
            if flags.paused {
                shared.wake.wait_for(&mut flags, PAUSE_POLL);
                continue;
            }
        }

        let before = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(|| target.grab_frame())) {
            Ok(Ok(())) => {
                shared.grabbed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                // A lost frame must not end the session
                shared.failed.fetch_add(1, Ordering::SeqCst);
                error!("{}: {}", name, e);
            }
            Err(payload) => {
                shared.failed.fetch_add(1, Ordering::SeqCst);
                error!(
                    "{}: frame capture panicked: {}",
                    name,
                    panic_message(payload.as_ref())
                );
            }
        }

        let elapsed = before.elapsed();
        if elapsed >= interval {
            shared.overruns.fetch_add(1, Ordering::SeqCst);
            debug!("{}: capture took {:?}, over the {:?} budget", name, elapsed, interval);
            continue;
        }

        let deadline = before + interval;
        let mut flags = shared.flags.lock();
        while flags.running && !flags.paused {
            if shared.wake.wait_until(&mut flags, deadline).timed_out() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::error::{ErrorKind, Operation, RecorderError, RecorderResult};

    struct Counter(AtomicU64);

    impl FrameCapturable for Counter {
        fn grab_frame(&self) -> RecorderResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Flaky(AtomicU64);

    impl FrameCapturable for Flaky {
        fn grab_frame(&self) -> RecorderResult<()> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Err(RecorderError::new(
                    "flaky",
                    Operation::GrabFrame,
                    ErrorKind::backend("grab frame", anyhow::anyhow!("glitch")),
                ))
            } else if n == 3 {
                panic!("driver crashed");
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let target = Arc::new(Counter(AtomicU64::new(0)));
        assert!(FrameGrabber::spawn("t", 0.0, target.clone()).is_err());
        assert!(FrameGrabber::spawn("t", f64::NAN, target).is_err());
    }

    #[test]
    fn test_stop_is_prompt_during_long_sleep() {
        let target = Arc::new(Counter(AtomicU64::new(0)));
        // One frame every 10 seconds: the grabber spends its life sleeping
        let mut grabber = FrameGrabber::spawn("slow", 0.1, target.clone()).unwrap();
        thread::sleep(Duration::from_millis(50));

        let before = Instant::now();
        grabber.stop();
        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
        assert!(!grabber.is_running());
    }

    #[test]
    fn test_paused_grabber_does_not_capture() {
        let target = Arc::new(Counter(AtomicU64::new(0)));
        let mut grabber = FrameGrabber::spawn("paused", 100.0, target.clone()).unwrap();
        grabber.pause();
        thread::sleep(Duration::from_millis(30));

        let frozen = target.0.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(target.0.load(Ordering::SeqCst), frozen);
        assert!(grabber.is_paused());

        grabber.resume();
        thread::sleep(Duration::from_millis(200));
        assert!(target.0.load(Ordering::SeqCst) > frozen);
        grabber.stop();
    }

    #[test]
    fn test_errors_and_panics_do_not_end_the_loop() {
        let target = Arc::new(Flaky(AtomicU64::new(0)));
        let mut grabber = FrameGrabber::spawn("flaky", 100.0, target.clone()).unwrap();
        thread::sleep(Duration::from_millis(200));

        let stats = grabber.stop();
        assert!(stats.frames_failed >= 3, "stats: {stats:?}");
        assert!(stats.frames_grabbed >= 3, "stats: {stats:?}");
        assert_eq!(
            stats.frames_grabbed + stats.frames_failed,
            target.0.load(Ordering::SeqCst)
        );
    }
}
