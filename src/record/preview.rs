use anyhow::{bail, Context, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::recorder::Previewable;
use crate::capture::RawImage;

/// Latest preview frame with the time it was grabbed
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub image: Arc<RawImage>,
    pub grabbed_at: Instant,
}

struct Flags {
    running: bool,
    enabled: bool,
}

struct Shared {
    flags: Mutex<Flags>,
    wake: Condvar,
}

/// Grabs a one-shot image from a recorder at a fixed interval
///
/// Runs independently of any recording session. Consumers read the newest
/// frame through `subscribe` or `latest`.
pub struct PreviewPoller {
    shared: Arc<Shared>,
    frames: watch::Receiver<Option<PreviewFrame>>,
    handle: Option<JoinHandle<()>>,
}

impl PreviewPoller {
    pub fn start(target: Arc<dyn Previewable>, enabled: bool, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            bail!("preview interval must be > 0");
        }

        let shared = Arc::new(Shared {
            flags: Mutex::new(Flags {
                running: true,
                enabled,
            }),
            wake: Condvar::new(),
        });
        let (tx, rx) = watch::channel(None);

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("preview".to_string())
            .spawn(move || poll(&worker, interval, target.as_ref(), tx))
            .context("Failed to spawn preview thread")?;

        info!("Preview poller started (every {:?}, enabled: {})", interval, enabled);

        Ok(Self {
            shared,
            frames: rx,
            handle: Some(handle),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PreviewFrame>> {
        self.frames.clone()
    }

    pub fn latest(&self) -> Option<PreviewFrame> {
        self.frames.borrow().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.flags.lock().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut flags = self.shared.flags.lock();
        flags.enabled = enabled;
        self.shared.wake.notify_all();
    }

    pub fn stop(&mut self) {
        {
            let mut flags = self.shared.flags.lock();
            flags.running = false;
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Preview thread panicked");
            }
            info!("Preview poller stopped");
        }
    }
}

impl Drop for PreviewPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll(
    shared: &Shared,
    interval: Duration,
    target: &dyn Previewable,
    frames: watch::Sender<Option<PreviewFrame>>,
) {
    loop {
        {
            let mut flags = shared.flags.lock();
            if !flags.running {
                break;
            }
            if !flags.enabled {
                shared.wake.wait(&mut flags);
                continue;
            }
        }

        let before = Instant::now();
        match target.grab_image() {
            Ok(image) => {
                frames.send_replace(Some(PreviewFrame {
                    image: Arc::new(image),
                    grabbed_at: before,
                }));
            }
            Err(e) => debug!("Preview grab failed: {}", e),
        }

        let deadline = before + interval;
        let mut flags = shared.flags.lock();
        while flags.running && flags.enabled {
            if shared.wake.wait_until(&mut flags, deadline).timed_out() {
                break;
            }
        }
    }
}
