use std::time::{Duration, Instant};

/// Session clock of a video recorder
///
/// Presentation time is wall time since start minus every paused span, so
/// paused intervals are cut out of the output instead of showing as frozen
/// frames.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl Timeline {
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
    }

    pub fn pause(&mut self, now: Instant) {
        if self.started.is_some() && self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Total time spent paused, including a pause still in progress
    pub fn paused_total(&self, now: Instant) -> Duration {
        let current = self
            .paused_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        self.paused_total + current
    }

    /// Timestamp of a frame captured at `now`
    pub fn presentation_time(&self, now: Instant) -> Duration {
        match self.started {
            Some(started) => now
                .saturating_duration_since(started)
                .saturating_sub(self.paused_total(now)),
            None => Duration::ZERO,
        }
    }
}
