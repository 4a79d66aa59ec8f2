//! Composite recorder fanning control operations out to its children
//!
//! Children are driven in list order. `set_up` and `start` stop at the first
//! failure; `pause`, `resume` and `stop` reach every child and report the
//! first error. The aggregate state is derived from the children on every
//! query and never stored.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ErrorKind, Operation, RecorderError, RecorderResult};
use super::recorder::Recorder;
use super::state::RecorderState;

/// What `start` does with children that already started when a later one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPolicy {
    /// Leave them recording; the composite reports the failure only
    #[default]
    FailFast,
    /// Stop and reset them, so every child is back in `Idle`
    Rollback,
}

/// Result of one child for a fan-out operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildOutcome {
    pub recorder: String,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "error_message")]
    pub error: Option<RecorderError>,
}

impl ChildOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn error_message<S: serde::Serializer>(
    error: &Option<RecorderError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

pub struct MultiRecorder {
    name: String,
    recorders: RwLock<Vec<Arc<dyn Recorder>>>,
    policy: StartPolicy,
    /// Serializes composite operations against each other
    control: Mutex<()>,
}

impl MultiRecorder {
    pub fn new(name: impl Into<String>, recorders: Vec<Arc<dyn Recorder>>) -> Self {
        Self::with_policy(name, recorders, StartPolicy::default())
    }

    pub fn with_policy(
        name: impl Into<String>,
        recorders: Vec<Arc<dyn Recorder>>,
        policy: StartPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            recorders: RwLock::new(recorders),
            policy,
            control: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> StartPolicy {
        self.policy
    }

    pub fn recorders(&self) -> Vec<Arc<dyn Recorder>> {
        self.recorders.read().clone()
    }

    /// Replaces the children; only while every child is idle
    pub fn set_recorders(&self, recorders: Vec<Arc<dyn Recorder>>) -> RecorderResult<()> {
        let _guard = self.control.lock();
        if self.state() != RecorderState::Idle {
            return Err(self.error(Operation::Configure, ErrorKind::ConfigLocked("recorders")));
        }
        *self.recorders.write() = recorders;
        Ok(())
    }

    /// Per-child state, in list order
    pub fn child_states(&self) -> Vec<(String, RecorderState)> {
        self.recorders
            .read()
            .iter()
            .map(|r| (r.name().to_string(), r.state()))
            .collect()
    }

    pub fn pause_all(&self) -> Vec<ChildOutcome> {
        let _guard = self.control.lock();
        self.fan_out(|r| r.pause())
    }

    pub fn resume_all(&self) -> Vec<ChildOutcome> {
        let _guard = self.control.lock();
        self.fan_out(|r| r.resume())
    }

    pub fn stop_all(&self) -> Vec<ChildOutcome> {
        let _guard = self.control.lock();
        self.fan_out(|r| r.stop())
    }

    fn fan_out(&self, op: impl Fn(&dyn Recorder) -> RecorderResult<()>) -> Vec<ChildOutcome> {
        self.recorders()
            .iter()
            .map(|r| ChildOutcome {
                recorder: r.name().to_string(),
                error: op(r.as_ref()).err(),
            })
            .collect()
    }

    fn error(&self, op: Operation, kind: ErrorKind) -> RecorderError {
        RecorderError::new(self.name.clone(), op, kind)
    }

    fn ensure_children(&self, op: Operation, recorders: &[Arc<dyn Recorder>]) -> RecorderResult<()> {
        if recorders.is_empty() {
            return Err(self.error(
                op,
                ErrorKind::InvalidConfig("no recorders configured".to_string()),
            ));
        }
        Ok(())
    }

    fn roll_back(&self, started: &[Arc<dyn Recorder>]) {
        for recorder in started.iter().rev() {
            if let Err(e) = recorder.stop() {
                warn!("{}: rollback stop failed: {}", self.name, e);
            }
            if let Err(e) = recorder.reset() {
                warn!("{}: rollback reset failed: {}", self.name, e);
            }
        }
    }
}

/// First real error of a fan-out. `Unsupported` answers are tolerated as
/// long as some child did act; if none did, the first of them is returned.
fn fold(outcomes: Vec<ChildOutcome>) -> RecorderResult<()> {
    let any_ok = outcomes.iter().any(ChildOutcome::is_ok);
    let mut unsupported = None;

    for error in outcomes.into_iter().filter_map(|o| o.error) {
        if !error.is_unsupported() {
            return Err(error);
        }
        unsupported.get_or_insert(error);
    }

    match unsupported {
        Some(error) if !any_ok => Err(error),
        _ => Ok(()),
    }
}

/// First error of a fan-out, whatever its kind
fn first_error(outcomes: Vec<ChildOutcome>) -> RecorderResult<()> {
    match outcomes.into_iter().find_map(|o| o.error) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl Recorder for MultiRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_up(&self) -> RecorderResult<()> {
        let _guard = self.control.lock();
        let recorders = self.recorders();
        self.ensure_children(Operation::SetUp, &recorders)?;

        for recorder in &recorders {
            recorder.set_up()?;
        }
        info!("{}: {} recorders set up", self.name, recorders.len());
        Ok(())
    }

    fn start(&self) -> RecorderResult<()> {
        let _guard = self.control.lock();
        let recorders = self.recorders();
        self.ensure_children(Operation::Start, &recorders)?;

        if recorders.iter().any(|r| r.state().is_active()) {
            let err = self.error(Operation::Start, ErrorKind::AlreadyStarted);
            warn!("{}", err);
            return Err(err);
        }

        for (i, recorder) in recorders.iter().enumerate() {
            if let Err(e) = recorder.start() {
                if self.policy == StartPolicy::Rollback {
                    warn!("{}: rolling back {} started recorders", self.name, i);
                    self.roll_back(&recorders[..i]);
                }
                return Err(e);
            }
        }
        info!("{}: {} recorders started", self.name, recorders.len());
        Ok(())
    }

    fn pause(&self) -> RecorderResult<()> {
        fold(self.pause_all())
    }

    fn resume(&self) -> RecorderResult<()> {
        fold(self.resume_all())
    }

    fn stop(&self) -> RecorderResult<()> {
        first_error(self.stop_all())
    }

    fn reset(&self) -> RecorderResult<()> {
        let _guard = self.control.lock();
        first_error(self.fan_out(|r| r.reset()))
    }

    fn state(&self) -> RecorderState {
        aggregate(self.recorders.read().iter().map(|r| r.state()))
    }

    fn is_recording(&self) -> bool {
        self.recorders.read().iter().any(|r| r.is_recording())
    }

    fn is_paused(&self) -> bool {
        self.recorders.read().iter().any(|r| r.is_paused())
    }

    fn is_stopped(&self) -> bool {
        self.recorders.read().iter().any(|r| r.is_stopped())
    }

    /// True when at least one child can actually suspend its output
    fn can_pause_and_resume(&self) -> bool {
        self.recorders.read().iter().any(|r| r.can_pause_and_resume())
    }
}

/// Recording beats paused beats stopped beats idle
fn aggregate(states: impl Iterator<Item = RecorderState>) -> RecorderState {
    let rank = |s: &RecorderState| match s {
        RecorderState::Recording => 3,
        RecorderState::Paused => 2,
        RecorderState::Stopped => 1,
        RecorderState::Idle => 0,
    };
    states.max_by_key(rank).unwrap_or_default()
}
