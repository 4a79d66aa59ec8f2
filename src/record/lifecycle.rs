//! State-machine core shared by every recorder
//!
//! `Lifecycle` serializes a recorder's control operations behind one mutex.
//! Every operation checks legality with `RecorderState::apply`, runs the
//! recorder-specific hook while still holding that mutex, and commits the new
//! state only if the hook succeeded. Hooks therefore never overlap on one
//! recorder, and a hook must not call back into a control operation of its
//! own `Lifecycle`.
//!
//! The committed state lives in its own cell, written only at commit time, so
//! `state()` never waits for a running hook.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};

use super::error::{ErrorKind, Operation, RecorderError, RecorderResult};
use super::state::{Action, RecorderState};

pub struct Lifecycle {
    name: String,
    control: Mutex<()>,
    state: RwLock<RecorderState>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control: Mutex::new(()),
            state: RwLock::new(RecorderState::Idle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last committed state; does not wait for a hook in progress
    pub fn state(&self) -> RecorderState {
        *self.state.read()
    }

    pub fn error(&self, op: Operation, kind: ErrorKind) -> RecorderError {
        RecorderError::new(self.name.clone(), op, kind)
    }

    pub fn start<F>(&self, hook: F) -> RecorderResult<()>
    where
        F: FnOnce() -> Result<(), ErrorKind>,
    {
        self.transition(Action::Start, hook)
    }

    pub fn pause<F>(&self, hook: F) -> RecorderResult<()>
    where
        F: FnOnce() -> Result<(), ErrorKind>,
    {
        self.transition(Action::Pause, hook)
    }

    pub fn resume<F>(&self, hook: F) -> RecorderResult<()>
    where
        F: FnOnce() -> Result<(), ErrorKind>,
    {
        self.transition(Action::Resume, hook)
    }

    pub fn stop<F>(&self, hook: F) -> RecorderResult<()>
    where
        F: FnOnce() -> Result<(), ErrorKind>,
    {
        self.transition(Action::Stop, hook)
    }

    /// Returns to `Idle` from `Idle` or `Stopped`; configuration is untouched
    pub fn reset<F>(&self, hook: F) -> RecorderResult<()>
    where
        F: FnOnce() -> Result<(), ErrorKind>,
    {
        self.transition(Action::Reset, hook)
    }

    /// Runs `setUp` work; only legal before the recorder was started
    pub fn set_up<T, F>(&self, hook: F) -> RecorderResult<T>
    where
        F: FnOnce() -> Result<T, ErrorKind>,
    {
        let _guard = self.control.lock();
        if self.state() != RecorderState::Idle {
            return Err(self.reject(Operation::SetUp, ErrorKind::AlreadyStarted));
        }

        run_guarded("set up recorder", hook).map_err(|kind| {
            error!("{}: set up failed: {}", self.name, kind);
            self.error(Operation::SetUp, kind)
        })
    }

    /// Applies a configuration change; rejected once the recorder left `Idle`
    pub fn configure<T, F>(&self, field: &'static str, change: F) -> RecorderResult<T>
    where
        F: FnOnce() -> Result<T, ErrorKind>,
    {
        let _guard = self.control.lock();
        if self.state() != RecorderState::Idle {
            return Err(self.reject(Operation::Configure, ErrorKind::ConfigLocked(field)));
        }

        change().map_err(|kind| self.reject(Operation::Configure, kind))
    }

    /// Answers an action the recorder cannot perform. Outside of a session it
    /// is rejected like any illegal transition; during one it reports
    /// `Unsupported` and the state stays as it is.
    pub fn unsupported(&self, action: Action, what: &'static str) -> RecorderResult<()> {
        let op = operation(action);
        let _guard = self.control.lock();
        let state = self.state();

        if !state.is_active() {
            if let Err(kind) = state.apply(action) {
                return Err(self.reject(op, kind));
            }
        }

        let kind = ErrorKind::Unsupported(what);
        warn!("{}: {} skipped: {}", self.name, op, kind);
        Err(self.error(op, kind))
    }

    fn transition<F>(&self, action: Action, hook: F) -> RecorderResult<()>
    where
        F: FnOnce() -> Result<(), ErrorKind>,
    {
        let op = operation(action);
        let _guard = self.control.lock();
        let current = self.state();

        let next = match current.apply(action) {
            Ok(next) => next,
            Err(kind) => return Err(self.reject(op, kind)),
        };

        match run_guarded(hook_action(action), hook) {
            Ok(()) => {
                info!("{}: {} -> {}", self.name, current, next);
                *self.state.write() = next;
                Ok(())
            }
            Err(kind) => {
                if kind.is_unsupported() {
                    warn!("{}: {} skipped: {}", self.name, op, kind);
                } else {
                    error!("{}: {} failed: {}", self.name, op, kind);
                }
                Err(self.error(op, kind))
            }
        }
    }

    fn reject(&self, op: Operation, kind: ErrorKind) -> RecorderError {
        warn!("{}: {} rejected: {}", self.name, op, kind);
        self.error(op, kind)
    }
}

fn operation(action: Action) -> Operation {
    match action {
        Action::Start => Operation::Start,
        Action::Pause => Operation::Pause,
        Action::Resume => Operation::Resume,
        Action::Stop => Operation::Stop,
        Action::Reset => Operation::Reset,
    }
}

fn hook_action(action: Action) -> &'static str {
    match action {
        Action::Start => "start recording",
        Action::Pause => "pause recording",
        Action::Resume => "resume recording",
        Action::Stop => "stop recording",
        Action::Reset => "reset recorder",
    }
}

/// Runs a hook, turning a panic into a backend error
pub(crate) fn run_guarded<T, F>(action: &'static str, hook: F) -> Result<T, ErrorKind>
where
    F: FnOnce() -> Result<T, ErrorKind>,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(ErrorKind::Backend {
            action,
            detail: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
