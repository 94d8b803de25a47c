use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Requested state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Hold before the next file without consuming the queue.
    Paused,
    /// Finish the file in flight, then end the run.
    Stopped,
}

/// Cooperative cancellation input, polled between files and while waiting
/// on the queue. Any `Fn() -> RunState` closure qualifies.
pub trait RunControl {
    fn state(&self) -> RunState;
}

impl<F> RunControl for F
where
    F: Fn() -> RunState,
{
    fn state(&self) -> RunState {
        self()
    }
}

const RUNNING: u8 = 0;
const PAUSED: u8 = 1;
const STOPPED: u8 = 2;

/// Shareable pause/resume/stop switch.
///
/// Clones share state, so one clone can be handed to the pipeline while
/// another is driven from a signal handler or UI thread.
///
/// ```
/// use phototag::pipeline::{ControlHandle, RunControl, RunState};
///
/// let handle = ControlHandle::new();
/// let remote = handle.clone();
///
/// remote.pause();
/// assert_eq!(handle.state(), RunState::Paused);
/// remote.stop();
/// assert_eq!(handle.state(), RunState::Stopped);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    state: Arc<AtomicU8>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        // a stopped run stays stopped
        let _ = self
            .state
            .compare_exchange(RUNNING, PAUSED, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let _ = self
            .state
            .compare_exchange(PAUSED, RUNNING, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.state.store(STOPPED, Ordering::SeqCst);
    }
}

impl RunControl for ControlHandle {
    fn state(&self) -> RunState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => RunState::Running,
            PAUSED => RunState::Paused,
            _ => RunState::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handle_is_running() {
        assert_eq!(ControlHandle::new().state(), RunState::Running);
    }

    #[test]
    fn pause_and_resume_toggle() {
        let handle = ControlHandle::new();
        handle.pause();
        assert_eq!(handle.state(), RunState::Paused);
        handle.resume();
        assert_eq!(handle.state(), RunState::Running);
    }

    #[test]
    fn stop_is_final() {
        let handle = ControlHandle::new();
        handle.stop();
        handle.resume();
        handle.pause();
        assert_eq!(handle.state(), RunState::Stopped);
    }

    #[test]
    fn closures_are_controls() {
        let control = || RunState::Paused;
        assert_eq!(control.state(), RunState::Paused);
    }
}
