//! Client-held cancellation tokens.

use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex};

use crate::{KILLED_BY_USER, NOT_KILLED};

/// State of a kill switch, guarded by the switch's mutex.
struct KillState {
    /// The bound job's kill sentinel, or `None` while disconnected.
    target: Option<Arc<AtomicU8>>,
    /// Latched when a kill is requested while disconnected.
    pending: bool,
}

/// A cancellation token safely bindable to at most one active job.
///
/// Firing a connected switch writes the user kill sentinel into the bound
/// job, which then winds down and reports interruption. Firing a
/// disconnected switch latches the request, and the kill fires the moment
/// the switch is next bound.
pub struct KillSwitch {
    inner: Mutex<KillState>,
}

impl KillSwitch {
    /// Creates a detached kill switch.
    pub fn new() -> Self {
        KillSwitch {
            inner: Mutex::new(KillState {
                target: None,
                pending: false,
            }),
        }
    }

    /// Requests that the bound job stop at its next cancellation poll.
    pub fn kill(&self) {
        let mut state = self.inner.lock().expect("kill switch poisoned");
        match &state.target {
            Some(sentinel) => fire(sentinel),
            None => state.pending = true,
        }
    }

    /// Connects the switch to a job's kill sentinel for the duration of
    /// that job. A kill latched while disconnected fires immediately.
    pub fn enable(&self, sentinel: Arc<AtomicU8>) {
        let mut state = self.inner.lock().expect("kill switch poisoned");
        if state.pending {
            fire(&sentinel);
            state.pending = false;
        }
        state.target = Some(sentinel);
    }

    /// Severs the binding made by [`enable`](KillSwitch::enable).
    pub fn disable(&self) {
        let mut state = self.inner.lock().expect("kill switch poisoned");
        state.target = None;
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes the user kill sentinel unless the job is already being killed.
fn fire(sentinel: &AtomicU8) {
    use std::sync::atomic::Ordering;
    let _ = sentinel.compare_exchange(
        NOT_KILLED,
        KILLED_BY_USER,
        Ordering::AcqRel,
        Ordering::Acquire,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn pending_kill_fires_on_enable() {
        let switch = KillSwitch::new();
        switch.kill();
        let sentinel = Arc::new(AtomicU8::new(NOT_KILLED));
        switch.enable(sentinel.clone());
        assert_eq!(sentinel.load(Ordering::Acquire), KILLED_BY_USER);
    }

    #[test]
    fn disabled_switch_leaves_the_sentinel_alone() {
        let switch = KillSwitch::new();
        let sentinel = Arc::new(AtomicU8::new(NOT_KILLED));
        switch.enable(sentinel.clone());
        switch.disable();
        switch.kill();
        assert_eq!(sentinel.load(Ordering::Acquire), NOT_KILLED);
    }
}
