//! Per-lane mailboxes.

use std::sync::{Condvar, Mutex};

/// The mutable half of a port, guarded by the port's mutex.
pub(crate) struct PortState<M> {
    /// Incoming packets waiting to be processed on this port.
    pub(crate) assigned: Vec<M>,
    /// Incoming packets whose prerequisites are not yet available.
    pub(crate) deferred: Vec<M>,
    /// Set while the port's worker is suspended awaiting resumption.
    pub(crate) waiting: bool,
    /// Set when the worker needn't wait to be resumed again.
    pub(crate) dismissed: bool,
}

/// Persistent state associated with one worker lane: an inbox, a deferred
/// queue, and the condition variable on which the lane's worker suspends.
pub struct Port<M> {
    pub(crate) state: Mutex<PortState<M>>,
    /// Signaled to wake an idle worker when more packets are available.
    pub(crate) resumable: Condvar,
}

impl<M> Port<M> {
    /// Creates an empty, undismissed port.
    pub(crate) fn new() -> Self {
        Port {
            state: Mutex::new(PortState {
                assigned: Vec::new(),
                deferred: Vec::new(),
                waiting: false,
                dismissed: false,
            }),
            resumable: Condvar::new(),
        }
    }
}
