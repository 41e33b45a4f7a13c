//! Per-worker outboxes.

/// A worker's outbox: one packet list per destination lane, plus a list of
/// packets whose handling must be retried later.
///
/// The pod belongs to exactly one worker thread, so pushing into it takes
/// no locks; lists travel to their destination ports only when the worker
/// next runs out of locally available work.
pub struct Pod<M> {
    /// Outgoing packet lists, indexed by destination lane.
    pub(crate) buckets: Vec<Vec<M>>,
    /// Packets the worker could not act on yet.
    pub(crate) deferrals: Vec<M>,
}

impl<M> Pod<M> {
    /// Creates an empty pod with one bucket per lane.
    pub fn new(lanes: usize) -> Self {
        let mut buckets = Vec::with_capacity(lanes);
        for _ in 0..lanes {
            buckets.push(Vec::new());
        }
        Pod {
            buckets,
            deferrals: Vec::new(),
        }
    }

    /// The number of destination buckets.
    pub fn arity(&self) -> usize {
        self.buckets.len()
    }

    /// True when every bucket and the deferral list are empty.
    pub fn is_empty(&self) -> bool {
        self.deferrals.is_empty() && self.buckets.iter().all(Vec::is_empty)
    }
}
