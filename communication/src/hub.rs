//! The per-job coordination hub and the worker-side mailbox handle.
//!
//! The hub owns one [`Port`] per lane, the job's running-worker count and
//! quiescence latch, the kill sentinel, and the first fault raised by any
//! worker. Workers interact with it exclusively through a [`Mailbox`],
//! whose [`recv`](Mailbox::recv) implements the exchange protocol:
//!
//! 1. recycle the worker's own outbox bucket without locking, if possible;
//! 2. otherwise swap out the worker's inbox;
//! 3. otherwise flush the outbox to the other lanes' inboxes, expose any
//!    deferred packets pool-wide, undefer when no progress was made, and
//!    back off exponentially under deferral pressure;
//! 4. otherwise suspend until more packets arrive or the job is dismissed.
//!
//! Quiescence holds when every worker suspends simultaneously with an
//! empty inbox; the hub latches it, wakes the supervising thread, and the
//! supervisor dismisses the crew.

use std::mem;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ramify_logging::Logger;

use crate::pod::Pod;
use crate::port::Port;
use crate::reserve::Reserve;
use crate::{BACKOFF_LIMIT, KILLED_INTERNALLY, NOT_KILLED};

/// Undeferral rounds without a visit before a constrained-order job is
/// declared deadlocked.
const STALL_LIMIT: usize = 32;

/// Capacity of the recycled packet buffer reserve.
const PACKET_RESERVE: usize = 256;

/// Longest portable microsleep parameter.
const MAX_SLEEP_MICROS: u64 = 999_999;

/// Job lifecycle events, logged when a hub carries a logger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HubEvent {
    /// A crew of the given number of lanes started work.
    Launched(usize),
    /// Every worker suspended with nothing left to do.
    Quiescent,
    /// The crew was told to exit.
    Dismissed,
}

/// Progress bookkeeping, guarded by the hub's mutex.
struct Progress<S> {
    /// Workers currently running rather than suspended.
    running: usize,
    /// Latched when `running` reaches zero before dismissal.
    quiescent: bool,
    /// The first fault raised by any worker.
    fault: Option<S>,
    /// Consecutive undeferral rounds without a visit.
    stalled: usize,
    /// Visit count observed at the last undeferral round.
    last_visits: usize,
    /// Latched when the stall limit is exceeded.
    deadlocked: bool,
}

/// A record of data common to an ensemble of workers on the same job:
/// ports, quiescence detection, the kill sentinel, and the first fault.
pub struct Hub<M, S> {
    ports: Vec<Port<M>>,
    progress: Mutex<Progress<S>>,
    transition: std::sync::Condvar,
    killed: Arc<AtomicU8>,
    visits: AtomicUsize,
    reserve: Reserve<Vec<M>>,
    logger: Option<Logger<HubEvent>>,
    detect_stalls: bool,
}

impl<M, S> Hub<M, S> {
    /// Creates a hub for the given number of lanes, with its packet buffer
    /// reserve replenished.
    pub fn new(lanes: usize) -> Self {
        assert!(lanes > 0, "a hub needs at least one lane");
        let mut ports = Vec::with_capacity(lanes);
        for _ in 0..lanes {
            ports.push(Port::new());
        }
        let reserve = Reserve::new(PACKET_RESERVE);
        reserve.replenish(Vec::new);
        Hub {
            ports,
            progress: Mutex::new(Progress {
                running: lanes,
                quiescent: false,
                fault: None,
                stalled: 0,
                last_visits: 0,
                deadlocked: false,
            }),
            transition: std::sync::Condvar::new(),
            killed: Arc::new(AtomicU8::new(NOT_KILLED)),
            visits: AtomicUsize::new(0),
            reserve,
            logger: None,
            detect_stalls: true,
        }
    }

    /// Attaches a lifecycle event logger.
    pub fn with_logger(mut self, logger: Option<Logger<HubEvent>>) -> Self {
        self.logger = logger;
        self
    }

    /// Enables or disables the stall detector for constrained-order jobs
    /// whose callers accept nontermination on cyclic inputs.
    pub fn with_stall_detection(mut self, detect: bool) -> Self {
        self.detect_stalls = detect;
        self
    }

    /// The number of lanes.
    pub fn lanes(&self) -> usize {
        self.ports.len()
    }

    /// Queues packets on a lane's inbox, waking its worker if suspended.
    pub fn assign(&self, lane: usize, batch: Vec<M>) {
        if batch.is_empty() {
            return;
        }
        let port = &self.ports[lane];
        let mut st = port.state.lock().expect("port poisoned");
        if st.dismissed {
            return;
        }
        let was_empty = st.assigned.is_empty();
        if was_empty {
            let spent = mem::replace(&mut st.assigned, batch);
            self.recycle(spent);
        } else {
            st.assigned.extend(batch);
        }
        if st.waiting && was_empty {
            self.swell();
            port.resumable.notify_one();
        }
    }

    /// Parks packets on a lane's deferred list, where any worker's
    /// undeferral round can recirculate them.
    fn expose(&self, lane: usize, deferrals: Vec<M>) {
        let mut st = self.ports[lane].state.lock().expect("port poisoned");
        st.deferred.extend(deferrals);
    }

    /// Takes a lane's queued inbox if it is non-empty.
    fn collect(&self, lane: usize) -> Option<Vec<M>> {
        let mut st = self.ports[lane].state.lock().expect("port poisoned");
        if st.assigned.is_empty() {
            None
        } else {
            Some(mem::take(&mut st.assigned))
        }
    }

    /// Resumes workers where possible by recirculating their deferred
    /// packets. Rounds that find deferred work but no progress since the
    /// last round accumulate toward the stall limit; deferrals spinning
    /// through the pool without a single visit are a deadlocked
    /// constrained-order traversal.
    fn undefer(&self) {
        let mut had_deferred = false;
        for port in &self.ports {
            let mut st = port.state.lock().expect("port poisoned");
            if !st.deferred.is_empty() {
                had_deferred = true;
                if st.assigned.is_empty() {
                    st.assigned = mem::take(&mut st.deferred);
                    if st.waiting {
                        self.swell();
                        port.resumable.notify_one();
                    }
                }
            }
        }
        let mut progress = self.progress.lock().expect("hub poisoned");
        let visits = self.visits.load(Ordering::Relaxed);
        if visits != progress.last_visits {
            progress.last_visits = visits;
            progress.stalled = 0;
        } else if had_deferred {
            progress.stalled += 1;
            if self.detect_stalls && progress.stalled > STALL_LIMIT && !progress.deadlocked {
                progress.deadlocked = true;
                self.kill(KILLED_INTERNALLY);
            }
        }
    }

    /// Makes a note of there being one more worker running.
    fn swell(&self) {
        let mut progress = self.progress.lock().expect("hub poisoned");
        progress.running += 1;
    }

    /// Makes a note of one less worker running due to its suspension, and
    /// signals the quiescence transition when none are left.
    fn dwindle(&self) {
        let mut progress = self.progress.lock().expect("hub poisoned");
        progress.running -= 1;
        if progress.running == 0 {
            progress.quiescent = true;
            self.transition.notify_all();
        }
    }

    /// Suspends a worker until packets arrive or the job is dismissed.
    fn await_more(&self, lane: usize) -> Option<Vec<M>> {
        let port = &self.ports[lane];
        let mut st = port.state.lock().expect("port poisoned");
        if !st.assigned.is_empty() {
            return Some(mem::take(&mut st.assigned));
        }
        if st.dismissed {
            return None;
        }
        self.dwindle();
        st.waiting = true;
        loop {
            st = port.resumable.wait(st).expect("port poisoned");
            if !st.assigned.is_empty() {
                st.waiting = false;
                return Some(mem::take(&mut st.assigned));
            }
            if st.dismissed {
                st.waiting = false;
                return None;
            }
        }
    }

    /// Blocks until all workers are suspended.
    pub fn wait_quiescent(&self) {
        let mut progress = self.progress.lock().expect("hub poisoned");
        while !progress.quiescent {
            progress = self.transition.wait(progress).expect("hub poisoned");
        }
        if let Some(logger) = &self.logger {
            logger.log(HubEvent::Quiescent);
        }
    }

    /// Signals all workers to exit, discarding any residual packets. The
    /// hub is normally quiescent at this point.
    pub fn dismiss(&self) {
        for port in &self.ports {
            let mut st = port.state.lock().expect("port poisoned");
            st.assigned.clear();
            st.deferred.clear();
            st.dismissed = true;
            if st.waiting {
                port.resumable.notify_one();
            }
        }
        if let Some(logger) = &self.logger {
            logger.log(HubEvent::Dismissed);
        }
    }

    /// Writes the kill sentinel unless one is already written.
    pub fn kill(&self, code: u8) {
        let _ = self
            .killed
            .compare_exchange(NOT_KILLED, code, Ordering::AcqRel, Ordering::Acquire);
    }

    /// The kill sentinel, or [`NOT_KILLED`](crate::NOT_KILLED).
    pub fn killed(&self) -> u8 {
        self.killed.load(Ordering::Acquire)
    }

    /// A handle to the kill sentinel, for binding a kill switch.
    pub fn kill_handle(&self) -> Arc<AtomicU8> {
        self.killed.clone()
    }

    /// Records a fault; the first fault wins and later ones are dropped.
    pub fn fault(&self, fault: S) {
        let mut progress = self.progress.lock().expect("hub poisoned");
        if progress.fault.is_none() {
            progress.fault = Some(fault);
        }
    }

    /// Consumes the hub, yielding the first recorded fault if any.
    pub fn into_fault(self) -> Option<S> {
        self.progress.into_inner().expect("hub poisoned").fault
    }

    /// True when the stall detector declared the job deadlocked.
    pub fn deadlocked(&self) -> bool {
        self.progress.lock().expect("hub poisoned").deadlocked
    }

    /// Counts one unit of real progress toward stall detection.
    pub fn visit(&self) {
        self.visits.fetch_add(1, Ordering::Relaxed);
    }

    /// Logs the launch of a crew.
    pub(crate) fn log_launch(&self) {
        if let Some(logger) = &self.logger {
            logger.log(HubEvent::Launched(self.lanes()));
        }
    }

    /// Draws a recycled packet buffer, or allocates a fresh one.
    fn fresh_buffer(&self) -> Vec<M> {
        self.reserve.draw().unwrap_or_default()
    }

    /// Returns an exhausted packet buffer to the reserve.
    pub fn recycle(&self, mut spent: Vec<M>) {
        spent.clear();
        self.reserve.stock(spent);
    }
}

/// A worker's handle on its hub: its lane index, its pod, and its backoff
/// counter.
pub struct Mailbox<'a, M, S> {
    hub: &'a Hub<M, S>,
    index: usize,
    pod: Pod<M>,
    backoff: u32,
}

impl<'a, M, S> Mailbox<'a, M, S> {
    /// Creates the mailbox for one lane of a hub.
    pub fn new(hub: &'a Hub<M, S>, index: usize) -> Self {
        Mailbox {
            hub,
            index,
            pod: Pod::new(hub.lanes()),
            backoff: 0,
        }
    }

    /// This worker's lane index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The number of lanes in the job.
    pub fn lanes(&self) -> usize {
        self.pod.arity()
    }

    /// Buffers a packet for the given destination lane.
    pub fn post(&mut self, lane: usize, packet: M) {
        self.pod.buckets[lane].push(packet);
    }

    /// Parks a packet for retry once some other work has been done.
    pub fn defer(&mut self, packet: M) {
        self.pod.deferrals.push(packet);
    }

    /// Counts one unit of real progress toward stall detection.
    pub fn visit(&self) {
        self.hub.visit();
    }

    /// The job's kill sentinel.
    pub fn killed(&self) -> u8 {
        self.hub.killed()
    }

    /// Records a fault on the hub and kills the job internally so the rest
    /// of the pool drains.
    pub fn fail(&self, fault: S) {
        self.hub.fault(fault);
        self.hub.kill(KILLED_INTERNALLY);
    }

    /// Returns an exhausted packet buffer to the hub's reserve.
    pub fn recycle(&self, spent: Vec<M>) {
        self.hub.recycle(spent);
    }

    /// Acquires more packets on behalf of the worker, blocking if
    /// necessary after flushing whatever is ready to go. Returns `None`
    /// only on dismissal.
    pub fn recv(&mut self) -> Option<Vec<M>> {
        if !self.pod.buckets[self.index].is_empty() {
            let fresh = self.hub.fresh_buffer();
            return Some(mem::replace(&mut self.pod.buckets[self.index], fresh));
        }
        if let Some(batch) = self.hub.collect(self.index) {
            return Some(batch);
        }
        self.circulate();
        self.hub.await_more(self.index)
    }

    /// Dispatches all buffered packet lists to the other lanes' inboxes.
    /// If the job shows no other progress, recycles the pool's deferred
    /// packets; backs off exponentially under deferral pressure.
    fn circulate(&mut self) {
        let pressured = !self.pod.deferrals.is_empty();
        if pressured {
            let deferrals = mem::take(&mut self.pod.deferrals);
            self.hub.expose(self.index, deferrals);
        }
        let mut sent = false;
        for lane in 0..self.pod.arity() {
            if !self.pod.buckets[lane].is_empty() {
                sent = true;
                let fresh = self.hub.fresh_buffer();
                let batch = mem::replace(&mut self.pod.buckets[lane], fresh);
                self.hub.assign(lane, batch);
            }
        }
        if !sent {
            self.hub.undefer();
        }
        if pressured {
            let micros = (1u64 << self.backoff).min(MAX_SLEEP_MICROS);
            std::thread::sleep(Duration::from_micros(micros));
            if self.backoff < BACKOFF_LIMIT {
                self.backoff += 1;
            }
        } else {
            self.backoff = 0;
        }
    }

    /// Discards all further packets until dismissal.
    pub fn drain(&mut self) {
        while let Some(batch) = self.recv() {
            drop(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crew::enlist;

    #[test]
    fn countdown_chain_quiesces() {
        // Each packet n > 0 forwards n - 1 to lane n % lanes; eleven
        // packets circulate in total.
        let hub: Hub<u32, ()> = Hub::new(3);
        hub.assign(1, vec![10]);
        let counts = enlist(&hub, None, |mut mailbox: Mailbox<u32, ()>| {
            let mut seen = 0usize;
            while let Some(batch) = mailbox.recv() {
                for n in &batch {
                    seen += 1;
                    if *n > 0 {
                        let dest = (*n as usize - 1) % mailbox.lanes();
                        mailbox.post(dest, *n - 1);
                    }
                }
                mailbox.recycle(batch);
            }
            seen
        });
        assert_eq!(counts.iter().sum::<usize>(), 11);
    }

    #[test]
    fn deferred_packets_recirculate() {
        // The packet is deferred on first sight and processed on second.
        let hub: Hub<u32, ()> = Hub::new(1);
        hub.assign(0, vec![7]);
        let rounds = enlist(&hub, None, |mut mailbox: Mailbox<u32, ()>| {
            let mut sightings = 0usize;
            while let Some(batch) = mailbox.recv() {
                for n in batch {
                    sightings += 1;
                    if sightings == 1 {
                        mailbox.defer(n);
                    } else {
                        mailbox.visit();
                    }
                }
            }
            sightings
        });
        assert_eq!(rounds, vec![2]);
    }

    #[test]
    fn stall_detector_catches_livelock() {
        // A packet deferred forever makes no progress; the detector must
        // kill the job rather than let it spin.
        let hub: Hub<u32, ()> = Hub::new(2).with_stall_detection(true);
        hub.assign(0, vec![1]);
        enlist(&hub, None, |mut mailbox: Mailbox<u32, ()>| {
            while let Some(batch) = mailbox.recv() {
                for n in batch {
                    if mailbox.killed() == NOT_KILLED {
                        mailbox.defer(n);
                    }
                }
            }
        });
        assert!(hub.deadlocked());
    }

    #[test]
    fn first_fault_wins() {
        let hub: Hub<u32, &'static str> = Hub::new(1);
        hub.fault("first");
        hub.fault("second");
        assert_eq!(hub.into_fault(), Some("first"));
    }
}
