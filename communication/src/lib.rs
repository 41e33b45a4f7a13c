//! Packet transport and worker coordination for the ramify graph engine.
//!
//! A job is run by a crew of worker threads, one per *lane*, exchanging
//! packets through per-lane mailboxes. The pieces are:
//!
//! **Pods**: each worker buffers outgoing packets in a thread-local
//! [`Pod`](pod::Pod), an array of packet lists bucketed by destination
//! lane, so that sending requires no locking until the buffered lists are
//! flushed.
//!
//! **Ports**: each lane owns a [`Port`](port::Port), a mutex-guarded inbox
//! with a condition variable on which its worker suspends when the pool
//! has nothing for it to do. Packets whose prerequisites are unavailable
//! park in the port's deferred list, visible to the whole pool.
//!
//! **The hub**: a [`Hub`](hub::Hub) ties the ports of one job together and
//! detects quiescence: when every worker is suspended with an empty inbox,
//! no further progress is possible and the supervising thread dismisses
//! the crew. The hub also carries the job's kill sentinel and its first
//! fault.
//!
//! **Crews**: [`enlist`](crew::enlist) spawns one scoped worker thread per
//! lane, supervises the job to quiescence, and hands back the workers'
//! results for reduction by the caller.
//!
//! **Kill switches**: a client-held [`KillSwitch`](kill::KillSwitch) can
//! be bound to at most one running job and fired from any thread.

#![forbid(missing_docs)]

pub mod crew;
pub mod hub;
pub mod kill;
pub mod pod;
pub mod port;
pub mod reserve;

pub use crew::enlist;
pub use hub::{Hub, HubEvent, Mailbox};
pub use kill::KillSwitch;
pub use reserve::Reserve;

/// Sentinel value of an unkilled job.
pub const NOT_KILLED: u8 = 0;

/// Kill sentinel written on behalf of a client through a kill switch.
pub const KILLED_BY_USER: u8 = 1;

/// Kill sentinel written by a worker terminating the job after a local
/// fault, or by the hub's stall detector.
pub const KILLED_INTERNALLY: u8 = 2;

/// Most lanes any job may use.
pub const LANE_LIMIT: usize = 1024;

/// Log of the maximum microsleep used in the exponential backoff protocol.
pub const BACKOFF_LIMIT: u32 = 18;
