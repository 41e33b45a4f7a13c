//! Ramify is a concurrent in-memory directed-graph transformation engine.
//!
//! A client describes a graph implicitly, by a seed vertex plus a
//! [connector](build::Connector) naming the outgoing edges of any vertex,
//! and [`built`](build::built) materialises it by exploring from the seed
//! in parallel
//! across a pool of worker lanes. The materialised [`Graph`] then supports
//! a closed algebra of transformations, each expressed as a parallel
//! scatter/gather traversal over the same worker runtime: products,
//! isomorphic copies, map-reduce and induction, equivalence-class
//! partitioning and merging, filtering, edge composition, vertex splitting
//! and stretching, edge postponement, in-place mutation, deduplication,
//! and parallel reclamation.
//!
//! The code is organised in crates that depend as little as possible on
//! each other.
//!
//! **Communication**: the [`ramify_communication`] crate owns the packet
//! transport: per-lane ports and pods, the quiescence-detecting hub,
//! crews of scoped worker threads, kill switches, and packet reserves.
//!
//! **Logging**: the [`ramify_logging`] crate provides the typed event
//! logging the engine reports its job lifecycles through; see
//! [`observe`].
//!
//! **Operations**: this crate defines the graph model and one module per
//! operation, each a thin specialisation of the shared traversal runtime.
//!
//! # Examples
//!
//! Build the four-cycle over `0..4` and count it:
//!
//! ```
//! use ramify::build::{built, Builder};
//! use ramify::count::{edge_count, vertex_count};
//! use ramify::Lanes;
//!
//! let builder = Builder::connecting(|&v: &u32, growth| {
//!     growth.connect((), (v + 1) % 4);
//!     Ok(())
//! });
//! let graph = built(builder, 0u32, None, Lanes::Auto).unwrap();
//! assert_eq!(vertex_count(&graph, Lanes::Auto), 4);
//! assert_eq!(edge_count(&graph, Lanes::Auto), 4);
//! ```

#![forbid(missing_docs)]

pub mod build;
pub mod classify;
pub mod compose;
pub mod count;
pub mod cross;
pub mod dedup;
pub mod fabricate;
mod fault;
pub mod filter;
mod graph;
pub mod induce;
pub mod kernel;
pub mod mapreduce;
pub mod merge;
pub mod mutate;
pub mod observe;
pub mod postpone;
pub mod reclaim;
mod runtime;
pub mod split;
pub mod stretch;
pub mod zones;

pub use fault::{Fault, Result};
pub use graph::{Edge, Graph, NodeId};
pub use ramify_communication::KillSwitch;

/// How many worker lanes an operation runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Lanes {
    /// One lane per available core.
    #[default]
    Auto,
    /// Single-threaded operation.
    Solo,
    /// Exactly this many lanes, capped at the engine's limit.
    Count(usize),
}

impl Lanes {
    /// The concrete lane count.
    pub(crate) fn resolve(self) -> usize {
        use ramify_communication::LANE_LIMIT;
        match self {
            Lanes::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(LANE_LIMIT),
            Lanes::Solo => 1,
            Lanes::Count(n) => n.clamp(1, LANE_LIMIT),
        }
    }
}
