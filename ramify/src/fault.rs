//! Failure conditions reported by graph operations.

use thiserror::Error;

/// The outcome type of every fallible operation and client callback.
pub type Result<T> = std::result::Result<T, Fault>;

/// A condition preventing an operation from completing.
///
/// The first fault raised by any worker decides a job's outcome; later
/// faults raised while the pool winds down are dropped. Client callbacks
/// report their own failures either as one of these conditions or through
/// the numeric escape hatch [`Fault::App`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Fault {
    /// The job was cancelled through its kill switch.
    #[error("the operation was killed")]
    Interrupted,
    /// A build or expansion exceeded its vertex limit.
    #[error("the vertex limit was exceeded")]
    Overflow,
    /// A constrained-order traversal of a cyclic graph stopped making
    /// progress.
    #[error("constrained-order traversal deadlocked")]
    Deadlocked,
    /// A fold over an empty graph has no vacuous case to fall back on.
    #[error("the graph is empty and no vacuous case is defined")]
    EmptyGraph,
    /// An induction reached a node without prerequisites and has neither a
    /// boundary operator nor a vacuous case.
    #[error("a node without prerequisites has no boundary value")]
    MissingBoundary,
    /// A vertex looked up in a partition belongs to none of its classes.
    #[error("the vertex belongs to no class of the partition")]
    UnrelatedVertex,
    /// Two distinct nodes carried equal vertices during partitioning.
    #[error("duplicate vertex encountered while partitioning")]
    DuplicateVertex,
    /// An unordered mutation's vertex operation depends on adjacent edges.
    #[error("unordered mutation with an edge-dependent vertex operation")]
    IncoherentMutation,
    /// An application-defined failure raised by a client callback.
    #[error("application error {0}")]
    App(i32),
}
