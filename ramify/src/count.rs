//! Counting nodes and edges.
//!
//! Counts cover the whole arena, one lane per share, so graphs carrying
//! nodes the base does not reach, full Cartesian products among them,
//! are measured in their entirety.

use crate::graph::Graph;
use crate::runtime::tally;
use crate::Lanes;

/// The number of nodes in a graph.
pub fn vertex_count<V: Sync, E: Sync>(graph: &Graph<V, E>, lanes: Lanes) -> usize {
    tally(graph, lanes.resolve(), |_| 1)
}

/// The number of outgoing edges in a graph.
pub fn edge_count<V: Sync, E: Sync>(graph: &Graph<V, E>, lanes: Lanes) -> usize {
    tally(graph, lanes.resolve(), |id| graph.degree(id))
}
