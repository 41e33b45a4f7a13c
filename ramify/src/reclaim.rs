//! Reclaiming graphs.
//!
//! Dropping a [`Graph`](crate::Graph) reclaims it synchronously by
//! walking the arena once. The functions here trade that walk for
//! parallelism or for the caller's time: [`free_now`] deals the arena out
//! to a crew of lanes and blocks until every share is dropped, while
//! [`free_later`] hands the whole graph to a single background thread and
//! returns immediately.

use std::thread;

use crate::graph::Graph;
use crate::runtime::lane_of;
use crate::Lanes;

/// Reclaims a graph across a crew of lanes and blocks until done.
pub fn free_now<V, E>(graph: Graph<V, E>, lanes: Lanes)
where
    V: Send,
    E: Send,
{
    let lanes = lanes.resolve();
    let (nodes, _) = graph.into_parts();
    let mut shares: Vec<Vec<_>> = Vec::with_capacity(lanes);
    for _ in 0..lanes {
        shares.push(Vec::new());
    }
    for (index, node) in nodes.into_iter().enumerate() {
        shares[lane_of(crate::NodeId::new(index), lanes)].push(node);
    }
    thread::scope(|scope| {
        for share in shares {
            scope.spawn(move || drop(share));
        }
    });
}

/// Starts reclaiming a graph in a single background thread and returns
/// immediately.
pub fn free_later<V, E>(graph: Graph<V, E>)
where
    V: Send + 'static,
    E: Send + 'static,
{
    thread::spawn(move || drop(graph));
}
