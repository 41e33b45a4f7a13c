//! Rewriting vertices and edge labels in place.

use std::collections::HashSet;
use std::sync::{OnceLock, RwLock};

use ramify_communication::KillSwitch;

use crate::fault::{Fault, Result};
use crate::graph::{Graph, NodeId};
use crate::kernel::EdgeFold;
use crate::runtime::{ordered_traverse, reverse_index, sweep, Rev};
use crate::zones::{Order, Plan};
use crate::Lanes;

/// The paired operations rewriting one node.
///
/// The vertex operation receives the old vertex and the folded results
/// over its incident and outgoing edges; under a constrained order each
/// fold sees the already-rewritten values of the nodes visited before the
/// local one and the original values of the rest. The label operation
/// receives the local vertex (rewritten under a constrained order,
/// original otherwise), the old label, and the remote vertex's current
/// value.
pub struct MutationKernel<V, E, P> {
    /// Rewrites a vertex.
    pub vertex: Box<dyn Fn(&V, Option<P>, Option<P>) -> Result<V> + Send + Sync>,
    /// Folds over incident edges, feeding the vertex operation.
    pub incident: Option<EdgeFold<V, E, P>>,
    /// Folds over outgoing edges, feeding the vertex operation.
    pub outgoing: Option<EdgeFold<V, E, P>>,
    /// Rewrites an outgoing edge label.
    pub label: Option<Box<dyn Fn(&V, &E, &V) -> Result<E> + Send + Sync>>,
}

/// A specification for modifying a graph in place.
pub struct Mutator<V, E, P> {
    /// Where to mutate and in what order. Mutation walks the zone
    /// forward from its start; the zone's direction flag is not
    /// consulted.
    pub plan: Plan<V>,
    /// How to mutate.
    pub kernel: MutationKernel<V, E, P>,
}

/// Consumes a graph and returns it with the kernel applied to every
/// reachable node.
///
/// An unconstrained plan forbids kernels whose vertex operation depends
/// on adjacent edges, since no consistent reading order would exist;
/// such kernels require a local-first or remote-first plan, which uses
/// induction-style readiness and reports deadlock on cycles unless the
/// plan ignores it.
pub fn mutated<V, E, P>(
    graph: Graph<V, E>,
    mutator: &Mutator<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync + Eq,
    E: Send + Sync,
    P: Send + Sync,
{
    let kernel = &mutator.kernel;
    let edge_dependent = kernel.incident.is_some() || kernel.outgoing.is_some();
    if mutator.plan.order == Order::Unconstrained && edge_dependent {
        return Err(Fault::IncoherentMutation);
    }
    let Some(start) = graph.start_of(mutator.plan.zone.initial.as_ref())? else {
        return Ok(Graph::empty());
    };
    let lanes = lanes.resolve();
    match mutator.plan.order {
        Order::Unconstrained => unordered(graph, mutator, kill, lanes, start),
        order => ordered(graph, mutator, kill, lanes, start, order),
    }
}

/// Rewrites with no ordering constraint: every vertex operation sees only
/// its own vertex, and label operations see original adjacent values.
fn unordered<V, E, P>(
    graph: Graph<V, E>,
    mutator: &Mutator<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: usize,
    start: NodeId,
) -> Result<Graph<V, E>>
where
    V: Send + Sync,
    E: Send + Sync,
    P: Send + Sync,
{
    let kernel = &mutator.kernel;
    let graph_ref = &graph;
    let rewrites = sweep(
        lanes,
        kill,
        start,
        |id, post| {
            for edge in graph_ref.edges(id) {
                post(edge.target);
            }
        },
        |_| Vec::new(),
        |_, id, found: &mut Vec<(NodeId, V, Option<Vec<E>>)>| {
            let vertex = (kernel.vertex)(graph_ref.vertex(id), None, None)?;
            let labels = match &kernel.label {
                Some(relabel) => {
                    let mut labels = Vec::with_capacity(graph_ref.degree(id));
                    for edge in graph_ref.edges(id) {
                        labels.push(relabel(
                            graph_ref.vertex(id),
                            &edge.label,
                            graph_ref.vertex(edge.target),
                        )?);
                    }
                    Some(labels)
                }
                None => None,
            };
            found.push((id, vertex, labels));
            Ok(())
        },
    )?;
    let mut graph = graph;
    for (found, _) in rewrites {
        for (id, vertex, labels) in found {
            let node = graph.node_mut(id);
            node.vertex = vertex;
            if let Some(labels) = labels {
                for (edge, label) in node.edges_out.iter_mut().zip(labels) {
                    edge.label = label;
                }
            }
        }
    }
    Ok(graph)
}

/// Rewrites under a constrained order, reading adjacent values through
/// per-node cells so peers observe rewritten values exactly when their
/// owners were visited first.
fn ordered<V, E, P>(
    graph: Graph<V, E>,
    mutator: &Mutator<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: usize,
    start: NodeId,
    order: Order,
) -> Result<Graph<V, E>>
where
    V: Send + Sync,
    E: Send + Sync,
    P: Send + Sync,
{
    let kernel = &mutator.kernel;
    let rev: Rev = reverse_index(&graph, lanes);
    let graph_ref = &graph;
    // The zone, per owning lane.
    let reach: Vec<HashSet<NodeId>> = sweep(
        lanes,
        kill,
        start,
        |id, post| {
            for edge in graph_ref.edges(id) {
                post(edge.target);
            }
        },
        |_| (),
        |_, _, _| Ok(()),
    )?
    .into_iter()
    .map(|((), seen)| seen)
    .collect();
    let cells: Vec<RwLock<Option<V>>> = (0..graph.size()).map(|_| RwLock::new(None)).collect();
    let labels: Vec<OnceLock<Vec<E>>> = (0..graph.size()).map(|_| OnceLock::new()).collect();
    let cells_ref = &cells;
    let labels_ref = &labels;
    let rev_ref = &rev;
    // Reads a node's current value into the fold without holding the
    // lock across a callback.
    let with_current = |id: NodeId, read: &mut dyn FnMut(&V) -> Result<()>| -> Result<()> {
        let guard = cells_ref[id.index()].read().expect("mutation cell poisoned");
        match &*guard {
            Some(rewritten) => read(rewritten),
            None => read(graph_ref.vertex(id)),
        }
    };
    ordered_traverse(
        lanes,
        kill,
        !mutator.plan.ignore_deadlock,
        start,
        |id, post| {
            for edge in graph_ref.edges(id) {
                post(edge.target);
            }
        },
        |id, post| match order {
            Order::LocalFirst => {
                for &(source, _) in &rev_ref[id.index()] {
                    post(source);
                }
            }
            _ => {
                for edge in graph_ref.edges(id) {
                    post(edge.target);
                }
            }
        },
        &reach,
        |id| {
            let old = graph_ref.vertex(id);
            let incident = folded_adjacency(
                kernel.incident.as_ref(),
                old,
                rev_ref[id.index()]
                    .iter()
                    .map(|&(source, index)| (source, &graph_ref.edges(source)[index as usize].label)),
                &with_current,
            )?;
            let outgoing = folded_adjacency(
                kernel.outgoing.as_ref(),
                old,
                graph_ref.edges(id).iter().map(|edge| (edge.target, &edge.label)),
                &with_current,
            )?;
            let rewritten = (kernel.vertex)(old, incident, outgoing)?;
            if let Some(relabel) = &kernel.label {
                let mut fresh = Vec::with_capacity(graph_ref.degree(id));
                for edge in graph_ref.edges(id) {
                    let mut label = None;
                    with_current(edge.target, &mut |remote| {
                        label = Some(relabel(&rewritten, &edge.label, remote)?);
                        Ok(())
                    })?;
                    fresh.push(label.expect("relabelling read nothing"));
                }
                let _ = labels_ref[id.index()].set(fresh);
            }
            *cells_ref[id.index()].write().expect("mutation cell poisoned") = Some(rewritten);
            Ok(())
        },
    )?;
    drop(rev);
    let mut graph = graph;
    for (index, cell) in cells.into_iter().enumerate() {
        if let Some(rewritten) = cell.into_inner().expect("mutation cell poisoned") {
            graph.node_mut(NodeId::new(index)).vertex = rewritten;
        }
    }
    for (index, cell) in labels.into_iter().enumerate() {
        if let Some(fresh) = cell.into_inner() {
            let node = graph.node_mut(NodeId::new(index));
            for (edge, label) in node.edges_out.iter_mut().zip(fresh) {
                edge.label = label;
            }
        }
    }
    Ok(graph)
}

/// Folds an adjacency through a kernel fold, reading each remote value
/// at its current state.
fn folded_adjacency<'a, V, E: 'a, P>(
    fold: Option<&EdgeFold<V, E, P>>,
    local: &V,
    adjacency: impl Iterator<Item = (NodeId, &'a E)>,
    with_current: &dyn Fn(NodeId, &mut dyn FnMut(&V) -> Result<()>) -> Result<()>,
) -> Result<Option<P>> {
    let Some(fold) = fold else {
        return Ok(None);
    };
    let mut running: Option<P> = None;
    let mut any = false;
    for (remote, label) in adjacency {
        any = true;
        with_current(remote, &mut |value| {
            let mapped = fold.map_one(local, label, value)?;
            running = Some(match running.take() {
                None => mapped,
                Some(previous) => fold.reduce_two(previous, mapped)?,
            });
            Ok(())
        })?;
    }
    if !any && running.is_none() {
        return fold.vacuous_value();
    }
    Ok(running)
}
