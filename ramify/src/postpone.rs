//! Relocating edges to follow their stationary siblings.

use ramify_communication::KillSwitch;

use crate::fault::Result;
use crate::graph::{Edge, Graph, NodeId};
use crate::runtime::sweep;
use crate::Lanes;

/// A specification for selectively laying parallel edges end to end.
///
/// Edges matching the postponable test are candidates for relocation:
/// a candidate pairs with the first stationary sibling (an edge of the
/// same node failing the test) accepted by the pair predicate, and moves
/// to that sibling's terminus under a label derived from both.
pub struct Postponer<V, E> {
    /// Iterate until no round relocates anything.
    pub fix: bool,
    /// Partitions a node's edges into postponable and stationary: the
    /// local vertex, the label, and the remote vertex.
    pub postponable: Box<dyn Fn(&V, &E, &V) -> Result<bool> + Send + Sync>,
    /// Accepts a (postponable, stationary) label pair for relocation.
    pub pred: Box<dyn Fn(&E, &E) -> Result<bool> + Send + Sync>,
    /// Creates the relocated edge's label from the pair.
    pub label: Box<dyn Fn(&E, &E) -> Result<E> + Send + Sync>,
}

/// Consumes a graph and returns it with postponable edges relocated to
/// the termini of their stationary siblings.
pub fn postponed<V, E>(
    graph: Graph<V, E>,
    postponer: &Postponer<V, E>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync,
    E: Send + Sync,
{
    let Some(base) = graph.base() else {
        return Ok(Graph::empty());
    };
    let lanes = lanes.resolve();
    let mut graph = graph;
    loop {
        let graph_ref = &graph;
        // A move: the edge at the index leaves its node for the sibling's
        // terminus, relabelled.
        let findings = sweep(
            lanes,
            kill,
            base,
            |id, post| {
                for edge in graph_ref.edges(id) {
                    post(edge.target);
                }
            },
            |_| Vec::new(),
            |_, id, moves: &mut Vec<(NodeId, u32, NodeId, E)>| {
                let local = graph_ref.vertex(id);
                let edges = graph_ref.edges(id);
                let mut postponable = Vec::with_capacity(edges.len());
                for edge in edges {
                    postponable.push((postponer.postponable)(
                        local,
                        &edge.label,
                        graph_ref.vertex(edge.target),
                    )?);
                }
                for (index, edge) in edges.iter().enumerate() {
                    if !postponable[index] {
                        continue;
                    }
                    for (sibling, stationary) in edges.iter().enumerate() {
                        if postponable[sibling] {
                            continue;
                        }
                        if (postponer.pred)(&edge.label, &stationary.label)? {
                            let relabelled =
                                (postponer.label)(&edge.label, &stationary.label)?;
                            moves.push((id, index as u32, stationary.target, relabelled));
                            break;
                        }
                    }
                }
                Ok(())
            },
        )?;
        let mut moves = Vec::new();
        for (found, _) in findings {
            moves.extend(found);
        }
        let changed = moves.len();
        // Remove in descending index order so earlier removals don't
        // shift later ones.
        moves.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        for (id, index, landing, label) in moves {
            let removed = graph.node_mut(id).edges_out.remove(index as usize);
            graph.node_mut(landing).edges_out.push(Edge {
                label,
                target: removed.target,
            });
        }
        if !postponer.fix || changed == 0 {
            break;
        }
    }
    Ok(graph)
}
