//! Fissioning vertices into anabolic and catabolic copies.

use itertools::Itertools;

use ramify_communication::KillSwitch;

use crate::fault::Result;
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::kernel::Prop;
use crate::runtime::{prop_pass, reverse_index, sweep, Rev};
use crate::Lanes;

/// A conditional relabelling of one edge endpoint: the predicate decides
/// whether the edge exists at all, the operator makes its label. Both see
/// the properties of the original edge's endpoints and its label.
pub struct Labeler<P, E> {
    /// Requests the edge when true.
    pub pred: Box<dyn Fn(&P, &E, &P) -> Result<bool> + Send + Sync>,
    /// Makes the edge's label.
    pub label: Box<dyn Fn(&P, &E, &P) -> Result<E> + Send + Sync>,
}

/// The labelers routing one side of a split node's edges to its two
/// copies.
pub struct LabelerPair<P, E> {
    /// Edges connected to the anabolic copy.
    pub ana: Labeler<P, E>,
    /// Edges connected to the catabolic copy.
    pub cata: Labeler<P, E>,
}

/// A specification for transforming a graph by fissioning vertices into
/// two copies each, with edges routed and relabelled around them.
pub struct Splitter<V, E, P> {
    /// Requests fission of a vertex.
    pub fissile: Box<dyn Fn(&V, &P) -> Result<bool> + Send + Sync>,
    /// Computes the anabolic copy's vertex.
    pub ana: Box<dyn Fn(&V, &P) -> Result<V> + Send + Sync>,
    /// Computes the catabolic copy's vertex, the doppelganger.
    pub cata: Box<dyn Fn(&V, &P) -> Result<V> + Send + Sync>,
    /// Initialises the property consulted by the other operators.
    pub prop: Prop<V, E, P>,
    /// Routes and relabels incoming edges of split nodes.
    pub inward: LabelerPair<P, E>,
    /// Routes and relabels outgoing edges of split nodes.
    pub outward: LabelerPair<P, E>,
}

/// Where an original node went in the split graph.
#[derive(Clone, Copy)]
enum Replacement {
    Kept(u32),
    /// Anabolic and catabolic slots, in that order.
    Split(u32, u32),
}

/// Consumes a graph and returns it with every fissile vertex replaced by
/// an anabolic and a catabolic copy.
///
/// An edge with a split endpoint is re-derived by the splitter's
/// labelers: the outward pair for a split source, then the inward pair
/// for a split target, composing when both ends split. Edges between
/// unsplit nodes carry over unchanged. The base of the result is the
/// anabolic copy when the base splits.
pub fn split<V, E, P>(
    graph: Graph<V, E>,
    splitter: &Splitter<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync,
    E: Send + Sync + Clone,
    P: Send + Sync,
{
    let Some(base) = graph.base() else {
        return Ok(Graph::empty());
    };
    let lanes = lanes.resolve();
    let rev: Option<Rev> = splitter
        .prop
        .wants_incident()
        .then(|| reverse_index(&graph, lanes));
    let (properties, reach) =
        prop_pass(&graph, &splitter.prop, rev.as_ref(), lanes, kill, base)?;
    let property = |id: NodeId| {
        properties[id.index()]
            .as_ref()
            .expect("split node lacks its property")
    };
    // Decide fission and compute the copies' vertices.
    let graph_ref = &graph;
    let fission = sweep(
        lanes,
        kill,
        base,
        |id, post| {
            for edge in graph_ref.edges(id) {
                post(edge.target);
            }
        },
        |_| Vec::new(),
        |_, id, found: &mut Vec<(NodeId, Option<(V, V)>)>| {
            let vertex = graph_ref.vertex(id);
            let p = property(id);
            let copies = if (splitter.fissile)(vertex, p)? {
                Some(((splitter.ana)(vertex, p)?, (splitter.cata)(vertex, p)?))
            } else {
                None
            };
            found.push((id, copies));
            Ok(())
        },
    )?;
    let mut planned: Vec<Option<Option<(V, V)>>> = std::iter::repeat_with(|| None)
        .take(graph.size())
        .collect();
    for (found, _) in fission {
        for (id, copies) in found {
            planned[id.index()] = Some(copies);
        }
    }
    // Lay out the new arena: reachable nodes in identity order, two slots
    // per split node.
    let order: Vec<NodeId> = reach.iter().flatten().copied().sorted_unstable().collect();
    let mut replacement: Vec<Option<Replacement>> = vec![None; graph.size()];
    let mut vertices: Vec<Option<V>> = Vec::new();
    for &id in &order {
        match planned[id.index()].take().expect("unplanned reachable node") {
            Some((ana, cata)) => {
                replacement[id.index()] =
                    Some(Replacement::Split(vertices.len() as u32, vertices.len() as u32 + 1));
                vertices.push(Some(ana));
                vertices.push(Some(cata));
            }
            None => {
                replacement[id.index()] = Some(Replacement::Kept(vertices.len() as u32));
                vertices.push(None);
            }
        }
    }
    // Route every original edge through the labelers.
    let mut edges: Vec<Vec<Edge<E>>> = vec![Vec::new(); vertices.len()];
    for &id in &order {
        let from = replacement[id.index()].expect("unplaced node");
        for edge in graph.edges(id) {
            let to = replacement[edge.target.index()].expect("unplaced terminus");
            let pu = property(id);
            let pv = property(edge.target);
            // The labels leaving each surviving source copy.
            let mut sources: Vec<(u32, E)> = Vec::new();
            match from {
                Replacement::Kept(slot) => sources.push((slot, edge.label.clone())),
                Replacement::Split(ana, cata) => {
                    let out = &splitter.outward;
                    if (out.ana.pred)(pu, &edge.label, pv)? {
                        sources.push((ana, (out.ana.label)(pu, &edge.label, pv)?));
                    }
                    if (out.cata.pred)(pu, &edge.label, pv)? {
                        sources.push((cata, (out.cata.label)(pu, &edge.label, pv)?));
                    }
                }
            }
            for (slot, label) in sources {
                match to {
                    Replacement::Kept(target) => edges[slot as usize].push(Edge {
                        label,
                        target: NodeId::new(target as usize),
                    }),
                    Replacement::Split(ana, cata) => {
                        let inw = &splitter.inward;
                        if (inw.ana.pred)(pu, &label, pv)? {
                            edges[slot as usize].push(Edge {
                                label: (inw.ana.label)(pu, &label, pv)?,
                                target: NodeId::new(ana as usize),
                            });
                        }
                        if (inw.cata.pred)(pu, &label, pv)? {
                            edges[slot as usize].push(Edge {
                                label: (inw.cata.label)(pu, &label, pv)?,
                                target: NodeId::new(cata as usize),
                            });
                        }
                    }
                }
            }
        }
    }
    // Assemble, moving kept vertices out of the old arena.
    let new_base = match replacement[base.index()].expect("unplaced base") {
        Replacement::Kept(slot) => NodeId::new(slot as usize),
        Replacement::Split(ana, _) => NodeId::new(ana as usize),
    };
    let kept_slot: Vec<Option<NodeId>> = replacement
        .iter()
        .map(|r| match r {
            Some(Replacement::Kept(slot)) => Some(NodeId::new(*slot as usize)),
            _ => None,
        })
        .collect();
    let (old_nodes, _) = graph.into_parts();
    for (index, node) in old_nodes.into_iter().enumerate() {
        if let Some(slot) = kept_slot[index] {
            vertices[slot.index()] = Some(node.vertex);
        }
    }
    let nodes = vertices
        .into_iter()
        .zip(edges)
        .map(|(vertex, edges_out)| Node {
            vertex: vertex.expect("vacant split slot"),
            edges_out,
        })
        .collect();
    Ok(Graph::from_parts(nodes, Some(new_base)))
}
