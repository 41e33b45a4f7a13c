//! Isomorphic copies under vertex and label transformations.

use ramify_communication::KillSwitch;

use crate::fault::Result;
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::runtime::sweep;
use crate::Lanes;

/// A specification for building a graph isomorphic to a given one.
pub struct Fabricator<V, E, W, F> {
    /// Fabricates the vertex corresponding to an original vertex.
    pub vertex: Box<dyn Fn(&V) -> Result<W> + Send + Sync>,
    /// Fabricates the label corresponding to an original label.
    pub label: Box<dyn Fn(&E) -> Result<F> + Send + Sync>,
}

impl<V, E, W, F> Fabricator<V, E, W, F> {
    /// A fabricator from its two operators.
    pub fn new(
        vertex: impl Fn(&V) -> Result<W> + Send + Sync + 'static,
        label: impl Fn(&E) -> Result<F> + Send + Sync + 'static,
    ) -> Self {
        Fabricator {
            vertex: Box::new(vertex),
            label: Box::new(label),
        }
    }
}

/// Builds a graph isomorphic to the subgraph reachable from the base,
/// with every vertex and label passed through the fabricator.
///
/// Node identities are preserved: the copy of a node occupies the slot
/// its original occupies, so the structure is identical under the
/// identity on [`NodeId`].
pub fn fabricated<V, E, W, F>(
    graph: &Graph<V, E>,
    fabricator: &Fabricator<V, E, W, F>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<W, F>>
where
    V: Sync,
    E: Sync,
    W: Send,
    F: Send,
{
    let Some(base) = graph.base() else {
        return Ok(Graph::empty());
    };
    let lanes = lanes.resolve();
    let results = sweep(
        lanes,
        kill,
        base,
        |id, post| {
            for edge in graph.edges(id) {
                post(edge.target);
            }
        },
        |_| Vec::new(),
        |_, id, share: &mut Vec<(NodeId, Node<W, F>)>| {
            let mut edges_out = Vec::with_capacity(graph.degree(id));
            for edge in graph.edges(id) {
                edges_out.push(Edge {
                    label: (fabricator.label)(&edge.label)?,
                    target: edge.target,
                });
            }
            share.push((
                id,
                Node {
                    vertex: (fabricator.vertex)(graph.vertex(id))?,
                    edges_out,
                },
            ));
            Ok(())
        },
    )?;
    let mut nodes: Vec<Option<Node<W, F>>> = std::iter::repeat_with(|| None)
        .take(graph.size())
        .collect();
    for (share, _) in results {
        for (id, node) in share {
            nodes[id.index()] = Some(node);
        }
    }
    // Nodes the base does not reach have no counterpart; fabrication
    // covers the reachable subgraph, which is the whole of any built
    // graph. Compact the copy if anything was out of reach.
    if nodes.iter().all(Option::is_some) {
        let nodes = nodes.into_iter().map(|n| n.expect("fabricated node")).collect();
        Ok(Graph::from_parts(nodes, Some(base)))
    } else {
        Ok(compacted(nodes, base))
    }
}

/// Renumbers a partially fabricated arena, dropping vacant slots.
fn compacted<W, F>(nodes: Vec<Option<Node<W, F>>>, base: NodeId) -> Graph<W, F> {
    let mut relocation = vec![u32::MAX; nodes.len()];
    let mut kept = Vec::new();
    for (index, node) in nodes.into_iter().enumerate() {
        if let Some(node) = node {
            relocation[index] = kept.len() as u32;
            kept.push(node);
        }
    }
    for node in &mut kept {
        for edge in &mut node.edges_out {
            edge.target = NodeId::new(relocation[edge.target.index()] as usize);
        }
    }
    let base = NodeId::new(relocation[base.index()] as usize);
    Graph::from_parts(kept, Some(base))
}
