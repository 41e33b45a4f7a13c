//! Fusing equal vertices and identical edges.

use std::collections::HashSet;
use std::hash::Hash;

use ramify_communication::KillSwitch;

use crate::classify::classed;
use crate::fault::Result;
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::runtime::{hash_of, lane_of};
use crate::Lanes;

/// Consumes a graph and returns one in which no two nodes carry equal
/// vertices and no node carries two outgoing edges agreeing in both
/// label and terminus.
///
/// Nodes with equal vertices fuse into the first of their class; the
/// fused node's outgoing edges are the deduplicated union of the class
/// members' edges. The whole arena participates, reachable from the base
/// or not.
pub fn deduplicated<V, E>(
    graph: Graph<V, E>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync + Hash + Eq,
    E: Send + Sync + Hash + Eq + Clone,
{
    if graph.is_empty() {
        return Ok(Graph::empty());
    }
    let lanes_count = lanes.resolve();
    // Bin the whole arena by vertex, chaining within lanes by equality.
    let members: Vec<HashSet<NodeId>> = (0..lanes_count)
        .map(|lane| {
            graph
                .ids()
                .filter(|&id| lane_of(id, lanes_count) == lane)
                .collect()
        })
        .collect();
    let classes = classed(
        lanes_count,
        kill,
        &members,
        |id| hash_of(graph.vertex(id)),
        |a, b| graph.vertex(a) == graph.vertex(b),
    )?;
    // Each class becomes one node of the result, at the class's index.
    let mut node_class = vec![0u32; graph.size()];
    for (class, ids) in classes.iter().enumerate() {
        for &id in ids {
            node_class[id.index()] = class as u32;
        }
    }
    let base = graph.base().map(|b| NodeId::new(node_class[b.index()] as usize));
    let (old_nodes, _) = graph.into_parts();
    let mut old_nodes: Vec<Option<Node<V, E>>> = old_nodes.into_iter().map(Some).collect();
    let mut nodes = Vec::with_capacity(classes.len());
    for ids in &classes {
        let mut taken = old_nodes[ids[0].index()].take().expect("fused node taken twice");
        let mut edges_out = Vec::new();
        let mut seen: HashSet<(E, u32)> = HashSet::new();
        let mut absorb = |edges: Vec<Edge<E>>, out: &mut Vec<Edge<E>>| {
            for edge in edges {
                let target = node_class[edge.target.index()];
                if seen.insert((edge.label.clone(), target)) {
                    out.push(Edge {
                        label: edge.label,
                        target: NodeId::new(target as usize),
                    });
                }
            }
        };
        absorb(std::mem::take(&mut taken.edges_out), &mut edges_out);
        for &other in &ids[1..] {
            let duplicate = old_nodes[other.index()].take().expect("fused node taken twice");
            absorb(duplicate.edges_out, &mut edges_out);
        }
        nodes.push(Node {
            vertex: taken.vertex,
            edges_out,
        });
    }
    Ok(Graph::from_parts(nodes, base))
}
