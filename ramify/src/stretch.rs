//! Interposing new vertices along edges.

use smallvec::SmallVec;

use ramify_communication::{enlist, KillSwitch, NOT_KILLED};

use crate::fault::Result;
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::kernel::Prop;
use crate::runtime::{lane_of, new_hub, outcome, prop_of, prop_pass, reverse_index, Rev};
use crate::Lanes;

/// The emission handle an expander asserts interpositions through.
pub struct Stretching<V, E> {
    triples: SmallVec<[(E, V, E); 2]>,
}

impl<V, E> Stretching<V, E> {
    fn new() -> Self {
        Stretching {
            triples: SmallVec::new(),
        }
    }

    /// Asserts a new vertex in series with the edge under consideration,
    /// entered by `label_in` and left by `label_out`.
    pub fn stretch(&mut self, label_in: E, vertex: V, label_out: E) {
        self.triples.push((label_in, vertex, label_out));
    }
}

/// A specification for interposing vertices along selected edges.
///
/// The expander sees the properties of an edge's endpoints and its label;
/// returning `true` with at least one asserted triple replaces the edge
/// by one path per triple through a fresh interposed vertex. With `fix`
/// set, rounds continue over freshly created edges until nothing more
/// stretches.
pub struct Stretcher<V, E, P> {
    /// Iterate to a fixed point.
    pub fix: bool,
    /// Decides and describes the interpositions for one edge.
    pub expander:
        Box<dyn Fn(&P, &E, &P, &mut Stretching<V, E>) -> Result<bool> + Send + Sync>,
    /// Initialises the property consulted by the expander.
    pub prop: Prop<V, E, P>,
}

/// Consumes a graph and returns it with vertices interposed along every
/// edge the expander stretches.
///
/// Interposed vertices see only their own outgoing edge when their
/// property is initialised.
pub fn stretched<V, E, P>(
    graph: Graph<V, E>,
    stretcher: &Stretcher<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync,
    E: Send + Sync,
    P: Send + Sync,
{
    let Some(base) = graph.base() else {
        return Ok(Graph::empty());
    };
    let lanes = lanes.resolve();
    let rev: Option<Rev> = stretcher
        .prop
        .wants_incident()
        .then(|| reverse_index(&graph, lanes));
    let (mut properties, reach) =
        prop_pass(&graph, &stretcher.prop, rev.as_ref(), lanes, kill, base)?;
    drop(rev);
    let mut graph = graph;
    // The edges eligible this round; initially every reachable edge.
    let mut active: Vec<(NodeId, u32)> = Vec::new();
    for seen in &reach {
        for &id in seen {
            for index in 0..graph.degree(id) as u32 {
                active.push((id, index));
            }
        }
    }
    loop {
        let stretches = examined(&graph, stretcher, &properties, &active, kill, lanes)?;
        let changed = stretches.len();
        active.clear();
        // Apply per node: drop stretched edges, wire in the new paths.
        let mut by_node: Vec<(NodeId, Vec<(u32, SmallVec<[(E, V, E); 2]>)>)> = Vec::new();
        for (id, index, triples) in stretches {
            match by_node.last_mut() {
                Some((last, list)) if *last == id => list.push((index, triples)),
                _ => by_node.push((id, vec![(index, triples)])),
            }
        }
        for (id, list) in by_node {
            let stretched_indices: Vec<u32> = list.iter().map(|(i, _)| *i).collect();
            let mut fresh: Vec<Edge<E>> = Vec::new();
            for (index, triples) in list {
                let target = graph.edges(id)[index as usize].target;
                for (label_in, vertex, label_out) in triples {
                    let interposed = graph.push_node(Node {
                        vertex,
                        edges_out: vec![Edge {
                            label: label_out,
                            target,
                        }],
                    });
                    fresh.push(Edge {
                        label: label_in,
                        target: interposed,
                    });
                    properties.push(Some(prop_of(
                        &stretcher.prop,
                        &graph,
                        None,
                        interposed,
                    )?));
                    active.push((interposed, 0));
                }
            }
            let node = graph.node_mut(id);
            let mut index = 0u32;
            node.edges_out.retain(|_| {
                let keep = !stretched_indices.contains(&index);
                index += 1;
                keep
            });
            for edge in fresh {
                active.push((id, node.edges_out.len() as u32));
                node.edges_out.push(edge);
            }
        }
        if !stretcher.fix || changed == 0 {
            break;
        }
    }
    Ok(graph)
}

/// Evaluates the expander over the active edges, one lane per share.
fn examined<V, E, P>(
    graph: &Graph<V, E>,
    stretcher: &Stretcher<V, E, P>,
    properties: &[Option<P>],
    active: &[(NodeId, u32)],
    kill: Option<&KillSwitch>,
    lanes: usize,
) -> Result<Vec<(NodeId, u32, SmallVec<[(E, V, E); 2]>)>>
where
    V: Send + Sync,
    E: Send + Sync,
    P: Send + Sync,
{
    let hub = new_hub::<(NodeId, u32)>(lanes, false);
    let mut shares: Vec<Vec<(NodeId, u32)>> = vec![Vec::new(); lanes];
    for &(id, index) in active {
        shares[lane_of(id, lanes)].push((id, index));
    }
    for (lane, share) in shares.into_iter().enumerate() {
        hub.assign(lane, share);
    }
    let results = enlist(&hub, kill, |mut mailbox| {
        let mut found = Vec::new();
        let mut dead = false;
        while let Some(mut batch) = mailbox.recv() {
            for (id, index) in batch.drain(..) {
                if mailbox.killed() != NOT_KILLED {
                    dead = true;
                    break;
                }
                let edge = &graph.edges(id)[index as usize];
                let (Some(pu), Some(pv)) = (
                    properties[id.index()].as_ref(),
                    properties[edge.target.index()].as_ref(),
                ) else {
                    continue;
                };
                let mut stretching = Stretching::new();
                match (stretcher.expander)(pu, &edge.label, pv, &mut stretching) {
                    Ok(true) if !stretching.triples.is_empty() => {
                        found.push((id, index, stretching.triples));
                        mailbox.visit();
                    }
                    Ok(_) => {}
                    Err(fault) => {
                        mailbox.fail(fault);
                        dead = true;
                        break;
                    }
                }
            }
            mailbox.recycle(batch);
            if dead {
                mailbox.drain();
                break;
            }
        }
        found
    });
    let mut all = Vec::new();
    for found in outcome(hub, results)? {
        all.extend(found);
    }
    // Node-major order so application can group by node.
    all.sort_by_key(|(id, index, _)| (*id, *index));
    Ok(all)
}
