//! Building graphs from connectors.
//!
//! A [`Builder`] carries the client's connector and the graph's vertex
//! limit. Workers receive packets carrying candidate vertices, consult a
//! collision table to decide whether the vertex is already present in
//! their share of the graph, and either connect the sender to the extant
//! node or create a new node, invoke the connector on it, and scatter
//! packets for the vertices at the ends of its freshly emitted edges.
//! Edge termini resolve through patch packets sent back to the lane
//! owning the originating edge.
//!
//! Connectors emit edges through the [`Growth`] handle they are called
//! with; emission is therefore possible exactly when a vertex is being
//! expanded, and nowhere else.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use smallvec::SmallVec;

use ramify_communication::{enlist, KillSwitch, NOT_KILLED};

use crate::fault::{Fault, Result};
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::runtime::{hash_of, lane_of_hash, new_hub, outcome, per_lane_limit, KILL_POLL_MASK};
use crate::Lanes;

/// The emission handle a connector asserts outgoing edges through.
pub struct Growth<V, E> {
    emitted: SmallVec<[(E, V); 4]>,
}

impl<V, E> Growth<V, E> {
    fn new() -> Self {
        Growth {
            emitted: SmallVec::new(),
        }
    }

    /// Asserts an outgoing edge with the given label from the vertex
    /// currently being expanded to the given terminus.
    pub fn connect(&mut self, label: E, terminus: V) {
        self.emitted.push((label, terminus));
    }
}

/// The client callback naming the outgoing edges of a vertex.
pub enum Connector<V, E> {
    /// Called once per vertex, emitting every outgoing edge.
    Direct(Box<dyn Fn(&V, &mut Growth<V, E>) -> Result<()> + Send + Sync>),
    /// Called once per distinct incident edge label reaching a vertex,
    /// with `None` for the seed, emitting the subset of outgoing edges
    /// that label warrants.
    Labelled(Box<dyn Fn(Option<&E>, &V, &mut Growth<V, E>) -> Result<()> + Send + Sync>),
}

/// A specification telling the engine how to build a graph.
pub struct Builder<V, E> {
    /// The connector to expand each vertex with.
    pub connector: Connector<V, E>,
    /// Kill the build if the number of vertices exceeds this; zero means
    /// unlimited. The limit divides equally among lanes.
    pub vertex_limit: usize,
}

impl<V, E> Builder<V, E> {
    /// A builder around an unconditional connector.
    pub fn connecting(
        connector: impl Fn(&V, &mut Growth<V, E>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Builder {
            connector: Connector::Direct(Box::new(connector)),
            vertex_limit: 0,
        }
    }

    /// A builder around a label-driven connector.
    pub fn labelled(
        connector: impl Fn(Option<&E>, &V, &mut Growth<V, E>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Builder {
            connector: Connector::Labelled(Box::new(connector)),
            vertex_limit: 0,
        }
    }

    /// Caps the total number of vertices.
    pub fn with_vertex_limit(mut self, limit: usize) -> Self {
        self.vertex_limit = limit;
        self
    }
}

/// A node under construction, addressed by its lane and slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    lane: u32,
    node: u32,
}

/// The return address of an edge awaiting its terminus.
#[derive(Clone, Copy, Debug)]
struct Carrier {
    lane: u32,
    node: u32,
    edge: u32,
}

/// Packets exchanged while building.
enum Sprout<V, E> {
    /// The vertex the whole graph grows from.
    Seed(V),
    /// A candidate vertex reached along an edge.
    Grow {
        vertex: V,
        /// The carrier's label, travelling only for labelled connectors.
        label: Option<E>,
        from: Carrier,
    },
    /// The resolution of an edge's terminus, addressed to its owner.
    Patch { at: Carrier, target: Slot },
}

/// An edge whose terminus may still be unresolved.
struct GrowEdge<E> {
    label: E,
    target: Option<Slot>,
}

/// A node in a lane's share of the graph under construction.
struct GrowNode<V, E> {
    vertex: V,
    edges: Vec<GrowEdge<E>>,
    /// Incident labels already acted on, for labelled connectors.
    seen: HashSet<E>,
}

/// One lane's working state and output queue.
struct Sprouting<V, E> {
    nodes: Vec<GrowNode<V, E>>,
    /// Collision table: vertex hash to the local slots bearing it.
    table: HashMap<u64, SmallVec<[u32; 2]>>,
    /// The slot holding the seed, on the lane that received it.
    base: Option<u32>,
    made: usize,
}

impl<V: Hash + Eq, E: Hash + Eq + Clone> Sprouting<V, E> {
    fn new() -> Self {
        Sprouting {
            nodes: Vec::new(),
            table: HashMap::new(),
            base: None,
            made: 0,
        }
    }

    /// Walks the collision chain for a vertex.
    fn extant(&self, hash: u64, vertex: &V) -> Option<u32> {
        self.table
            .get(&hash)?
            .iter()
            .copied()
            .find(|&slot| self.nodes[slot as usize].vertex == *vertex)
    }
}

/// Deduplicates freshly emitted edges by label and terminus, grouping by
/// label hash and comparing within each bucket.
fn unique<V: Hash + Eq, E: Hash + Eq>(emitted: SmallVec<[(E, V); 4]>) -> SmallVec<[(E, V); 4]> {
    if emitted.len() < 2 {
        return emitted;
    }
    let mut buckets: HashMap<u64, SmallVec<[usize; 2]>> = HashMap::new();
    let mut keep = vec![true; emitted.len()];
    for (index, (label, terminus)) in emitted.iter().enumerate() {
        let bucket = buckets.entry(hash_of(label)).or_default();
        if bucket
            .iter()
            .any(|&other| emitted[other].0 == *label && emitted[other].1 == *terminus)
        {
            keep[index] = false;
        } else {
            bucket.push(index);
        }
    }
    emitted
        .into_iter()
        .zip(keep)
        .filter_map(|(pair, kept)| kept.then_some(pair))
        .collect()
}

/// Builds the graph specified by the builder from the seed vertex,
/// exploring in parallel across the given number of lanes.
///
/// The graph of everything reachable from the seed is returned; equal
/// vertices are created once no matter how many edges reach them. The
/// build is cancellable through the kill switch and killed by exceeding
/// the vertex limit.
pub fn built<V, E>(
    builder: Builder<V, E>,
    seed: V,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Hash + Eq,
    E: Send + Hash + Eq + Clone,
{
    let lanes = lanes.resolve();
    let limit = per_lane_limit(builder.vertex_limit, lanes);
    let hub = new_hub::<Sprout<V, E>>(lanes, false);
    let seed_lane = lane_of_hash(hash_of(&seed), lanes);
    hub.assign(seed_lane, vec![Sprout::Seed(seed)]);
    let builder = &builder;
    let results = enlist(&hub, kill, |mut mailbox| {
        let lane = mailbox.index();
        let lanes = mailbox.lanes();
        let mut state: Sprouting<V, E> = Sprouting::new();
        let mut polls = 0usize;
        let mut dead = false;
        while let Some(mut batch) = mailbox.recv() {
            for packet in batch.drain(..) {
                polls += 1;
                if polls & KILL_POLL_MASK == 0 && mailbox.killed() != NOT_KILLED {
                    dead = true;
                    break;
                }
                let handled = match packet {
                    Sprout::Seed(vertex) => {
                        grow(&mut state, builder, limit, lane, lanes, vertex, None)
                            .map(|(posts, slot)| {
                                state.base = Some(slot);
                                (posts, None)
                            })
                    }
                    Sprout::Grow {
                        vertex,
                        label,
                        from,
                    } => match state.extant(hash_of(&vertex), &vertex) {
                        Some(slot) => {
                            drop(vertex);
                            revisit(&mut state, builder, lane, lanes, slot, label)
                                .map(|posts| (posts, Some((from, slot))))
                        }
                        None => grow(&mut state, builder, limit, lane, lanes, vertex, label)
                            .map(|(posts, slot)| (posts, Some((from, slot)))),
                    },
                    Sprout::Patch { at, target } => {
                        state.nodes[at.node as usize].edges[at.edge as usize].target =
                            Some(target);
                        continue;
                    }
                };
                match handled {
                    Ok((posts, patch)) => {
                        if let Some((from, slot)) = patch {
                            mailbox.post(
                                from.lane as usize,
                                Sprout::Patch {
                                    at: from,
                                    target: Slot {
                                        lane: lane as u32,
                                        node: slot,
                                    },
                                },
                            );
                        }
                        for (dest, sprout) in posts {
                            mailbox.post(dest, sprout);
                        }
                        mailbox.visit();
                    }
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
        // Labelled connectors can reach a node repeatedly by different
        // labels; settle each node's edges once all termini are patched.
        if !dead && mailbox.killed() == NOT_KILLED {
            if let Connector::Labelled(_) = builder.connector {
                for node in &mut state.nodes {
                    settle(&mut node.edges);
                }
            }
        }
        state
    });
    let results = outcome(hub, results)?;
    Ok(assemble(results))
}

/// Wrapper around the result of expanding a vertex: packets to post,
/// keyed by destination lane.
type Posts<V, E> = Vec<(usize, Sprout<V, E>)>;

/// Creates a node for a vertex not previously present, expands it with
/// the connector, and prepares packets for its adjacent vertices.
/// Returns the packets alongside the new node's slot.
fn grow<V, E>(
    state: &mut Sprouting<V, E>,
    builder: &Builder<V, E>,
    limit: Option<usize>,
    lane: usize,
    lanes: usize,
    vertex: V,
    label: Option<E>,
) -> Result<(Posts<V, E>, u32)>
where
    V: Hash + Eq,
    E: Hash + Eq + Clone,
{
    if let Some(limit) = limit {
        if state.made >= limit {
            return Err(Fault::Overflow);
        }
    }
    let mut growth = Growth::new();
    let labelled = match &builder.connector {
        Connector::Direct(connect) => {
            connect(&vertex, &mut growth)?;
            false
        }
        Connector::Labelled(connect) => {
            connect(label.as_ref(), &vertex, &mut growth)?;
            true
        }
    };
    let emitted = unique(growth.emitted);
    let slot = state.nodes.len() as u32;
    let mut seen = HashSet::new();
    if let Some(label) = label {
        seen.insert(label);
    }
    let hash = hash_of(&vertex);
    state.nodes.push(GrowNode {
        vertex,
        edges: Vec::with_capacity(emitted.len()),
        seen,
    });
    state.table.entry(hash).or_default().push(slot);
    state.made += 1;
    let mut posts = Vec::with_capacity(emitted.len());
    for (label, terminus) in emitted {
        let node = &mut state.nodes[slot as usize];
        let edge = node.edges.len() as u32;
        let dest = lane_of_hash(hash_of(&terminus), lanes);
        let travelling = labelled.then(|| label.clone());
        node.edges.push(GrowEdge {
            label,
            target: None,
        });
        posts.push((
            dest,
            Sprout::Grow {
                vertex: terminus,
                label: travelling,
                from: Carrier {
                    lane: lane as u32,
                    node: slot,
                    edge,
                },
            },
        ));
    }
    Ok((posts, slot))
}

/// Handles a packet whose vertex collided with an extant node. For
/// labelled connectors whose carrier label is new to the node, expands
/// the node further and prepares packets for the additional edges.
fn revisit<V, E>(
    state: &mut Sprouting<V, E>,
    builder: &Builder<V, E>,
    lane: usize,
    lanes: usize,
    slot: u32,
    label: Option<E>,
) -> Result<Posts<V, E>>
where
    V: Hash + Eq,
    E: Hash + Eq + Clone,
{
    let connect = match (&builder.connector, label) {
        (Connector::Labelled(connect), Some(label)) => {
            if state.nodes[slot as usize].seen.contains(&label) {
                return Ok(Vec::new());
            }
            state.nodes[slot as usize].seen.insert(label.clone());
            Some((connect, label))
        }
        _ => None,
    };
    let Some((connect, label)) = connect else {
        return Ok(Vec::new());
    };
    let mut growth = Growth::new();
    connect(Some(&label), &state.nodes[slot as usize].vertex, &mut growth)?;
    let emitted = unique(growth.emitted);
    let mut posts = Vec::with_capacity(emitted.len());
    for (label, terminus) in emitted {
        let node = &mut state.nodes[slot as usize];
        let edge = node.edges.len() as u32;
        let dest = lane_of_hash(hash_of(&terminus), lanes);
        let travelling = Some(label.clone());
        node.edges.push(GrowEdge {
            label,
            target: None,
        });
        posts.push((
            dest,
            Sprout::Grow {
                vertex: terminus,
                label: travelling,
                from: Carrier {
                    lane: lane as u32,
                    node: slot,
                    edge,
                },
            },
        ));
    }
    Ok(posts)
}

/// Drops edges sharing both label and resolved terminus with an earlier
/// edge of the same node.
fn settle<E: Hash + Eq>(edges: &mut Vec<GrowEdge<E>>) {
    let mut index = 0;
    while index < edges.len() {
        let duplicate = edges[..index].iter().any(|earlier| {
            earlier.label == edges[index].label && earlier.target == edges[index].target
        });
        if duplicate {
            edges.swap_remove(index);
        } else {
            index += 1;
        }
    }
}

/// Concatenates the lanes' shares into one arena, resolving slots to
/// node identities and locating the base.
fn assemble<V, E>(lanes: Vec<Sprouting<V, E>>) -> Graph<V, E> {
    let mut offsets = Vec::with_capacity(lanes.len());
    let mut total = 0usize;
    for share in &lanes {
        offsets.push(total as u32);
        total += share.nodes.len();
    }
    let resolve =
        |slot: Slot| NodeId::new((offsets[slot.lane as usize] + slot.node) as usize);
    let mut base = None;
    let mut nodes = Vec::with_capacity(total);
    for (lane, share) in lanes.into_iter().enumerate() {
        if let Some(slot) = share.base {
            base = Some(resolve(Slot {
                lane: lane as u32,
                node: slot,
            }));
        }
        for grown in share.nodes {
            let edges_out = grown
                .edges
                .into_iter()
                .map(|edge| Edge {
                    label: edge.label,
                    target: resolve(edge.target.expect("unresolved edge terminus")),
                })
                .collect();
            nodes.push(Node {
                vertex: grown.vertex,
                edges_out,
            });
        }
    }
    Graph::from_parts(nodes, base)
}
