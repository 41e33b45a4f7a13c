//! Cartesian products of graphs.
//!
//! The product of graphs `g` and `h` has one node per pair of their
//! nodes, with the pair's vertex computed by the crosser's vertex
//! operator on first materialisation. A pair of edges, one from each
//! factor, yields a product edge exactly when the crosser's predicate
//! accepts their labels, connecting the pair of their sources to the pair
//! of their termini.
//!
//! Every pair is materialised whether or not the pair of bases reaches
//! it; subsequent traversals cover what the product base reaches, while
//! counting and deduplication cover everything.

use ramify_communication::{enlist, KillSwitch, NOT_KILLED};

use crate::fault::{Fault, Result};
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::runtime::{lane_of, new_hub, outcome, KILL_POLL_MASK};
use crate::Lanes;

/// A specification for combining two graphs into their product.
pub struct Crosser<V1, E1, V2, E2, V, E> {
    /// Creates a combined vertex from a pair of factor vertices.
    pub vertex: Box<dyn Fn(&V1, &V2) -> Result<V> + Send + Sync>,
    /// Decides whether a pair of factor edges combines.
    pub pred: Box<dyn Fn(&E1, &E2) -> Result<bool> + Send + Sync>,
    /// Creates the combined label for an accepted pair of edges.
    pub label: Box<dyn Fn(&E1, &E2) -> Result<E> + Send + Sync>,
    /// Kill the product if its size would exceed this; zero means
    /// unlimited.
    pub vertex_limit: usize,
}

impl<V1, E1, V2, E2, V, E> Crosser<V1, E1, V2, E2, V, E> {
    /// A crosser from its three operators, unlimited in size.
    pub fn new(
        vertex: impl Fn(&V1, &V2) -> Result<V> + Send + Sync + 'static,
        pred: impl Fn(&E1, &E2) -> Result<bool> + Send + Sync + 'static,
        label: impl Fn(&E1, &E2) -> Result<E> + Send + Sync + 'static,
    ) -> Self {
        Crosser {
            vertex: Box::new(vertex),
            pred: Box::new(pred),
            label: Box::new(label),
            vertex_limit: 0,
        }
    }

    /// Caps the product's size.
    pub fn with_vertex_limit(mut self, limit: usize) -> Self {
        self.vertex_limit = limit;
        self
    }
}

/// Forms the product of two graphs under a crosser.
///
/// The product of anything with the empty graph is empty.
pub fn crossed<V1, E1, V2, E2, V, E>(
    g: &Graph<V1, E1>,
    h: &Graph<V2, E2>,
    crosser: &Crosser<V1, E1, V2, E2, V, E>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V1: Sync,
    E1: Sync,
    V2: Sync,
    E2: Sync,
    V: Send,
    E: Send,
{
    if g.is_empty() || h.is_empty() {
        return Ok(Graph::empty());
    }
    let width = h.size();
    let total = g.size() * width;
    if crosser.vertex_limit != 0 && total > crosser.vertex_limit {
        return Err(Fault::Overflow);
    }
    let lanes = lanes.resolve();
    // Pair (i, j) occupies arena slot i * width + j; workers materialise
    // the slots they own and exchange nothing but faults.
    let hub = new_hub::<()>(lanes, false);
    let results = enlist(&hub, kill, |mut mailbox| {
        let lane = mailbox.index();
        let mut share: Vec<(u32, Node<V, E>)> = Vec::new();
        let mut alive = true;
        for slot in 0..total {
            if slot & KILL_POLL_MASK == 0 && mailbox.killed() != NOT_KILLED {
                alive = false;
                break;
            }
            let id = NodeId::new(slot);
            if lane_of(id, lanes) != lane {
                continue;
            }
            let left = NodeId::new(slot / width);
            let right = NodeId::new(slot % width);
            match materialise(g, h, crosser, width, left, right) {
                Ok(node) => share.push((slot as u32, node)),
                Err(fault) => {
                    mailbox.fail(fault);
                    alive = false;
                    break;
                }
            }
        }
        if !alive {
            share.clear();
        }
        mailbox.drain();
        share
    });
    let results = outcome(hub, results)?;
    let mut nodes: Vec<Option<Node<V, E>>> = std::iter::repeat_with(|| None).take(total).collect();
    for share in results {
        for (slot, node) in share {
            nodes[slot as usize] = Some(node);
        }
    }
    let nodes = nodes
        .into_iter()
        .map(|node| node.expect("product slot left vacant"))
        .collect();
    let base = match (g.base(), h.base()) {
        (Some(gb), Some(hb)) => Some(NodeId::new(gb.index() * width + hb.index())),
        _ => None,
    };
    Ok(Graph::from_parts(nodes, base))
}

/// Builds one product node: the combined vertex and the combined edges of
/// every accepted pair of outgoing factor edges.
fn materialise<V1, E1, V2, E2, V, E>(
    g: &Graph<V1, E1>,
    h: &Graph<V2, E2>,
    crosser: &Crosser<V1, E1, V2, E2, V, E>,
    width: usize,
    left: NodeId,
    right: NodeId,
) -> Result<Node<V, E>> {
    let vertex = (crosser.vertex)(g.vertex(left), h.vertex(right))?;
    let mut edges_out = Vec::new();
    for le in g.edges(left) {
        for re in h.edges(right) {
            if (crosser.pred)(&le.label, &re.label)? {
                edges_out.push(Edge {
                    label: (crosser.label)(&le.label, &re.label)?,
                    target: NodeId::new(le.target.index() * width + re.target.index()),
                });
            }
        }
    }
    Ok(Node { vertex, edges_out })
}
