//! Fusing equivalence classes into single nodes.

use std::collections::HashMap;
use std::hash::Hash;
use std::thread;

use ramify_communication::KillSwitch;

use crate::classify::{classed, Classifier};
use crate::fault::Result;
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::runtime::{hash_of, prop_pass, reverse_index, Rev};
use crate::Lanes;

/// The paired operations fusing the vertices and edge labels of one
/// equivalence class.
pub struct MergeKernel<V, E> {
    /// Takes one member vertex to its contribution to the fused vertex.
    pub vertex_map: Box<dyn Fn(&V) -> Result<V> + Send + Sync>,
    /// Combines two vertex contributions; must be associative.
    pub vertex_reduce: Box<dyn Fn(V, V) -> Result<V> + Send + Sync>,
    /// Takes one member label to its contribution to a fused label.
    pub label_map: Box<dyn Fn(&E) -> Result<E> + Send + Sync>,
    /// Combines two label contributions; must be associative.
    pub label_reduce: Box<dyn Fn(E, E) -> Result<E> + Send + Sync>,
}

/// A specification for transforming a graph into one of equivalence
/// classes over its vertices.
pub struct Merger<V, E, P> {
    /// Organises vertices into classes.
    pub classifier: Classifier<V, E, P>,
    /// Combines vertices and edges within a class.
    pub kernel: MergeKernel<V, E>,
    /// Optionally rejects a fused outgoing edge class, given its
    /// cardinality and fused label.
    pub pruner: Option<Box<dyn Fn(usize, &E) -> Result<bool> + Send + Sync>>,
}

/// Consumes a graph and returns one with a single node per equivalence
/// class of its reachable vertices.
///
/// The fused node's vertex is the kernel's reduction over the class
/// members; its outgoing edges are the members' edges marshalled by
/// terminus class, each bucket reduced to a single representative label
/// and optionally pruned.
pub fn merged<V, E, P>(
    graph: Graph<V, E>,
    merger: &Merger<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync,
    E: Send + Sync,
    P: Send + Sync + Hash + Eq,
{
    let Some(base) = graph.base() else {
        return Ok(Graph::empty());
    };
    let lanes = lanes.resolve();
    let rev: Option<Rev> = merger
        .classifier
        .prop
        .wants_incident()
        .then(|| reverse_index(&graph, lanes));
    let (properties, reach) = prop_pass(
        &graph,
        &merger.classifier.prop,
        rev.as_ref(),
        lanes,
        kill,
        base,
    )?;
    let property = |id: NodeId| {
        properties[id.index()]
            .as_ref()
            .expect("merged node lacks its property")
    };
    let classes = classed(
        lanes,
        kill,
        &reach,
        |id| hash_of(property(id)),
        |a, b| property(a) == property(b),
    )?;
    let mut node_class = vec![u32::MAX; graph.size()];
    for (class, ids) in classes.iter().enumerate() {
        for &id in ids {
            node_class[id.index()] = class as u32;
        }
    }
    // Fuse every class, one lane per share of the class list.
    let graph_ref = &graph;
    let classes_ref = &classes;
    let node_class_ref = &node_class;
    let fused: Vec<Result<Vec<(u32, Node<V, E>)>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..lanes)
            .map(|lane| {
                scope.spawn(move || {
                    let mut share = Vec::new();
                    for (class, ids) in classes_ref.iter().enumerate() {
                        if class % lanes != lane {
                            continue;
                        }
                        share.push((
                            class as u32,
                            fuse(graph_ref, merger, node_class_ref, ids)?,
                        ));
                    }
                    Ok(share)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    });
    let mut nodes: Vec<Option<Node<V, E>>> = std::iter::repeat_with(|| None)
        .take(classes.len())
        .collect();
    for share in fused {
        for (class, node) in share? {
            nodes[class as usize] = Some(node);
        }
    }
    let nodes = nodes
        .into_iter()
        .map(|node| node.expect("class left unfused"))
        .collect();
    let base = NodeId::new(node_class[base.index()] as usize);
    drop(graph);
    Ok(Graph::from_parts(nodes, Some(base)))
}

/// Fuses one class into its node.
fn fuse<V, E, P>(
    graph: &Graph<V, E>,
    merger: &Merger<V, E, P>,
    node_class: &[u32],
    ids: &[NodeId],
) -> Result<Node<V, E>> {
    let kernel = &merger.kernel;
    let mut vertex: Option<V> = None;
    for &id in ids {
        let mapped = (kernel.vertex_map)(graph.vertex(id))?;
        vertex = Some(match vertex.take() {
            None => mapped,
            Some(previous) => (kernel.vertex_reduce)(previous, mapped)?,
        });
    }
    let vertex = vertex.expect("empty equivalence class");
    // Marshal the members' outgoing edges by terminus class.
    let mut buckets: HashMap<u32, (usize, Option<E>)> = HashMap::new();
    let mut order: Vec<u32> = Vec::new();
    for &id in ids {
        for edge in graph.edges(id) {
            let target = node_class[edge.target.index()];
            let mapped = (kernel.label_map)(&edge.label)?;
            let bucket = buckets.entry(target).or_insert_with(|| {
                order.push(target);
                (0, None)
            });
            bucket.0 += 1;
            bucket.1 = Some(match bucket.1.take() {
                None => mapped,
                Some(previous) => (kernel.label_reduce)(previous, mapped)?,
            });
        }
    }
    let mut edges_out = Vec::with_capacity(order.len());
    for target in order {
        let (count, label) = buckets.remove(&target).expect("marshalled bucket");
        let label = label.expect("empty edge bucket");
        if let Some(pruner) = &merger.pruner {
            if !pruner(count, &label)? {
                continue;
            }
        }
        edges_out.push(Edge {
            label,
            target: NodeId::new(target as usize),
        });
    }
    Ok(Node { vertex, edges_out })
}
