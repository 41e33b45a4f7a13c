//! Deleting selected vertices and edges.

use std::collections::HashSet;

use ramify_communication::KillSwitch;

use crate::fault::Result;
use crate::graph::{Graph, Node, NodeId};
use crate::runtime::{reverse_index, sweep, Rev};
use crate::zones::Zone;
use crate::Lanes;

/// Selects a single surviving representative from each equivalence class
/// of a node's outgoing edges.
pub struct Thinner<E> {
    /// Whether two labels belong to the same class.
    pub related: Box<dyn Fn(&E, &E) -> Result<bool> + Send + Sync>,
    /// Whether the left label is preferable to the right; the minimum of
    /// each class survives.
    pub prefer: Box<dyn Fn(&E, &E) -> Result<bool> + Send + Sync>,
}

/// A specification for transforming a graph by deleting vertices and
/// edges.
///
/// A vertex failing the membership test is deleted together with every
/// edge touching it. An edge failing the edge test is disconnected. The
/// optional thinner then reduces each class of a node's surviving edges
/// to its preferred representative. A final prune keeps only what the
/// zone's start can still reach.
pub struct Filter<V, E> {
    /// Where to filter.
    pub zone: Zone<V>,
    /// The membership test deciding which vertices survive.
    pub vertex: Box<dyn Fn(&V) -> Result<bool> + Send + Sync>,
    /// The per-edge test: local vertex, label, remote vertex.
    pub edge: Option<Box<dyn Fn(&V, &E, &V) -> Result<bool> + Send + Sync>>,
    /// Optionally thins surviving edges to class representatives.
    pub thinner: Option<Thinner<E>>,
}

impl<V, E> Filter<V, E> {
    /// A filter retaining the vertices passing the given test.
    pub fn keeping(vertex: impl Fn(&V) -> Result<bool> + Send + Sync + 'static) -> Self {
        Filter {
            zone: Zone::whole(),
            vertex: Box::new(vertex),
            edge: None,
            thinner: None,
        }
    }

    /// Attaches a per-edge test.
    pub fn with_edge_test(
        mut self,
        edge: impl Fn(&V, &E, &V) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.edge = Some(Box::new(edge));
        self
    }

    /// Attaches a thinner.
    pub fn with_thinner(mut self, thinner: Thinner<E>) -> Self {
        self.thinner = Some(thinner);
        self
    }

    /// Restricts filtering to a zone.
    pub fn in_zone(mut self, zone: Zone<V>) -> Self {
        self.zone = zone;
        self
    }
}

/// Consumes a graph and returns it with failing vertices and edges
/// removed and everything the start can no longer reach pruned away.
///
/// The result's base is the zone's start; deleting the start empties the
/// graph.
pub fn filtered<V, E>(
    graph: Graph<V, E>,
    filter: &Filter<V, E>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync + Eq,
    E: Send + Sync,
{
    let lanes_count = lanes.resolve();
    let Some(start) = graph.start_of(filter.zone.initial.as_ref())? else {
        return Ok(Graph::empty());
    };
    let backwards = filter.zone.backwards;
    let rev: Option<Rev> = backwards.then(|| reverse_index(&graph, lanes_count));
    let walk = |id: NodeId, post: &mut dyn FnMut(NodeId)| {
        if let Some(rev) = &rev {
            for &(source, _) in &rev[id.index()] {
                post(source);
            }
        } else {
            for edge in graph.edges(id) {
                post(edge.target);
            }
        }
    };
    // First pass: the membership test over everything the zone reaches.
    let mut deleted = vec![false; graph.size()];
    let doomed = sweep(
        lanes_count,
        kill,
        start,
        &walk,
        |_| Vec::new(),
        |_, id, dead: &mut Vec<NodeId>| {
            if !(filter.vertex)(graph.vertex(id))? {
                dead.push(id);
            }
            Ok(())
        },
    )?;
    for (dead, _) in doomed {
        for id in dead {
            deleted[id.index()] = true;
        }
    }
    if deleted[start.index()] {
        return Ok(Graph::empty());
    }
    // Second pass: the edge test and the thinner, for surviving nodes.
    let deleted_ref = &deleted;
    let kept_lists = sweep(
        lanes_count,
        kill,
        start,
        &walk,
        |_| Vec::new(),
        |_, id, kept: &mut Vec<(NodeId, Vec<u32>)>| {
            if deleted_ref[id.index()] {
                return Ok(());
            }
            let local = graph.vertex(id);
            let mut surviving: Vec<u32> = Vec::new();
            for (index, edge) in graph.edges(id).iter().enumerate() {
                if deleted_ref[edge.target.index()] {
                    continue;
                }
                let passes = match &filter.edge {
                    Some(test) => test(local, &edge.label, graph.vertex(edge.target))?,
                    None => true,
                };
                if passes {
                    surviving.push(index as u32);
                }
            }
            if let Some(thinner) = &filter.thinner {
                surviving = thinned(&graph, id, surviving, thinner)?;
            }
            kept.push((id, surviving));
            Ok(())
        },
    )?;
    let mut kept: Vec<Option<Vec<u32>>> = std::iter::repeat_with(|| None)
        .take(graph.size())
        .collect();
    for (list, _) in kept_lists {
        for (id, surviving) in list {
            kept[id.index()] = Some(surviving);
        }
    }
    // Prune: what the start still reaches through the kept edges.
    let kept_ref = &kept;
    let survivors: HashSet<NodeId> = if backwards {
        let mut kept_rev: Vec<Vec<NodeId>> = vec![Vec::new(); graph.size()];
        for id in graph.ids() {
            if let Some(list) = &kept[id.index()] {
                for &index in list {
                    kept_rev[graph.edges(id)[index as usize].target.index()].push(id);
                }
            }
        }
        let kept_rev = &kept_rev;
        sweep(
            lanes_count,
            kill,
            start,
            |id, post| {
                for &source in &kept_rev[id.index()] {
                    post(source);
                }
            },
            |_| (),
            |_, _, _| Ok(()),
        )?
        .into_iter()
        .flat_map(|((), seen)| seen)
        .collect()
    } else {
        sweep(
            lanes_count,
            kill,
            start,
            |id, post| {
                if let Some(list) = &kept_ref[id.index()] {
                    for &index in list {
                        post(graph.edges(id)[index as usize].target);
                    }
                }
            },
            |_| (),
            |_, _, _| Ok(()),
        )?
        .into_iter()
        .flat_map(|((), seen)| seen)
        .collect()
    };
    Ok(rebuilt(graph, start, &survivors, &kept))
}

/// Thins a node's surviving edges to one representative per class.
fn thinned<V, E>(
    graph: &Graph<V, E>,
    id: NodeId,
    surviving: Vec<u32>,
    thinner: &Thinner<E>,
) -> Result<Vec<u32>> {
    let edges = graph.edges(id);
    let mut representatives: Vec<u32> = Vec::new();
    for candidate in surviving {
        let label = &edges[candidate as usize].label;
        let mut placed = false;
        for slot in representatives.iter_mut() {
            let incumbent = &edges[*slot as usize].label;
            if (thinner.related)(label, incumbent)? {
                if (thinner.prefer)(label, incumbent)? {
                    *slot = candidate;
                }
                placed = true;
                break;
            }
        }
        if !placed {
            representatives.push(candidate);
        }
    }
    Ok(representatives)
}

/// Rebuilds the arena from the surviving nodes and kept edges.
fn rebuilt<V, E>(
    graph: Graph<V, E>,
    start: NodeId,
    survivors: &HashSet<NodeId>,
    kept: &[Option<Vec<u32>>],
) -> Graph<V, E> {
    let size = graph.size();
    let (old_nodes, _) = graph.into_parts();
    let mut relocation = vec![u32::MAX; size];
    let mut order: Vec<usize> = (0..size).filter(|i| survivors.contains(&NodeId::new(*i))).collect();
    order.sort_unstable();
    for (new, &old) in order.iter().enumerate() {
        relocation[old] = new as u32;
    }
    let mut old_nodes: Vec<Option<Node<V, E>>> = old_nodes.into_iter().map(Some).collect();
    let mut nodes = Vec::with_capacity(order.len());
    for &old in &order {
        let node = old_nodes[old].take().expect("survivor taken twice");
        let list = kept[old].as_deref().unwrap_or(&[]);
        let mut edges_out = Vec::with_capacity(list.len());
        for (index, edge) in node.edges_out.into_iter().enumerate() {
            if !list.contains(&(index as u32)) {
                continue;
            }
            if relocation[edge.target.index()] == u32::MAX {
                continue;
            }
            edges_out.push(crate::Edge {
                label: edge.label,
                target: NodeId::new(relocation[edge.target.index()] as usize),
            });
        }
        nodes.push(Node {
            vertex: node.vertex,
            edges_out,
        });
    }
    let base = NodeId::new(relocation[start.index()] as usize);
    Graph::from_parts(nodes, Some(base))
}
