//! Bypassing nodes with compositions of consecutive edges.

use std::collections::HashSet;

use ramify_communication::KillSwitch;

use crate::fault::Result;
use crate::graph::{Edge, Graph, NodeId};
use crate::kernel::Prop;
use crate::runtime::{prop_pass, reverse_index, sweep, Rev};
use crate::Lanes;

/// A specification for adding edges that bypass intermediate nodes.
///
/// A launching edge from a node and a continuing edge from its terminus
/// form a consecutive pair; for every pair the predicate accepts, a
/// bypass edge joins the launching node directly to the continuation's
/// terminus. The predicate and the label operator see the launching
/// node's local redex, both labels, and the intermediate node's adjacent
/// redex, each redex computed by its prop once before composition starts.
pub struct Composer<V, E, P> {
    /// Iterate until no round changes anything.
    pub fix: bool,
    /// Delete each launching edge that launched a composition.
    pub destructive: bool,
    /// Accepts a composable pair of consecutive edges.
    pub pred: Box<dyn Fn(&P, &E, &P, &E) -> Result<bool> + Send + Sync>,
    /// Creates the bypassing label.
    pub label: Box<dyn Fn(&P, &E, &P, &E) -> Result<E> + Send + Sync>,
    /// Computes the launching node's redex.
    pub local: Prop<V, E, P>,
    /// Computes the intermediate node's redex.
    pub adjacent: Prop<V, E, P>,
}

/// Consumes a graph and returns it with bypass edges added, and launching
/// edges deleted when the composer is destructive.
pub fn composed<V, E, P>(
    graph: Graph<V, E>,
    composer: &Composer<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Graph<V, E>>
where
    V: Send + Sync,
    E: Send + Sync + Eq,
    P: Send + Sync,
{
    let Some(base) = graph.base() else {
        return Ok(Graph::empty());
    };
    let lanes = lanes.resolve();
    let wants_rev =
        composer.local.wants_incident() || composer.adjacent.wants_incident();
    let rev: Option<Rev> = wants_rev.then(|| reverse_index(&graph, lanes));
    let (local, _) = prop_pass(&graph, &composer.local, rev.as_ref(), lanes, kill, base)?;
    let (adjacent, _) = prop_pass(&graph, &composer.adjacent, rev.as_ref(), lanes, kill, base)?;
    let mut graph = graph;
    loop {
        let local_ref = &local;
        let adjacent_ref = &adjacent;
        let graph_ref = &graph;
        let findings = sweep(
            lanes,
            kill,
            base,
            |id, post| {
                for edge in graph_ref.edges(id) {
                    post(edge.target);
                }
            },
            |_| (Vec::new(), Vec::new()),
            |_, id, found: &mut (Vec<(NodeId, Edge<E>)>, Vec<(NodeId, u32)>)| {
                let Some(launch_redex) = local_ref[id.index()].as_ref() else {
                    return Ok(());
                };
                let mut fresh: Vec<(E, NodeId)> = Vec::new();
                for (index, launching) in graph_ref.edges(id).iter().enumerate() {
                    let via = launching.target;
                    let Some(via_redex) = adjacent_ref[via.index()].as_ref() else {
                        continue;
                    };
                    let mut launched = false;
                    for continuing in graph_ref.edges(via) {
                        if !(composer.pred)(
                            launch_redex,
                            &launching.label,
                            via_redex,
                            &continuing.label,
                        )? {
                            continue;
                        }
                        launched = true;
                        let label = (composer.label)(
                            launch_redex,
                            &launching.label,
                            via_redex,
                            &continuing.label,
                        )?;
                        let bypass = (label, continuing.target);
                        let extant = graph_ref
                            .edges(id)
                            .iter()
                            .any(|e| e.label == bypass.0 && e.target == bypass.1)
                            || fresh.iter().any(|(l, t)| *l == bypass.0 && *t == bypass.1);
                        if !extant {
                            fresh.push(bypass);
                        }
                    }
                    if launched && composer.destructive {
                        found.1.push((id, index as u32));
                    }
                }
                for (label, target) in fresh {
                    found.0.push((id, Edge { label, target }));
                }
                Ok(())
            },
        )?;
        let mut additions = Vec::new();
        let mut deletions: HashSet<(NodeId, u32)> = HashSet::new();
        for ((added, deleted), _) in findings {
            additions.extend(added);
            deletions.extend(deleted);
        }
        let changed = additions.len() + deletions.len();
        for (id, edge) in additions {
            graph.node_mut(id).edges_out.push(edge);
        }
        if !deletions.is_empty() {
            for id in graph.ids().collect::<Vec<_>>() {
                let doomed: Vec<u32> = (0..graph.degree(id) as u32)
                    .filter(|&index| deletions.contains(&(id, index)))
                    .collect();
                if doomed.is_empty() {
                    continue;
                }
                let node = graph.node_mut(id);
                let mut index = 0u32;
                node.edges_out.retain(|_| {
                    let keep = !doomed.contains(&index);
                    index += 1;
                    keep
                });
            }
        }
        if !composer.fix || changed == 0 {
            break;
        }
    }
    Ok(graph)
}
