//! Order-insensitive folds over a graph's vertices.

use itertools::Itertools;

use ramify_communication::KillSwitch;

use crate::fault::{Fault, Result};
use crate::graph::Graph;
use crate::kernel::Prop;
use crate::runtime::{prop_of, reverse_index, sweep, Rev};
use crate::zones::Zone;
use crate::Lanes;

/// A specification for computing something about a graph when the
/// traversal order doesn't matter.
///
/// Each reachable vertex maps through the prop; the reduction, which
/// must be associative since the engine chooses the order, combines the
/// per-vertex values. The vacuous case supplies the result for an empty
/// zone; without one, an empty zone is a fault.
pub struct Mapreducer<V, E, P> {
    /// The subgraph to walk.
    pub zone: Zone<V>,
    /// The work to do at each vertex.
    pub prop: Prop<V, E, P>,
    /// Combines two per-vertex results.
    pub reduce: Box<dyn Fn(P, P) -> Result<P> + Send + Sync>,
    /// The result of walking nothing.
    pub vacuous: Option<Box<dyn Fn() -> Result<P> + Send + Sync>>,
}

impl<V, E, P> Mapreducer<V, E, P> {
    /// A mapreducer over the whole graph.
    pub fn new(
        prop: Prop<V, E, P>,
        reduce: impl Fn(P, P) -> Result<P> + Send + Sync + 'static,
    ) -> Self {
        Mapreducer {
            zone: Zone::whole(),
            prop,
            reduce: Box::new(reduce),
            vacuous: None,
        }
    }

    /// Restricts the walk to a zone.
    pub fn in_zone(mut self, zone: Zone<V>) -> Self {
        self.zone = zone;
        self
    }

    /// Attaches a result for an empty zone.
    pub fn with_vacuous(mut self, vacuous: impl Fn() -> Result<P> + Send + Sync + 'static) -> Self {
        self.vacuous = Some(Box::new(vacuous));
        self
    }
}

/// Computes the reduction of the prop over every vertex the zone reaches.
pub fn mapreduced<V, E, P>(
    graph: &Graph<V, E>,
    mapreducer: &Mapreducer<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<P>
where
    V: Sync + Eq,
    E: Sync,
    P: Send,
{
    let lanes = lanes.resolve();
    let start = graph.start_of(mapreducer.zone.initial.as_ref())?;
    let Some(start) = start else {
        return vacuous_result(mapreducer);
    };
    let rev: Option<Rev> = (mapreducer.prop.wants_incident() || mapreducer.zone.backwards)
        .then(|| reverse_index(graph, lanes));
    let backwards = mapreducer.zone.backwards;
    let results = sweep(
        lanes,
        kill,
        start,
        |id, post| {
            if backwards {
                for &(source, _) in &rev.as_ref().expect("reverse index missing")[id.index()] {
                    post(source);
                }
            } else {
                for edge in graph.edges(id) {
                    post(edge.target);
                }
            }
        },
        |_| None,
        |_, id, running: &mut Option<P>| {
            let mapped = prop_of(&mapreducer.prop, graph, rev.as_ref(), id)?;
            *running = Some(match running.take() {
                None => mapped,
                Some(previous) => (mapreducer.reduce)(previous, mapped)?,
            });
            Ok(())
        },
    )?;
    // Combine the per-lane results pairwise, in a binary tree.
    let mut values: Vec<P> = results.into_iter().filter_map(|(v, _)| v).collect();
    if values.is_empty() {
        return vacuous_result(mapreducer);
    }
    while values.len() > 1 {
        let mut next = Vec::with_capacity(values.len().div_ceil(2));
        for pair in &values.into_iter().chunks(2) {
            let mut pair = pair;
            let left = pair.next().expect("empty reduction chunk");
            match pair.next() {
                Some(right) => next.push((mapreducer.reduce)(left, right)?),
                None => next.push(left),
            }
        }
        values = next;
    }
    Ok(values.pop().expect("reduced to nothing"))
}

/// The result of walking an empty zone.
fn vacuous_result<V, E, P>(mapreducer: &Mapreducer<V, E, P>) -> Result<P> {
    match &mapreducer.vacuous {
        Some(vacuous) => vacuous(),
        None => Err(Fault::EmptyGraph),
    }
}
