//! Order-sensitive folds: backward and forward induction.
//!
//! Induction visits each node only once everything it depends on has been
//! visited: walking forward, a node's accumulator folds over the
//! accumulators of the nodes its outgoing edges reach, so values flow
//! from the leaves back to the start; walking backwards the roles of the
//! edge directions swap. Nodes whose prerequisites are still pending park
//! in the deferred queues until the pool readies them; cyclic
//! dependencies are reported as deadlock.

use std::collections::HashSet;
use std::sync::OnceLock;

use ramify_communication::KillSwitch;

use crate::fault::{Fault, Result};
use crate::graph::Graph;
use crate::runtime::{lane_of, ordered_traverse, reverse_index, sweep, Rev};
use crate::zones::Zone;
use crate::Lanes;

/// A specification for computing something about a graph when the
/// traversal order matters.
pub struct Inducer<V, E, A> {
    /// The subgraph to walk and the direction to walk it.
    pub zone: Zone<V>,
    /// The result for a node with no prerequisites.
    pub boundary: Option<Box<dyn Fn(&V) -> Result<A> + Send + Sync>>,
    /// Maps one prerequisite: the local vertex, the connecting label, and
    /// the prerequisite's accumulator.
    pub map: Box<dyn Fn(&V, &E, &A) -> Result<A> + Send + Sync>,
    /// Combines two mapped prerequisites; must be associative.
    pub reduce: Box<dyn Fn(A, A) -> Result<A> + Send + Sync>,
    /// The result of walking an empty zone.
    pub vacuous: Option<Box<dyn Fn() -> Result<A> + Send + Sync>>,
}

impl<V, E, A> Inducer<V, E, A> {
    /// An inducer walking the whole graph forward.
    pub fn new(
        map: impl Fn(&V, &E, &A) -> Result<A> + Send + Sync + 'static,
        reduce: impl Fn(A, A) -> Result<A> + Send + Sync + 'static,
    ) -> Self {
        Inducer {
            zone: Zone::whole(),
            boundary: None,
            map: Box::new(map),
            reduce: Box::new(reduce),
            vacuous: None,
        }
    }

    /// Attaches the boundary operator for prerequisite-free nodes.
    pub fn with_boundary(mut self, boundary: impl Fn(&V) -> Result<A> + Send + Sync + 'static) -> Self {
        self.boundary = Some(Box::new(boundary));
        self
    }

    /// Restricts the walk to a zone.
    pub fn in_zone(mut self, zone: Zone<V>) -> Self {
        self.zone = zone;
        self
    }

    /// Attaches a result for an empty zone.
    pub fn with_vacuous(mut self, vacuous: impl Fn() -> Result<A> + Send + Sync + 'static) -> Self {
        self.vacuous = Some(Box::new(vacuous));
        self
    }
}

/// Computes the start node's accumulator by induction over the zone.
pub fn induced<V, E, A>(
    graph: &Graph<V, E>,
    inducer: &Inducer<V, E, A>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<A>
where
    V: Sync + Eq,
    E: Sync,
    A: Send + Sync,
{
    let lanes = lanes.resolve();
    let start = graph.start_of(inducer.zone.initial.as_ref())?;
    let Some(start) = start else {
        return match &inducer.vacuous {
            Some(vacuous) => vacuous(),
            None => Err(Fault::EmptyGraph),
        };
    };
    let backwards = inducer.zone.backwards;
    let rev: Rev = reverse_index(graph, lanes);
    let scatter = |id: crate::NodeId, post: &mut dyn FnMut(crate::NodeId)| {
        if backwards {
            for &(source, _) in &rev[id.index()] {
                post(source);
            }
        } else {
            for edge in graph.edges(id) {
                post(edge.target);
            }
        }
    };
    // First pass: the zone's reachable sets, one per owning lane.
    let reach: Vec<HashSet<crate::NodeId>> = sweep(
        lanes,
        kill,
        start,
        &scatter,
        |_| (),
        |_, _, _| Ok(()),
    )?
    .into_iter()
    .map(|((), seen)| seen)
    .collect();
    // Second pass: constrained-order accumulation.
    let cells: Vec<OnceLock<A>> = (0..graph.size()).map(|_| OnceLock::new()).collect();
    let accumulators = &cells;
    let reach_ref = &reach;
    ordered_traverse(
        lanes,
        kill,
        true,
        start,
        &scatter,
        &scatter,
        reach_ref,
        |id| {
            let vertex = graph.vertex(id);
            let mut running: Option<A> = None;
            let mut fold = |label: &E, prerequisite: crate::NodeId| -> Result<()> {
                if !reach_ref[lane_of(prerequisite, lanes)].contains(&prerequisite) {
                    return Ok(());
                }
                let accumulator = accumulators[prerequisite.index()]
                    .get()
                    .expect("prerequisite accumulator missing");
                let mapped = (inducer.map)(vertex, label, accumulator)?;
                running = Some(match running.take() {
                    None => mapped,
                    Some(previous) => (inducer.reduce)(previous, mapped)?,
                });
                Ok(())
            };
            if backwards {
                for &(source, index) in &rev[id.index()] {
                    let label = &graph.edges(source)[index as usize].label;
                    fold(label, source)?;
                }
            } else {
                for edge in graph.edges(id) {
                    fold(&edge.label, edge.target)?;
                }
            }
            let value = match running {
                Some(value) => value,
                None => match (&inducer.boundary, &inducer.vacuous) {
                    (Some(boundary), _) => boundary(vertex)?,
                    (None, Some(vacuous)) => vacuous()?,
                    (None, None) => return Err(Fault::MissingBoundary),
                },
            };
            let _ = accumulators[id.index()].set(value);
            Ok(())
        },
    )?;
    // The remaining accumulators drop with the side table.
    cells
        .into_iter()
        .nth(start.index())
        .and_then(OnceLock::into_inner)
        .ok_or(Fault::MissingBoundary)
}
