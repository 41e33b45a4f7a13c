//! Folds and props: the units of client computation over graph parts.
//!
//! A [fold](EdgeFold) maps each adjacent edge of a node to a value and
//! reduces the values to one; a [prop](Prop) derives a value for a vertex,
//! allowed to depend on the folded results over its incident and outgoing
//! edges. Props parameterise analysis, classification, and most
//! transformations. Reductions are required to be associative; the engine
//! chooses the reduction order.

use crate::fault::Result;

/// A map-reduce over the edges adjacent to one node.
///
/// The map sees the local vertex, the edge's label, and the vertex at the
/// far end of the edge. The optional vacuous case supplies the result for
/// a node with no adjacent edges; without one, an empty edge set folds to
/// nothing.
pub struct EdgeFold<V, E, P> {
    map: Box<dyn Fn(&V, &E, &V) -> Result<P> + Send + Sync>,
    reduce: Box<dyn Fn(P, P) -> Result<P> + Send + Sync>,
    vacuous: Option<Box<dyn Fn() -> Result<P> + Send + Sync>>,
}

impl<V, E, P> EdgeFold<V, E, P> {
    /// Creates a fold from a per-edge map and an associative reduction.
    pub fn new(
        map: impl Fn(&V, &E, &V) -> Result<P> + Send + Sync + 'static,
        reduce: impl Fn(P, P) -> Result<P> + Send + Sync + 'static,
    ) -> Self {
        EdgeFold {
            map: Box::new(map),
            reduce: Box::new(reduce),
            vacuous: None,
        }
    }

    /// Attaches a result for nodes with no adjacent edges.
    pub fn with_vacuous(mut self, vacuous: impl Fn() -> Result<P> + Send + Sync + 'static) -> Self {
        self.vacuous = Some(Box::new(vacuous));
        self
    }

    /// Applies the map to one adjacent edge.
    pub(crate) fn map_one(&self, local: &V, label: &E, remote: &V) -> Result<P> {
        (self.map)(local, label, remote)
    }

    /// Combines two mapped results.
    pub(crate) fn reduce_two(&self, left: P, right: P) -> Result<P> {
        (self.reduce)(left, right)
    }

    /// The vacuous result, when one is defined.
    pub(crate) fn vacuous_value(&self) -> Result<Option<P>> {
        self.vacuous.as_ref().map(|vacuous| vacuous()).transpose()
    }

    /// Folds over the given adjacency, yielding `None` only when the
    /// adjacency is empty and no vacuous case is defined.
    pub fn folded<'a>(
        &self,
        adjacency: impl Iterator<Item = (&'a V, &'a E, &'a V)>,
    ) -> Result<Option<P>>
    where
        V: 'a,
        E: 'a,
    {
        let mut accumulator = None;
        for (local, label, remote) in adjacency {
            let mapped = (self.map)(local, label, remote)?;
            accumulator = Some(match accumulator {
                None => mapped,
                Some(previous) => (self.reduce)(previous, mapped)?,
            });
        }
        match accumulator {
            Some(value) => Ok(Some(value)),
            None => self.vacuous.as_ref().map(|f| f()).transpose(),
        }
    }
}

/// A derived value per vertex, optionally depending on the folds over the
/// vertex's incident and outgoing edges.
///
/// The vertex map receives the folded incident and outgoing results, each
/// absent when the respective fold is undefined or folds to nothing.
pub struct Prop<V, E, P> {
    map: Box<dyn Fn(&V, Option<P>, Option<P>) -> Result<P> + Send + Sync>,
    pub(crate) incident: Option<EdgeFold<V, E, P>>,
    pub(crate) outgoing: Option<EdgeFold<V, E, P>>,
}

impl<V, E, P> Prop<V, E, P> {
    /// Creates a prop from a vertex map alone.
    pub fn new(
        map: impl Fn(&V, Option<P>, Option<P>) -> Result<P> + Send + Sync + 'static,
    ) -> Self {
        Prop {
            map: Box::new(map),
            incident: None,
            outgoing: None,
        }
    }

    /// A prop that ignores edges entirely.
    pub fn of_vertex(map: impl Fn(&V) -> Result<P> + Send + Sync + 'static) -> Self {
        Prop::new(move |vertex, _, _| map(vertex))
    }

    /// Attaches a fold over incident edges.
    pub fn with_incident(mut self, fold: EdgeFold<V, E, P>) -> Self {
        self.incident = Some(fold);
        self
    }

    /// Attaches a fold over outgoing edges.
    pub fn with_outgoing(mut self, fold: EdgeFold<V, E, P>) -> Self {
        self.outgoing = Some(fold);
        self
    }

    /// True when evaluation reads incident edges, which obliges the
    /// operation to index predecessors first.
    pub(crate) fn wants_incident(&self) -> bool {
        self.incident.is_some()
    }

    /// Applies the vertex map to pre-folded edge results.
    pub(crate) fn mapped(&self, vertex: &V, incident: Option<P>, outgoing: Option<P>) -> Result<P> {
        (self.map)(vertex, incident, outgoing)
    }
}
