//! Traversal extents and orders.

/// The extent of a traversal: where it starts and which way it walks.
///
/// By default a traversal starts at the graph's base and walks outgoing
/// edges. Naming an initial vertex restricts the operation to the subgraph
/// that vertex reaches; setting `backwards` walks incident edges instead,
/// restricting the operation to the subgraph reaching the start.
pub struct Zone<V> {
    /// The vertex to start from, or the base when absent.
    pub initial: Option<V>,
    /// Walk toward incident edges instead of outgoing ones.
    pub backwards: bool,
}

impl<V> Zone<V> {
    /// The whole graph, walked forward from the base.
    pub fn whole() -> Self {
        Zone {
            initial: None,
            backwards: false,
        }
    }

    /// The subgraph reachable forward from the given vertex.
    pub fn from(initial: V) -> Self {
        Zone {
            initial: Some(initial),
            backwards: false,
        }
    }

    /// Reverses the walking direction.
    pub fn backwards(mut self) -> Self {
        self.backwards = true;
        self
    }
}

impl<V> Default for Zone<V> {
    fn default() -> Self {
        Zone::whole()
    }
}

/// The order in which a constrained traversal visits nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    /// Visit each node before any node it points at, top down.
    LocalFirst,
    /// Visit each node after every node it points at, bottom up.
    RemoteFirst,
    /// Visit nodes in whatever order packets arrive.
    Unconstrained,
}

/// A subgraph together with a traversal order, as consumed by mutation.
pub struct Plan<V> {
    /// The required visiting order.
    pub order: Order,
    /// Accept nontermination on cyclic graphs instead of reporting
    /// deadlock; meaningful only for constrained orders.
    pub ignore_deadlock: bool,
    /// The subgraph to operate on.
    pub zone: Zone<V>,
}

impl<V> Plan<V> {
    /// An unconstrained plan over the whole graph.
    pub fn unordered() -> Self {
        Plan {
            order: Order::Unconstrained,
            ignore_deadlock: false,
            zone: Zone::whole(),
        }
    }

    /// A plan visiting nodes in the given order over the whole graph.
    pub fn ordered(order: Order) -> Self {
        Plan {
            order,
            ignore_deadlock: false,
            zone: Zone::whole(),
        }
    }
}
