//! Equivalence-class partitions over a graph's vertices.
//!
//! A classifier derives a property per vertex; vertices sharing a
//! property share a class. Classes are built cooperatively (nodes are
//! binned across lanes by property hash, then chained by property
//! equality) and afterwards united on demand through a union-find
//! compressed lazily under a read-write lock.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::RwLock;

use ramify_communication::KillSwitch;

use crate::fault::{Fault, Result};
use crate::graph::Graph;
use crate::kernel::Prop;
use crate::runtime::{clustered, hash_of, prop_pass, reverse_index, Rev};
use crate::Lanes;

/// A specification for defining equivalence classes over a graph's
/// vertices: the property all members of a class have in common.
pub struct Classifier<V, E, P> {
    /// Extracts the shared property from a vertex.
    pub prop: Prop<V, E, P>,
}

impl<V, E, P> Classifier<V, E, P> {
    /// A classifier around a property prop.
    pub fn new(prop: Prop<V, E, P>) -> Self {
        Classifier { prop }
    }
}

/// A handle on one equivalence class of a partition.
///
/// Handles compare equal exactly when they name the same class root.
/// Uniting classes changes roots: handles obtained before a call to
/// [`united`] should be refreshed through [`class_of`] before being
/// compared again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Class(u32);

/// The union-find backing a partition.
#[derive(Debug)]
struct Dsu {
    parent: Vec<u32>,
    size: Vec<usize>,
}

impl Dsu {
    /// The root of a slot, without compression.
    fn root(&self, mut slot: u32) -> u32 {
        while self.parent[slot as usize] != slot {
            slot = self.parent[slot as usize];
        }
        slot
    }

    /// The root of a slot, compressing the walked chain.
    fn root_compressing(&mut self, slot: u32) -> u32 {
        let root = self.root(slot);
        let mut walk = slot;
        while self.parent[walk as usize] != root {
            walk = std::mem::replace(&mut self.parent[walk as usize], root);
        }
        root
    }
}

/// A generally non-injective mapping from vertices to classes.
#[derive(Debug)]
pub struct Partition<V> {
    index: HashMap<V, u32>,
    dsu: RwLock<Dsu>,
}

impl<V: Hash + Eq> Partition<V> {
    /// The class containing the given vertex.
    pub fn class_of(&self, vertex: &V) -> Result<Class> {
        let slot = *self.index.get(vertex).ok_or(Fault::UnrelatedVertex)?;
        let dsu = self.dsu.read().expect("partition poisoned");
        Ok(Class(dsu.root(slot)))
    }

    /// Unites two classes, returning whether anything changed.
    pub fn united(&self, x: Class, y: Class) -> Result<bool> {
        let mut dsu = self.dsu.write().expect("partition poisoned");
        let rx = dsu.root_compressing(x.0);
        let ry = dsu.root_compressing(y.0);
        if rx == ry {
            return Ok(false);
        }
        // Attach the lighter root under the heavier.
        let (light, heavy) = if dsu.size[rx as usize] < dsu.size[ry as usize] {
            (rx, ry)
        } else {
            (ry, rx)
        };
        dsu.parent[light as usize] = heavy;
        dsu.size[heavy as usize] += dsu.size[light as usize];
        Ok(true)
    }

    /// The number of vertices in a class.
    pub fn class_size(&self, class: Class) -> Result<usize> {
        let mut dsu = self.dsu.write().expect("partition poisoned");
        let root = dsu.root_compressing(class.0);
        Ok(dsu.size[root as usize])
    }

    /// The number of classes currently distinguished.
    pub fn class_count(&self) -> usize {
        let dsu = self.dsu.read().expect("partition poisoned");
        (0..dsu.parent.len() as u32)
            .filter(|&slot| dsu.parent[slot as usize] == slot)
            .count()
    }
}

/// Constructs the partition of a graph's reachable vertices in which
/// vertices with equal classifier properties share a class.
///
/// The partition owns copies of the vertices it indexes; two distinct
/// nodes carrying equal vertices are a fault.
pub fn partition_of<V, E, P>(
    graph: &Graph<V, E>,
    classifier: &Classifier<V, E, P>,
    kill: Option<&KillSwitch>,
    lanes: Lanes,
) -> Result<Partition<V>>
where
    V: Sync + Hash + Eq + Clone,
    E: Sync,
    P: Send + Sync + Hash + Eq,
{
    let lanes = lanes.resolve();
    let Some(base) = graph.base() else {
        return Ok(Partition {
            index: HashMap::new(),
            dsu: RwLock::new(Dsu {
                parent: Vec::new(),
                size: Vec::new(),
            }),
        });
    };
    let rev: Option<Rev> = classifier
        .prop
        .wants_incident()
        .then(|| reverse_index(graph, lanes));
    let (properties, reach) =
        prop_pass(graph, &classifier.prop, rev.as_ref(), lanes, kill, base)?;
    let property = |id: crate::NodeId| {
        properties[id.index()]
            .as_ref()
            .expect("classified node lacks its property")
    };
    let classes = clustered(
        lanes,
        kill,
        |lane, announce| {
            for &id in &reach[lane] {
                announce(id);
            }
        },
        |id| hash_of(property(id)),
        |a, b| property(a) == property(b),
    )?;
    let mut index = HashMap::new();
    let mut size = Vec::with_capacity(classes.len());
    for (slot, members) in classes.iter().enumerate() {
        for &member in members {
            if index
                .insert(graph.vertex(member).clone(), slot as u32)
                .is_some()
            {
                return Err(Fault::DuplicateVertex);
            }
        }
        size.push(members.len());
    }
    let parent = (0..classes.len() as u32).collect();
    Ok(Partition {
        index,
        dsu: RwLock::new(Dsu { parent, size }),
    })
}

/// Reclaims a partition, either synchronously or on a background thread.
pub fn free_partition<V>(partition: Partition<V>, now: bool)
where
    V: Send + 'static,
{
    if now {
        drop(partition);
    } else {
        std::thread::spawn(move || drop(partition));
    }
}

/// Clustering over an explicit member enumeration, shared with merge and
/// deduplication.
pub(crate) fn classed<H, S>(
    lanes: usize,
    kill: Option<&KillSwitch>,
    members: &[HashSet<crate::NodeId>],
    key_hash: H,
    same: S,
) -> Result<Vec<Vec<crate::NodeId>>>
where
    H: Fn(crate::NodeId) -> u64 + Sync,
    S: Fn(crate::NodeId, crate::NodeId) -> bool + Sync,
{
    clustered(
        lanes,
        kill,
        |lane, announce| {
            for &id in &members[lane] {
                announce(id);
            }
        },
        key_hash,
        same,
    )
}
