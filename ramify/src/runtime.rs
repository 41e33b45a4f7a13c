//! Shared machinery under every operation: packet routing, the generic
//! scatter/gather sweep, predecessor indexing, equivalence clustering, and
//! constrained-order traversal with per-node readiness checks.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::thread;

use smallvec::SmallVec;

use ramify_communication::{
    enlist, Hub, KillSwitch, KILLED_BY_USER, KILLED_INTERNALLY, NOT_KILLED,
};

use crate::fault::{Fault, Result};
use crate::graph::{Graph, NodeId};
use crate::kernel::Prop;
use crate::observe;

/// A prime exceeding the lane limit, for better load balancing of the
/// routing residue.
pub(crate) const LARGE_PRIME: usize = 1031;

/// Workers test the kill sentinel once per this many packets.
pub(crate) const KILL_POLL_MASK: usize = 0x3f;

/// The standard hash of a routable value.
pub(crate) fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// The lane owning a hash value.
pub(crate) fn lane_of_hash(hash: u64, lanes: usize) -> usize {
    (hash as usize % LARGE_PRIME) % lanes
}

/// The lane owning a node.
pub(crate) fn lane_of(id: NodeId, lanes: usize) -> usize {
    (id.index() % LARGE_PRIME) % lanes
}

/// Divides a global vertex limit equally among lanes; a non-zero limit
/// grants every lane at least one vertex.
pub(crate) fn per_lane_limit(limit: usize, lanes: usize) -> Option<usize> {
    match limit {
        0 => None,
        n => Some((n / lanes).max(1)),
    }
}

/// A hub preloaded with the job's logger.
pub(crate) fn new_hub<M>(lanes: usize, detect_stalls: bool) -> Hub<M, Fault> {
    Hub::new(lanes)
        .with_logger(observe::hub_logger())
        .with_stall_detection(detect_stalls)
}

/// Reduces a finished hub and its worker results to the job's outcome:
/// the first fault wins, then user cancellation, then detected deadlock.
pub(crate) fn outcome<M, T>(hub: Hub<M, Fault>, results: Vec<T>) -> Result<Vec<T>> {
    let killed = hub.killed();
    let deadlocked = hub.deadlocked();
    match hub.into_fault() {
        Some(fault) => Err(fault),
        None if killed == KILLED_BY_USER => Err(Fault::Interrupted),
        None if deadlocked => Err(Fault::Deadlocked),
        None if killed == KILLED_INTERNALLY => Err(Fault::Interrupted),
        None => Ok(results),
    }
}

/// A reverse adjacency index: for each node, the `(source, edge index)`
/// pairs of the edges pointing at it. Stands in for the in-edge lists of
/// full-duplex phases; built per job and dropped with it.
pub(crate) type Rev = Vec<SmallVec<[(NodeId, u32); 2]>>;

/// Builds the reverse index by announcing every edge to the lane owning
/// its terminus.
pub(crate) fn reverse_index<V: Sync, E: Sync>(graph: &Graph<V, E>, lanes: usize) -> Rev {
    let hub = new_hub::<(NodeId, NodeId, u32)>(lanes, false);
    let results = enlist(&hub, None, |mut mailbox| {
        let lane = mailbox.index();
        for id in graph.ids() {
            if lane_of(id, lanes) != lane {
                continue;
            }
            for (index, edge) in graph.edges(id).iter().enumerate() {
                let dest = lane_of(edge.target, lanes);
                mailbox.post(dest, (edge.target, id, index as u32));
            }
        }
        let mut local = Vec::new();
        while let Some(mut batch) = mailbox.recv() {
            local.append(&mut batch);
            mailbox.recycle(batch);
        }
        local
    });
    let mut rev: Rev = vec![SmallVec::new(); graph.size()];
    for entries in results {
        for (target, source, index) in entries {
            rev[target.index()].push((source, index));
        }
    }
    rev
}

/// Visits every node reachable from `start` exactly once, scattering
/// packets along the adjacency closure, and returns each lane's
/// accumulated state together with the set of nodes it visited.
pub(crate) fn sweep<T, A, F>(
    lanes: usize,
    kill: Option<&KillSwitch>,
    start: NodeId,
    adjacent: A,
    make: impl Fn(usize) -> T + Sync,
    visit: F,
) -> Result<Vec<(T, HashSet<NodeId>)>>
where
    T: Send,
    A: Fn(NodeId, &mut dyn FnMut(NodeId)) + Sync,
    F: Fn(usize, NodeId, &mut T) -> Result<()> + Sync,
{
    let hub = new_hub::<NodeId>(lanes, true);
    hub.assign(lane_of(start, lanes), vec![start]);
    let results = enlist(&hub, kill, |mut mailbox| {
        let lane = mailbox.index();
        let mut state = make(lane);
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut polls = 0usize;
        let mut dead = false;
        while let Some(mut batch) = mailbox.recv() {
            for id in batch.drain(..) {
                polls += 1;
                if polls & KILL_POLL_MASK == 0 && mailbox.killed() != NOT_KILLED {
                    dead = true;
                    break;
                }
                if !seen.insert(id) {
                    continue;
                }
                if let Err(fault) = visit(lane, id, &mut state) {
                    mailbox.fail(fault);
                    dead = true;
                    break;
                }
                mailbox.visit();
                adjacent(id, &mut |next| {
                    let dest = lane_of(next, lanes);
                    mailbox.post(dest, next);
                });
            }
            mailbox.recycle(batch);
            if dead {
                mailbox.drain();
                break;
            }
        }
        (state, seen)
    });
    outcome(hub, results)
}

/// Evaluates a prop at one node, folding outgoing edges from the arena
/// and incident edges from the reverse index when one is supplied.
pub(crate) fn prop_of<V, E, P>(
    prop: &Prop<V, E, P>,
    graph: &Graph<V, E>,
    rev: Option<&Rev>,
    id: NodeId,
) -> Result<P> {
    let node = graph.node(id);
    let outgoing = match &prop.outgoing {
        Some(fold) => fold.folded(
            node.edges_out
                .iter()
                .map(|edge| (&node.vertex, &edge.label, graph.vertex(edge.target))),
        )?,
        None => None,
    };
    let incident = match (&prop.incident, rev) {
        (Some(fold), Some(rev)) => fold.folded(rev[id.index()].iter().map(|&(source, index)| {
            let origin = graph.node(source);
            (
                &node.vertex,
                &origin.edges_out[index as usize].label,
                &origin.vertex,
            )
        }))?,
        // Without an index the incident fold can only yield its vacuous
        // case, as for a node with no predecessors.
        (Some(fold), None) => fold.folded(std::iter::empty())?,
        (None, _) => None,
    };
    prop.mapped(&node.vertex, incident, outgoing)
}

/// Computes a prop for every node reachable from `start`, scattering
/// forward, and returns the values indexed by node alongside each lane's
/// visited set.
pub(crate) fn prop_pass<V, E, P>(
    graph: &Graph<V, E>,
    prop: &Prop<V, E, P>,
    rev: Option<&Rev>,
    lanes: usize,
    kill: Option<&KillSwitch>,
    start: NodeId,
) -> Result<(Vec<Option<P>>, Vec<HashSet<NodeId>>)>
where
    V: Sync,
    E: Sync,
    P: Send,
{
    let results = sweep(
        lanes,
        kill,
        start,
        |id, post| {
            for edge in graph.edges(id) {
                post(edge.target);
            }
        },
        |_| Vec::new(),
        |_, id, found: &mut Vec<(NodeId, P)>| {
            found.push((id, prop_of(prop, graph, rev, id)?));
            Ok(())
        },
    )?;
    let mut values: Vec<Option<P>> = std::iter::repeat_with(|| None)
        .take(graph.size())
        .collect();
    let mut reach = Vec::with_capacity(results.len());
    for (found, seen) in results {
        for (id, value) in found {
            values[id.index()] = Some(value);
        }
        reach.push(seen);
    }
    Ok((values, reach))
}

/// Routes a set of nodes by a key hash and chains them into equivalence
/// classes by key equality; every class lands wholly on one lane. Returns
/// the classes, each a non-empty member list headed by its first sighting.
pub(crate) fn clustered<A, H, S>(
    lanes: usize,
    kill: Option<&KillSwitch>,
    announce: A,
    key_hash: H,
    same: S,
) -> Result<Vec<Vec<NodeId>>>
where
    A: Fn(usize, &mut dyn FnMut(NodeId)) + Sync,
    H: Fn(NodeId) -> u64 + Sync,
    S: Fn(NodeId, NodeId) -> bool + Sync,
{
    let hub = new_hub::<NodeId>(lanes, false);
    let results = enlist(&hub, kill, |mut mailbox| {
        let lane = mailbox.index();
        announce(lane, &mut |id| {
            let dest = lane_of_hash(key_hash(id), lanes);
            mailbox.post(dest, id);
        });
        let mut classes: Vec<Vec<NodeId>> = Vec::new();
        let mut lookup: HashMap<u64, SmallVec<[u32; 2]>> = HashMap::new();
        let mut dead = false;
        while let Some(mut batch) = mailbox.recv() {
            for id in batch.drain(..) {
                if mailbox.killed() != NOT_KILLED {
                    dead = true;
                    break;
                }
                let bucket = lookup.entry(key_hash(id)).or_default();
                match bucket
                    .iter()
                    .copied()
                    .find(|&class| same(classes[class as usize][0], id))
                {
                    Some(class) => classes[class as usize].push(id),
                    None => {
                        bucket.push(classes.len() as u32);
                        classes.push(vec![id]);
                    }
                }
                mailbox.visit();
            }
            mailbox.recycle(batch);
            if dead {
                mailbox.drain();
                break;
            }
        }
        classes
    });
    outcome(hub, results).map(|r| r.into_iter().flatten().collect())
}

/// Traverses from `start` visiting each node only once all its
/// prerequisites are either visited or unreachable. Packets arriving
/// before their node is ready park in the deferred queue, which packet
/// circulation exposes pool-wide; deferrals spinning without progress
/// trip the deadlock detector unless disabled.
///
/// Scattering happens on first sighting so the traversal reaches the
/// whole zone even while visits wait on readiness.
pub(crate) fn ordered_traverse<A1, A2, F>(
    lanes: usize,
    kill: Option<&KillSwitch>,
    detect_stalls: bool,
    start: NodeId,
    scatter: A1,
    prereqs: A2,
    reachable: &[HashSet<NodeId>],
    visit: F,
) -> Result<()>
where
    A1: Fn(NodeId, &mut dyn FnMut(NodeId)) + Sync,
    A2: Fn(NodeId, &mut dyn FnMut(NodeId)) + Sync,
    F: Fn(NodeId) -> Result<()> + Sync,
{
    let hub = new_hub::<NodeId>(lanes, detect_stalls);
    hub.assign(lane_of(start, lanes), vec![start]);
    let visited: Vec<RwLock<HashSet<NodeId>>> =
        (0..lanes).map(|_| RwLock::new(HashSet::new())).collect();
    let visited = &visited;
    let results = enlist(&hub, kill, |mut mailbox| {
        let lane = mailbox.index();
        let mut scattered: HashSet<NodeId> = HashSet::new();
        let mut dead = false;
        while let Some(mut batch) = mailbox.recv() {
            for id in batch.drain(..) {
                if mailbox.killed() != NOT_KILLED {
                    dead = true;
                    break;
                }
                if visited[lane]
                    .read()
                    .expect("visited set poisoned")
                    .contains(&id)
                {
                    continue;
                }
                if scattered.insert(id) {
                    scatter(id, &mut |next| {
                        let dest = lane_of(next, lanes);
                        mailbox.post(dest, next);
                    });
                }
                let mut ready = true;
                prereqs(id, &mut |m| {
                    if !ready {
                        return;
                    }
                    let owner = lane_of(m, lanes);
                    if !reachable[owner].contains(&m) {
                        return;
                    }
                    if !visited[owner]
                        .read()
                        .expect("visited set poisoned")
                        .contains(&m)
                    {
                        ready = false;
                    }
                });
                if !ready {
                    mailbox.defer(id);
                    continue;
                }
                if let Err(fault) = visit(id) {
                    mailbox.fail(fault);
                    dead = true;
                    break;
                }
                visited[lane]
                    .write()
                    .expect("visited set poisoned")
                    .insert(id);
                mailbox.visit();
            }
            mailbox.recycle(batch);
            if dead {
                mailbox.drain();
                break;
            }
        }
    });
    outcome(hub, results).map(|_| ())
}

/// Sums a per-node measure over the whole arena, one lane per share.
pub(crate) fn tally<V: Sync, E: Sync, F>(graph: &Graph<V, E>, lanes: usize, measure: F) -> usize
where
    F: Fn(NodeId) -> usize + Sync,
{
    let measure = &measure;
    thread::scope(|scope| {
        let handles: Vec<_> = (0..lanes)
            .map(|lane| {
                scope.spawn(move || {
                    graph
                        .ids()
                        .filter(|&id| lane_of(id, lanes) == lane)
                        .map(measure)
                        .sum::<usize>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .sum()
    })
}
