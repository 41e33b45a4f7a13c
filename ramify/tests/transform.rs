use std::collections::{HashMap, HashSet};

use ramify::build::{built, Builder};
use ramify::classify::Classifier;
use ramify::compose::{composed, Composer};
use ramify::count::{edge_count, vertex_count};
use ramify::dedup::deduplicated;
use ramify::fabricate::{fabricated, Fabricator};
use ramify::filter::{filtered, Filter};
use ramify::kernel::{EdgeFold, Prop};
use ramify::merge::{merged, MergeKernel, Merger};
use ramify::mutate::{mutated, MutationKernel, Mutator};
use ramify::postpone::{postponed, Postponer};
use ramify::split::{split, Labeler, LabelerPair, Splitter};
use ramify::stretch::{stretched, Stretcher};
use ramify::zones::{Order, Plan};
use ramify::{Graph, Lanes};

fn graph_of(edges: &[(u32, u32, u32)], seed: u32) -> Graph<u32, u32> {
    let mut adjacency: HashMap<u32, Vec<(u32, u32)>> = HashMap::new();
    for &(from, label, to) in edges {
        adjacency.entry(from).or_default().push((label, to));
        adjacency.entry(to).or_default();
    }
    let builder = Builder::connecting(move |v: &u32, growth| {
        if let Some(list) = adjacency.get(v) {
            for &(label, to) in list {
                growth.connect(label, to);
            }
        }
        Ok(())
    });
    built(builder, seed, None, Lanes::Count(3)).unwrap()
}

fn vertices_of(graph: &Graph<u32, u32>) -> Vec<u32> {
    let mut all: Vec<u32> = graph.ids().map(|id| *graph.vertex(id)).collect();
    all.sort_unstable();
    all
}

#[test]
fn identity_fabrication_is_isomorphic() {
    let graph = graph_of(&[(0, 1, 1), (1, 2, 2), (2, 3, 0), (1, 4, 3)], 0);
    let identity = Fabricator::new(|&v: &u32| Ok(v), |&l: &u32| Ok(l));
    let copy = fabricated(&graph, &identity, None, Lanes::Count(4)).unwrap();
    assert_eq!(vertex_count(&copy, Lanes::Auto), vertex_count(&graph, Lanes::Auto));
    assert_eq!(edge_count(&copy, Lanes::Auto), edge_count(&graph, Lanes::Auto));
    assert_eq!(copy.base(), graph.base());
    for id in graph.ids() {
        assert_eq!(copy.vertex(id), graph.vertex(id));
        let originals: Vec<_> = graph.edges(id).iter().map(|e| (e.label, e.target)).collect();
        let copies: Vec<_> = copy.edges(id).iter().map(|e| (e.label, e.target)).collect();
        assert_eq!(originals, copies);
    }
}

#[test]
fn deduplication_fuses_equal_vertices_and_edges() {
    // Collapse a two-node graph to a single repeated vertex; the copies
    // fuse into one node with one self-loop.
    let graph = graph_of(&[(0, 5, 1)], 0);
    let constant = Fabricator::new(|_: &u32| Ok(9u32), |&l: &u32| Ok(l));
    let collapsed = fabricated(&graph, &constant, None, Lanes::Count(2)).unwrap();
    assert_eq!(vertex_count(&collapsed, Lanes::Auto), 2);
    let fused = deduplicated(collapsed, None, Lanes::Count(2)).unwrap();
    assert_eq!(vertex_count(&fused, Lanes::Auto), 1);
    assert_eq!(edge_count(&fused, Lanes::Auto), 1);
    let base = fused.base().unwrap();
    assert_eq!(fused.edges(base)[0].target, base);
}

#[test]
fn deduplication_collapses_identical_edges() {
    // Rewriting both labels of a two-edge multigraph to the same value
    // makes the edges identical; deduplication keeps one.
    let graph = graph_of(&[(0, 1, 1), (0, 2, 1)], 0);
    let relabel: Mutator<u32, u32, u32> = Mutator {
        plan: Plan::unordered(),
        kernel: MutationKernel {
            vertex: Box::new(|&v, _, _| Ok(v)),
            incident: None,
            outgoing: None,
            label: Some(Box::new(|_, _, _| Ok(8))),
        },
    };
    let relabelled = mutated(graph, &relabel, None, Lanes::Count(2)).unwrap();
    assert_eq!(edge_count(&relabelled, Lanes::Auto), 2);
    let fused = deduplicated(relabelled, None, Lanes::Count(2)).unwrap();
    assert_eq!(vertex_count(&fused, Lanes::Auto), 2);
    assert_eq!(edge_count(&fused, Lanes::Auto), 1);
}

fn six_cycle() -> Graph<u32, u32> {
    graph_of(
        &[(0, 1, 1), (1, 1, 2), (2, 1, 3), (3, 1, 4), (4, 1, 5), (5, 1, 0)],
        0,
    )
}

fn parity_merger(pruner: Option<Box<dyn Fn(usize, &u32) -> ramify::Result<bool> + Send + Sync>>)
    -> Merger<u32, u32, u32>
{
    Merger {
        classifier: Classifier::new(Prop::of_vertex(|&v| Ok(v % 2))),
        kernel: MergeKernel {
            vertex_map: Box::new(|&v| Ok(v)),
            vertex_reduce: Box::new(|a, b| Ok(a + b)),
            label_map: Box::new(|&l| Ok(l)),
            label_reduce: Box::new(|a, b| Ok(a + b)),
        },
        pruner,
    }
}

#[test]
fn merging_fuses_parity_classes() {
    // Each parity class of a six-cycle fuses to one node whose vertex
    // sums the members; the three edges crossing into the opposite class
    // land in one terminus bucket and reduce to a single summed label.
    let fused = merged(six_cycle(), &parity_merger(None), None, Lanes::Count(3)).unwrap();
    assert_eq!(vertex_count(&fused, Lanes::Auto), 2);
    assert_eq!(edge_count(&fused, Lanes::Auto), 2);
    assert_eq!(vertices_of(&fused), vec![6, 9]);
    let base = fused.base().unwrap();
    assert_eq!(*fused.vertex(base), 6);
    assert_eq!(fused.edges(base).len(), 1);
    assert_eq!(fused.edges(base)[0].label, 3);
    assert_eq!(*fused.vertex(fused.edges(base)[0].target), 9);
    let odds = fused.locate(&9).unwrap();
    assert_eq!(fused.edges(odds).len(), 1);
    assert_eq!(fused.edges(odds)[0].label, 3);
    assert_eq!(fused.edges(odds)[0].target, base);
}

#[test]
fn merge_pruner_filters_fused_edge_classes() {
    // Every fused bucket holds three label-1 edges; a pruner demanding
    // four rejects them all, one accepting three keeps both.
    let thinned = merged(
        six_cycle(),
        &parity_merger(Some(Box::new(|count, _| Ok(count >= 4)))),
        None,
        Lanes::Count(2),
    )
    .unwrap();
    assert_eq!(vertex_count(&thinned, Lanes::Auto), 2);
    assert_eq!(edge_count(&thinned, Lanes::Auto), 0);
    let kept = merged(
        six_cycle(),
        &parity_merger(Some(Box::new(|count, &label| Ok(count == 3 && label == 3)))),
        None,
        Lanes::Count(2),
    )
    .unwrap();
    assert_eq!(edge_count(&kept, Lanes::Auto), 2);
}

#[test]
fn filtering_deletes_vertices_and_prunes() {
    // Dropping one arm of a diamond leaves the other arm intact.
    let graph = graph_of(&[(0, 1, 1), (0, 2, 2), (1, 3, 3), (2, 4, 3)], 0);
    let away_from_two = Filter::keeping(|&v: &u32| Ok(v != 2));
    let thinned = filtered(graph, &away_from_two, None, Lanes::Count(3)).unwrap();
    assert_eq!(vertices_of(&thinned), vec![0, 1, 3]);
    assert_eq!(edge_count(&thinned, Lanes::Auto), 2);
}

#[test]
fn filtering_the_base_away_empties_the_graph() {
    let graph = graph_of(&[(0, 1, 1)], 0);
    let nothing = Filter::keeping(|_: &u32| Ok(false));
    let emptied = filtered(graph, &nothing, None, Lanes::Solo).unwrap();
    assert!(emptied.is_empty());
    assert_eq!(vertex_count(&emptied, Lanes::Solo), 0);
}

#[test]
fn edge_tests_disconnect_failing_edges() {
    let graph = graph_of(&[(0, 1, 1), (0, 9, 2), (1, 9, 2)], 0);
    let no_nines = Filter::keeping(|_: &u32| Ok(true))
        .with_edge_test(|_, &label, _| Ok(label != 9));
    let thinned = filtered(graph, &no_nines, None, Lanes::Count(2)).unwrap();
    // Vertex 2 is only reachable over label-9 edges, so it prunes away.
    assert_eq!(vertices_of(&thinned), vec![0, 1]);
    assert_eq!(edge_count(&thinned, Lanes::Auto), 1);
}

#[test]
fn composition_to_a_fixed_point_closes_a_chain() {
    let graph = graph_of(&[(0, 1, 1), (1, 1, 2), (2, 1, 3)], 0);
    let closure: Composer<u32, u32, u32> = Composer {
        fix: true,
        destructive: false,
        pred: Box::new(|_, _, _, _| Ok(true)),
        label: Box::new(|_, &a, _, &b| Ok(a + b)),
        local: Prop::of_vertex(|&v| Ok(v)),
        adjacent: Prop::of_vertex(|&v| Ok(v)),
    };
    let closed = composed(graph, &closure, None, Lanes::Count(2)).unwrap();
    // Every ordered pair along the chain ends up connected.
    assert_eq!(edge_count(&closed, Lanes::Auto), 6);
    assert_eq!(vertex_count(&closed, Lanes::Auto), 4);
}

#[test]
fn destructive_composition_deletes_launching_edges() {
    let graph = graph_of(&[(0, 1, 1), (1, 1, 2)], 0);
    let bypass: Composer<u32, u32, u32> = Composer {
        fix: false,
        destructive: true,
        pred: Box::new(|_, _, _, _| Ok(true)),
        label: Box::new(|_, &a, _, &b| Ok(a + b)),
        local: Prop::of_vertex(|&v| Ok(v)),
        adjacent: Prop::of_vertex(|&v| Ok(v)),
    };
    let rewired = composed(graph, &bypass, None, Lanes::Count(2)).unwrap();
    // The launching edge 0 -> 1 is gone; 0 -> 2 and 1 -> 2 remain.
    assert_eq!(edge_count(&rewired, Lanes::Auto), 2);
}

#[test]
fn stretching_interposes_a_vertex() {
    let graph = graph_of(&[(0, 5, 1)], 0);
    let stretcher: Stretcher<u32, u32, u32> = Stretcher {
        fix: false,
        expander: Box::new(|_, &label, _, stretching| {
            if label == 5 {
                stretching.stretch(2, 9, 3);
                Ok(true)
            } else {
                Ok(false)
            }
        }),
        prop: Prop::of_vertex(|&v| Ok(v)),
    };
    let stretched_graph = stretched(graph, &stretcher, None, Lanes::Count(2)).unwrap();
    assert_eq!(vertices_of(&stretched_graph), vec![0, 1, 9]);
    assert_eq!(edge_count(&stretched_graph, Lanes::Auto), 2);
    let base = stretched_graph.base().unwrap();
    let first = &stretched_graph.edges(base)[0];
    assert_eq!(first.label, 2);
    assert_eq!(*stretched_graph.vertex(first.target), 9);
    let second = &stretched_graph.edges(first.target)[0];
    assert_eq!(second.label, 3);
    assert_eq!(*stretched_graph.vertex(second.target), 1);
}

#[test]
fn postponement_relocates_after_the_sibling() {
    let graph = graph_of(&[(0, 10, 1), (0, 1, 2)], 0);
    let postponer: Postponer<u32, u32> = Postponer {
        fix: false,
        postponable: Box::new(|_, &label, _| Ok(label >= 10)),
        pred: Box::new(|_, _| Ok(true)),
        label: Box::new(|&p, &s| Ok(p + s)),
    };
    let rearranged = postponed(graph, &postponer, None, Lanes::Count(2)).unwrap();
    assert_eq!(edge_count(&rearranged, Lanes::Auto), 2);
    let base = rearranged.base().unwrap();
    // The stationary edge remains at the base.
    assert_eq!(rearranged.edges(base).len(), 1);
    assert_eq!(rearranged.edges(base)[0].label, 1);
    // The postponed edge now leaves the sibling's terminus.
    let two = rearranged.locate(&2).unwrap();
    assert_eq!(rearranged.edges(two).len(), 1);
    assert_eq!(rearranged.edges(two)[0].label, 11);
    let one = rearranged.locate(&1).unwrap();
    assert_eq!(rearranged.edges(two)[0].target, one);
}

#[test]
fn splitting_fissions_a_vertex() {
    let graph = graph_of(&[(0, 7, 1)], 0);
    let keep = || Labeler {
        pred: Box::new(|_, _: &u32, _| Ok(true)),
        label: Box::new(|_, &label, _| Ok(label)),
    };
    let splitter: Splitter<u32, u32, u32> = Splitter {
        fissile: Box::new(|&v, _| Ok(v == 1)),
        ana: Box::new(|&v, _| Ok(v * 10 + 1)),
        cata: Box::new(|&v, _| Ok(v * 10 + 2)),
        prop: Prop::of_vertex(|&v| Ok(v)),
        inward: LabelerPair {
            ana: keep(),
            cata: keep(),
        },
        outward: LabelerPair {
            ana: keep(),
            cata: keep(),
        },
    };
    let fissioned = split(graph, &splitter, None, Lanes::Count(2)).unwrap();
    assert_eq!(vertices_of(&fissioned), vec![0, 11, 12]);
    assert_eq!(edge_count(&fissioned, Lanes::Auto), 2);
    let base = fissioned.base().unwrap();
    let targets: HashSet<u32> = fissioned
        .edges(base)
        .iter()
        .map(|e| *fissioned.vertex(e.target))
        .collect();
    assert_eq!(targets, HashSet::from([11, 12]));
}

#[test]
fn ordered_mutation_respects_its_order()
{
    let chain = |order| {
        let graph = graph_of(&[(0, 0, 1), (1, 0, 2)], 0);
        let sum_below: Mutator<u32, u32, u32> = Mutator {
            plan: Plan::ordered(order),
            kernel: MutationKernel {
                vertex: Box::new(|&v, _, outgoing| Ok(v + outgoing.unwrap_or(0))),
                incident: None,
                outgoing: Some(
                    EdgeFold::new(|_, _, &remote| Ok(remote), |a, b| Ok(a + b))
                        .with_vacuous(|| Ok(0)),
                ),
                label: None,
            },
        };
        let rewritten = mutated(graph, &sum_below, None, Lanes::Count(2)).unwrap();
        vertices_of(&rewritten)
    };
    // Bottom up, each node sees its successor's rewritten value; top
    // down, the original one.
    assert_eq!(chain(Order::RemoteFirst), vec![2, 3, 3]);
    assert_eq!(chain(Order::LocalFirst), vec![1, 2, 3]);
}

#[test]
fn unordered_mutation_rejects_edge_dependent_kernels() {
    let graph = graph_of(&[(0, 0, 1)], 0);
    let incoherent: Mutator<u32, u32, u32> = Mutator {
        plan: Plan::unordered(),
        kernel: MutationKernel {
            vertex: Box::new(|&v, _, _| Ok(v)),
            incident: None,
            outgoing: Some(EdgeFold::new(|_, _, &r| Ok(r), |a, b| Ok(a + b))),
            label: None,
        },
    };
    assert_eq!(
        mutated(graph, &incoherent, None, Lanes::Solo).unwrap_err(),
        ramify::Fault::IncoherentMutation
    );
}
