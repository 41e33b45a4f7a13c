use std::collections::HashMap;

use ramify::build::{built, Builder};
use ramify::count::vertex_count;
use ramify::induce::{induced, Inducer};
use ramify::kernel::Prop;
use ramify::mapreduce::{mapreduced, Mapreducer};
use ramify::zones::Zone;
use ramify::{Fault, Graph, Lanes};

fn graph_of(edges: &[(u32, char, u32)], seed: u32) -> Graph<u32, char> {
    let mut adjacency: HashMap<u32, Vec<(char, u32)>> = HashMap::new();
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

fn counting<V: Sync, E: Sync>() -> Mapreducer<V, E, usize> {
    Mapreducer::new(Prop::of_vertex(|_| Ok(1)), |a, b| Ok(a + b)).with_vacuous(|| Ok(0))
}

#[test]
fn mapreduce_counts_a_dag() {
    let graph = graph_of(
        &[(0, 'a', 1), (0, 'b', 2), (1, 'c', 3), (2, 'd', 3), (3, 'e', 4)],
        0,
    );
    assert_eq!(mapreduced(&graph, &counting(), None, Lanes::Count(4)).unwrap(), 5);
}

#[test]
fn mapreduce_agrees_with_vertex_count() {
    // The sum of per-worker visit counts is the vertex count.
    let graph = graph_of(&[(0, 'x', 1), (1, 'x', 2), (2, 'x', 0), (1, 'y', 3)], 0);
    let visits = mapreduced(&graph, &counting(), None, Lanes::Count(4)).unwrap();
    assert_eq!(visits, vertex_count(&graph, Lanes::Auto));
}

#[test]
fn mapreduce_of_nothing_is_vacuous() {
    let empty: Graph<u32, char> = Graph::empty();
    assert_eq!(mapreduced(&empty, &counting(), None, Lanes::Solo).unwrap(), 0);
    let strict: Mapreducer<u32, char, usize> =
        Mapreducer::new(Prop::of_vertex(|_| Ok(1)), |a, b| Ok(a + b));
    assert_eq!(
        mapreduced(&empty, &strict, None, Lanes::Solo).unwrap_err(),
        Fault::EmptyGraph
    );
}

#[test]
fn mapreduce_sums_vertices_over_a_zone() {
    let graph = graph_of(&[(0, 'a', 1), (1, 'b', 2), (2, 'c', 3)], 0);
    let summing: Mapreducer<u32, char, u32> =
        Mapreducer::new(Prop::of_vertex(|&v| Ok(v)), |a, b| Ok(a + b))
            .in_zone(Zone::from(2));
    // Only 2 and 3 are reachable from 2.
    assert_eq!(mapreduced(&graph, &summing, None, Lanes::Count(2)).unwrap(), 5);
}

#[test]
fn induction_measures_the_longest_path() {
    let graph = graph_of(&[(0, 'a', 1), (1, 'b', 2), (2, 'c', 3), (0, 'd', 3)], 0);
    let depth: Inducer<u32, char, u32> = Inducer::new(
        |_, _, &below| Ok(below + 1),
        |a: u32, b: u32| Ok(a.max(b)),
    )
    .with_boundary(|_| Ok(0));
    assert_eq!(induced(&graph, &depth, None, Lanes::Count(3)).unwrap(), 3);
}

#[test]
fn backward_induction_walks_toward_the_start() {
    let graph = graph_of(&[(0, 'a', 1), (1, 'b', 2)], 0);
    let depth: Inducer<u32, char, u32> = Inducer::new(
        |_, _, &above| Ok(above + 1),
        |a: u32, b: u32| Ok(a.max(b)),
    )
    .with_boundary(|_| Ok(0))
    .in_zone(Zone::from(2).backwards());
    assert_eq!(induced(&graph, &depth, None, Lanes::Count(2)).unwrap(), 2);
}

#[test]
fn induction_on_a_cycle_deadlocks() {
    let graph = graph_of(&[(0, 'a', 1), (1, 'b', 0)], 0);
    let depth: Inducer<u32, char, u32> = Inducer::new(
        |_, _, &below| Ok(below + 1),
        |a: u32, b: u32| Ok(a.max(b)),
    )
    .with_boundary(|_| Ok(0));
    assert_eq!(
        induced(&graph, &depth, None, Lanes::Count(2)).unwrap_err(),
        Fault::Deadlocked
    );
}

#[test]
fn callback_faults_surface_first() {
    let graph = graph_of(&[(0, 'a', 1)], 0);
    let failing: Mapreducer<u32, char, usize> = Mapreducer::new(
        Prop::of_vertex(|&v| {
            if v == 1 {
                Err(Fault::App(-40))
            } else {
                Ok(1)
            }
        }),
        |a, b| Ok(a + b),
    );
    assert_eq!(
        mapreduced(&graph, &failing, None, Lanes::Count(2)).unwrap_err(),
        Fault::App(-40)
    );
}
