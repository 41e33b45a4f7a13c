use ramify::build::{built, Builder};
use ramify::classify::{free_partition, partition_of, Classifier};
use ramify::fabricate::{fabricated, Fabricator};
use ramify::kernel::Prop;
use ramify::{Fault, Graph, Lanes};

fn cycle(length: u32) -> Graph<u32, ()> {
    let builder = Builder::connecting(move |&v: &u32, growth| {
        growth.connect((), (v + 1) % length);
        Ok(())
    });
    built(builder, 0u32, None, Lanes::Count(3)).unwrap()
}

fn parity() -> Classifier<u32, (), u32> {
    Classifier::new(Prop::of_vertex(|&v| Ok(v % 2)))
}

#[test]
fn parity_partitions_a_six_cycle() {
    let graph = cycle(6);
    let partition = partition_of(&graph, &parity(), None, Lanes::Count(4)).unwrap();
    assert_eq!(partition.class_count(), 2);
    let evens = partition.class_of(&0).unwrap();
    let odds = partition.class_of(&1).unwrap();
    assert_ne!(evens, odds);
    assert_eq!(partition.class_size(evens).unwrap(), 3);
    assert_eq!(partition.class_size(odds).unwrap(), 3);
    for v in 0..6 {
        let class = partition.class_of(&v).unwrap();
        assert_eq!(class, if v % 2 == 0 { evens } else { odds });
    }
}

#[test]
fn united_classes_pool_their_members() {
    let graph = cycle(6);
    let partition = partition_of(&graph, &parity(), None, Lanes::Count(2)).unwrap();
    let evens = partition.class_of(&0).unwrap();
    let odds = partition.class_of(&1).unwrap();
    assert!(partition.united(evens, odds).unwrap());
    assert_eq!(partition.class_count(), 1);
    let merged = partition.class_of(&3).unwrap();
    assert_eq!(partition.class_size(merged).unwrap(), 6);
    assert_eq!(partition.class_of(&0).unwrap(), partition.class_of(&5).unwrap());
    // Uniting the same pair again changes nothing.
    let again = partition.class_of(&0).unwrap();
    assert!(!partition.united(again, merged).unwrap());
}

#[test]
fn unknown_vertices_are_unrelated() {
    let graph = cycle(4);
    let partition = partition_of(&graph, &parity(), None, Lanes::Solo).unwrap();
    assert_eq!(partition.class_of(&9).unwrap_err(), Fault::UnrelatedVertex);
}

#[test]
fn duplicate_vertices_fail_partitioning() {
    // Collapsing every vertex to the same value leaves equal vertices on
    // distinct nodes, which no partition can index.
    let graph = cycle(3);
    let constant = Fabricator::new(|_: &u32| Ok(7u32), |&(): &()| Ok(()));
    let collapsed = fabricated(&graph, &constant, None, Lanes::Solo).unwrap();
    assert_eq!(
        partition_of(&collapsed, &parity(), None, Lanes::Count(2)).unwrap_err(),
        Fault::DuplicateVertex
    );
}

#[test]
fn partitions_reclaim_both_ways() {
    let graph = cycle(4);
    let partition = partition_of(&graph, &parity(), None, Lanes::Solo).unwrap();
    free_partition(partition, true);
    let partition = partition_of(&graph, &parity(), None, Lanes::Solo).unwrap();
    free_partition(partition, false);
}

#[test]
fn classifier_properties_may_depend_on_edges() {
    // Class by outgoing degree: every node of a cycle has one outgoing
    // edge, so one class results.
    use ramify::kernel::EdgeFold;
    let graph = cycle(5);
    let by_degree: Classifier<u32, (), u32> = Classifier::new(
        Prop::new(|_, _, outgoing: Option<u32>| Ok(outgoing.unwrap_or(0)))
            .with_outgoing(EdgeFold::new(|_, _, _| Ok(1), |a, b| Ok(a + b))),
    );
    let partition = partition_of(&graph, &by_degree, None, Lanes::Count(2)).unwrap();
    assert_eq!(partition.class_count(), 1);
    assert_eq!(partition.class_size(partition.class_of(&0).unwrap()).unwrap(), 5);
}
