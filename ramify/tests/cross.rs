use ramify::build::{built, Builder};
use ramify::count::{edge_count, vertex_count};
use ramify::cross::{crossed, Crosser};
use ramify::{Graph, Lanes};

fn arrow() -> Graph<u32, char> {
    let builder = Builder::connecting(|&v: &u32, growth| {
        if v == 0 {
            growth.connect('e', 1);
        }
        Ok(())
    });
    built(builder, 0u32, None, Lanes::Count(2)).unwrap()
}

#[test]
fn product_of_two_arrows() {
    let g = arrow();
    let h = arrow();
    let crosser = Crosser::new(
        |&a: &u32, &b: &u32| Ok(a * 10 + b),
        |&x: &char, &y: &char| Ok(x == y),
        |&x: &char, _| Ok(x),
    );
    let product = crossed(&g, &h, &crosser, None, Lanes::Count(3)).unwrap();
    // Every pair of nodes exists; only the matching-label pair of edges
    // combines.
    assert_eq!(vertex_count(&product, Lanes::Auto), 4);
    assert_eq!(edge_count(&product, Lanes::Auto), 1);
    let base = product.base().unwrap();
    assert_eq!(*product.vertex(base), 0);
    let edge = &product.edges(base)[0];
    assert_eq!(edge.label, 'e');
    assert_eq!(*product.vertex(edge.target), 11);
}

#[test]
fn mismatched_labels_combine_nothing() {
    let g = arrow();
    let crosser = Crosser::new(
        |&a: &u32, &b: &u32| Ok(a * 10 + b),
        |_: &char, _: &char| Ok(false),
        |&x: &char, _| Ok(x),
    );
    let product = crossed(&g, &g, &crosser, None, Lanes::Count(2)).unwrap();
    assert_eq!(vertex_count(&product, Lanes::Auto), 4);
    assert_eq!(edge_count(&product, Lanes::Auto), 0);
}

#[test]
fn products_with_nothing_are_empty() {
    let g = arrow();
    let empty: Graph<u32, char> = Graph::empty();
    let crosser = Crosser::new(
        |&a: &u32, &b: &u32| Ok(a + b),
        |_: &char, _: &char| Ok(true),
        |&x: &char, _| Ok(x),
    );
    let product = crossed(&g, &empty, &crosser, None, Lanes::Solo).unwrap();
    assert!(product.is_empty());
}

#[test]
fn oversized_products_overflow() {
    let g = arrow();
    let crosser = Crosser::new(
        |&a: &u32, &b: &u32| Ok(a + b),
        |_: &char, _: &char| Ok(true),
        |&x: &char, _| Ok(x),
    )
    .with_vertex_limit(3);
    assert_eq!(
        crossed(&g, &g, &crosser, None, Lanes::Solo).unwrap_err(),
        ramify::Fault::Overflow
    );
}
