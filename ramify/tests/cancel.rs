use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ramify::build::{built, Builder};
use ramify::reclaim::{free_later, free_now};
use ramify::{Fault, KillSwitch, Lanes};

/// A vertex that counts its population, for leak balancing.
#[derive(Debug)]
struct Tracked {
    value: u64,
    alive: Arc<AtomicIsize>,
}

impl Tracked {
    fn new(value: u64, alive: &Arc<AtomicIsize>) -> Self {
        alive.fetch_add(1, Ordering::AcqRel);
        Tracked {
            value,
            alive: alive.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Tracked {}

impl std::hash::Hash for Tracked {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

#[test]
fn killing_a_runaway_build_interrupts_it() {
    // An infinite-fan builder can only end by cancellation.
    let alive = Arc::new(AtomicIsize::new(0));
    let spawning = alive.clone();
    let builder = Builder::connecting(move |v: &Tracked, growth| {
        growth.connect((), Tracked::new(v.value * 2 + 1, &spawning));
        growth.connect((), Tracked::new(v.value * 2 + 2, &spawning));
        Ok(())
    });
    let switch = KillSwitch::new();
    let outcome = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            switch.kill();
        });
        built(
            builder,
            Tracked::new(0, &alive),
            Some(&switch),
            Lanes::Count(4),
        )
    });
    assert_eq!(outcome.unwrap_err(), Fault::Interrupted);
    // Every vertex the engine took ownership of came back.
    assert_eq!(alive.load(Ordering::Acquire), 0);
}

#[test]
fn killing_before_binding_latches() {
    let switch = KillSwitch::new();
    switch.kill();
    let builder = Builder::connecting(|v: &u64, growth| {
        growth.connect((), v + 1);
        Ok(())
    });
    let outcome = built(builder, 0u64, Some(&switch), Lanes::Count(2));
    assert_eq!(outcome.unwrap_err(), Fault::Interrupted);
}

#[test]
fn reclamation_balances_the_books() {
    let alive = Arc::new(AtomicIsize::new(0));
    let spawning = alive.clone();
    let builder = Builder::connecting(move |v: &Tracked, growth| {
        if v.value < 64 {
            growth.connect((), Tracked::new(v.value + 1, &spawning));
            growth.connect((), Tracked::new(v.value * 3, &spawning));
        }
        Ok(())
    });
    let graph = built(builder, Tracked::new(1, &alive), None, Lanes::Count(4)).unwrap();
    free_now(graph, Lanes::Count(4));
    assert_eq!(alive.load(Ordering::Acquire), 0);
}

#[test]
fn deferred_reclamation_happens_eventually() {
    let alive = Arc::new(AtomicIsize::new(0));
    let spawning = alive.clone();
    let builder = Builder::connecting(move |v: &Tracked, growth| {
        if v.value < 10 {
            growth.connect((), Tracked::new(v.value + 1, &spawning));
        }
        Ok(())
    });
    let graph = built(builder, Tracked::new(0, &alive), None, Lanes::Count(2)).unwrap();
    free_later(graph);
    for _ in 0..100 {
        if alive.load(Ordering::Acquire) == 0 {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("background reclamation never finished");
}
