use std::sync::{Arc, Mutex};

use ramify::build::{built, Builder};
use ramify::Lanes;
use ramify_communication::HubEvent;

#[test]
fn jobs_log_their_lifecycle() {
    let seen: Arc<Mutex<Vec<HubEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    ramify::observe::with_registry(|registry| {
        registry.insert::<HubEvent>("ramify".to_owned(), move |batch| {
            sink.lock().unwrap().extend(batch.iter().map(|(_, e)| *e));
        });
    });
    let builder = Builder::connecting(|&v: &u32, growth| {
        growth.connect((), (v + 1) % 3);
        Ok(())
    });
    let graph = built(builder, 0u32, None, Lanes::Count(2)).unwrap();
    drop(graph);
    ramify::observe::with_registry(|registry| {
        registry.remove("ramify");
    });
    let events = seen.lock().unwrap();
    assert!(events.contains(&HubEvent::Launched(2)));
    assert!(events.contains(&HubEvent::Quiescent));
    assert!(events.contains(&HubEvent::Dismissed));
}
