//! Typed event logging shared by the ramify crates.
//!
//! A [`Registry`] binds names to typed event sinks, and a [`Logger`] stamps
//! and buffers events on their way to a sink. Loggers are cheap to clone
//! and safe to use from many worker threads at once; each logged event
//! carries a [`Duration`] measured from an instant common to every logger
//! drawn from the same registry.

#![forbid(missing_docs)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Number of events a logger buffers before flushing to its action.
const BUFFER_CAPACITY: usize = 1024;

/// A map from names to typed loggers.
pub struct Registry {
    /// An instant common to all logging statements.
    time: Instant,
    /// Type-erased loggers, keyed by name.
    map: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Registry {
    /// Creates a new logger registry.
    pub fn new() -> Self {
        Registry {
            time: Instant::now(),
            map: HashMap::new(),
        }
    }

    /// Binds a log name to an action on batches of timestamped events.
    ///
    /// Any previously installed logger under the same name is returned
    /// rather than silently discarded, so that its held buffers can still
    /// be flushed by the caller. Existing clones of a replaced logger keep
    /// writing to the old action.
    pub fn insert<T: Send + 'static>(
        &mut self,
        name: String,
        action: impl Fn(&[(Duration, T)]) + Send + Sync + 'static,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        let logger = Logger::<T>::new(self.time, Arc::new(action));
        self.map.insert(name, Box::new(logger))
    }

    /// Removes a bound logger.
    ///
    /// Dropping the returned box is the only way to communicate the end of
    /// an event stream to the associated action.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Any + Send + Sync>> {
        self.map.remove(name)
    }

    /// Retrieves a shared logger, if one has been inserted under the name
    /// with the requested event type.
    pub fn get<T: Send + 'static>(&self, name: &str) -> Option<Logger<T>> {
        self.map
            .get(name)
            .and_then(|entry| entry.downcast_ref::<Logger<T>>())
            .cloned()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffering logger.
pub struct Logger<T> {
    time: Instant,
    action: Arc<dyn Fn(&[(Duration, T)]) + Send + Sync>,
    buffer: Arc<Mutex<Vec<(Duration, T)>>>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger {
            time: self.time,
            action: self.action.clone(),
            buffer: self.buffer.clone(),
        }
    }
}

impl<T> Logger<T> {
    /// Allocates a new shareable logger bound to a write destination.
    pub fn new(time: Instant, action: Arc<dyn Fn(&[(Duration, T)]) + Send + Sync>) -> Self {
        Logger {
            time,
            action,
            buffer: Arc::new(Mutex::new(Vec::with_capacity(BUFFER_CAPACITY))),
        }
    }

    /// Logs an event.
    ///
    /// The event is stamped at the moment of logging but may be delayed by
    /// buffering; it reaches the action when the buffer fills or on the
    /// next call to [`flush`](Logger::flush).
    pub fn log(&self, event: T) {
        let mut buffer = self.buffer.lock().expect("log buffer poisoned");
        buffer.push((self.time.elapsed(), event));
        if buffer.len() == buffer.capacity() {
            (self.action)(&buffer[..]);
            buffer.clear();
        }
    }

    /// Flushes buffered events to the action, including an empty batch if
    /// nothing is buffered, as a liveness signal to the sink.
    pub fn flush(&self) {
        let mut buffer = self.buffer.lock().expect("log buffer poisoned");
        (self.action)(&buffer[..]);
        buffer.clear();
    }
}

impl<T> Drop for Logger<T> {
    fn drop(&mut self) {
        // Only the last holder flushes residual events.
        if Arc::strong_count(&self.buffer) == 1 {
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logged_events_reach_the_action() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        let sink = seen.clone();
        registry.insert::<u32>("test".to_owned(), move |batch| {
            sink.lock().unwrap().extend(batch.iter().map(|(_, e)| *e));
        });
        let logger = registry.get::<u32>("test").unwrap();
        logger.log(3);
        logger.log(5);
        logger.flush();
        assert_eq!(&*seen.lock().unwrap(), &[3, 5]);
    }

    #[test]
    fn typed_lookup_respects_the_event_type() {
        let mut registry = Registry::new();
        registry.insert::<u32>("test".to_owned(), |_| {});
        assert!(registry.get::<u64>("test").is_none());
        assert!(registry.get::<u32>("test").is_some());
    }
}
