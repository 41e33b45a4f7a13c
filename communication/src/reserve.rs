//! Capacity-bounded object reserves.

use std::sync::Mutex;

/// A pool of reusable objects held behind a lock.
///
/// Workers draw from the reserve instead of the allocator on hot paths and
/// return what they no longer need; returns beyond the pool's capacity are
/// released to the heap. Entry points replenish the reserve before a job
/// starts so that early exchanges never wait on allocation.
pub struct Reserve<T> {
    pool: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> Reserve<T> {
    /// Creates an empty reserve with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Reserve {
            pool: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Draws one object, if any are held.
    pub fn draw(&self) -> Option<T> {
        self.pool.lock().expect("reserve poisoned").pop()
    }

    /// Returns an object to the pool, or drops it when the pool is full.
    pub fn stock(&self, object: T) {
        let mut pool = self.pool.lock().expect("reserve poisoned");
        if pool.len() < self.capacity {
            pool.push(object);
        }
    }

    /// Tops the pool up to its capacity with freshly made objects.
    pub fn replenish(&self, mut make: impl FnMut() -> T) {
        let mut pool = self.pool.lock().expect("reserve poisoned");
        while pool.len() < self.capacity {
            pool.push(make());
        }
    }

    /// The number of objects currently held.
    pub fn level(&self) -> usize {
        self.pool.lock().expect("reserve poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_respects_capacity() {
        let reserve = Reserve::new(2);
        reserve.stock(1);
        reserve.stock(2);
        reserve.stock(3);
        assert_eq!(reserve.level(), 2);
    }

    #[test]
    fn replenish_fills_to_capacity() {
        let reserve = Reserve::new(4);
        reserve.replenish(|| 0u8);
        assert_eq!(reserve.level(), 4);
        assert!(reserve.draw().is_some());
        assert_eq!(reserve.level(), 3);
    }
}
