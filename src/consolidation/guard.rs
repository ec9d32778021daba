//! Per scope target single-flight locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Serializes work per scope target while letting different targets run in parallel
#[derive(Default)]
pub struct ScopeLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock of `scope_target_id`
    pub fn run<T>(&self, scope_target_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(scope_target_id);
        let output = {
            let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(scope_target_id, lock);
        output
    }

    fn lock_for(&self, scope_target_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        locks
            .entry(scope_target_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other caller holds or waits on it
    fn release(&self, scope_target_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        // One reference in the map plus ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(scope_target_id);
        }
    }

    /// Number of scope targets with a run in flight or queued
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_scope_never_overlaps() {
        let locks = Arc::new(ScopeLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let active = active.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    locks.run("scope-1", || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn test_distinct_scopes_get_distinct_locks() {
        let locks = ScopeLocks::new();

        let nested = locks.run("scope-1", || locks.run("scope-2", || locks.tracked()));
        assert_eq!(nested, 2);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn test_entries_are_released_after_each_run() {
        let locks = ScopeLocks::new();

        for n in 0..100 {
            locks.run(&format!("scope-{n}"), || ());
        }
        assert_eq!(locks.tracked(), 0);

        let inside = locks.run("scope-1", || locks.tracked());
        assert_eq!(inside, 1);
        assert_eq!(locks.tracked(), 0);
    }
}
