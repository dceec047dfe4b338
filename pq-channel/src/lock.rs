//! Lock capability guarding connection-table membership
//!
//! Only add/remove and the coarse per-connection state go through the lock;
//! everything inside a connection has a single owner. A single-threaded
//! context uses [`NoopLock`], which costs a borrow flag and makes the
//! context `!Sync` so it cannot be shared across threads by mistake.

use std::cell::RefCell;

use parking_lot::Mutex;

/// Exclusive access to a `T`
pub trait Lockable<T> {
    fn new(value: T) -> Self;

    /// Run `f` with exclusive access. `f` must not re-enter the lock.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

/// Mutual exclusion for contexts shared across threads
#[derive(Debug, Default)]
pub struct MutexLock<T>(Mutex<T>);

impl<T> Lockable<T> for MutexLock<T> {
    fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.lock())
    }
}

/// No locking, for single-threaded contexts
#[derive(Debug, Default)]
pub struct NoopLock<T>(RefCell<T>);

impl<T> Lockable<T> for NoopLock<T> {
    fn new(value: T) -> Self {
        Self(RefCell::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn bump<L: Lockable<u32>>(lock: &L) -> u32 {
        lock.with(|n| {
            *n += 1;
            *n
        })
    }

    #[test]
    fn test_noop_lock() {
        let lock = NoopLock::new(0);
        assert_eq!(bump(&lock), 1);
        assert_eq!(bump(&lock), 2);
    }

    #[test]
    fn test_mutex_lock_across_threads() {
        let lock = Arc::new(MutexLock::new(0u32));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        bump(lock.as_ref());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(lock.with(|n| *n), 400);
    }

    #[test]
    fn test_mutex_lock_usable_after_panic() {
        let lock = Arc::new(MutexLock::new(0u32));
        let inner = lock.clone();
        let panicked = std::thread::spawn(move || {
            inner.with(|n| {
                *n = 7;
                panic!("holder panicked");
            })
        })
        .join();
        assert!(panicked.is_err());
        assert_eq!(bump(lock.as_ref()), 8);
    }
}
