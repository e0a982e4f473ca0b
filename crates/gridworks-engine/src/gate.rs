//! Mutual exclusion with priority for queued participants.
//!
//! The tick driver and participant transactions share one [`Gate`]. A
//! participant announces itself before blocking on the lock; the driver only
//! takes the lock once nobody is queued, so a waiting participant gets in
//! at the next tick boundary at the latest.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct Gate<T> {
    inner: Mutex<T>,
    queued: Mutex<usize>,
    drained: Condvar,
}

impl<T> Gate<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            queued: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    /// Queue up and take exclusive access. Used by participants.
    pub fn enter(&self) -> MutexGuard<'_, T> {
        *lock(&self.queued) += 1;
        let guard = lock(&self.inner);
        let mut queued = lock(&self.queued);
        *queued -= 1;
        if *queued == 0 {
            self.drained.notify_all();
        }
        guard
    }

    /// Let every queued participant through, then take exclusive access.
    /// Used by the tick driver.
    pub fn yield_then_enter(&self) -> MutexGuard<'_, T> {
        let mut queued = lock(&self.queued);
        while *queued > 0 {
            queued = self.drained.wait(queued).unwrap_or_else(PoisonError::into_inner);
        }
        drop(queued);
        lock(&self.inner)
    }

    /// Number of participants currently waiting.
    pub fn queued(&self) -> usize {
        *lock(&self.queued)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
