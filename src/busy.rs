use std::sync::{Mutex, MutexGuard, PoisonError};

/// State carrying a busy flag.
pub(crate) trait Busy {
    fn set_busy(&mut self, busy: bool);
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the busy flag when dropped, whether the guarded call succeeded,
/// failed, or its future was dropped half way.
///
/// Must be created after the state lock has been released, or dropping it
/// deadlocks.
pub(crate) struct BusyGuard<'a, T: Busy> {
    state: &'a Mutex<T>,
}

impl<'a, T: Busy> BusyGuard<'a, T> {
    pub(crate) fn new(state: &'a Mutex<T>) -> Self {
        Self { state }
    }
}

impl<T: Busy> Drop for BusyGuard<'_, T> {
    fn drop(&mut self) {
        lock(self.state).set_busy(false);
    }
}
