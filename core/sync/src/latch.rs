//! Cooperative single-flight latch.

use std::sync::atomic::{AtomicBool, Ordering};

/// RAII guard over an [`AtomicBool`] busy flag.
///
/// Acquisition is a compare-and-swap, so the at-most-one-in-flight
/// guarantee holds even if the runtime schedules tasks in parallel.
/// The flag is released on drop, on every exit path.
pub(crate) struct Latch<'a> {
    flag: &'a AtomicBool,
}

impl<'a> Latch<'a> {
    /// Try to acquire the latch; `None` means another holder is active.
    ///
    /// The guard must only exist on successful acquisition: its drop
    /// releases the flag unconditionally.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| Self { flag })
    }
}

impl Drop for Latch<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
