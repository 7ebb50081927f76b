use std::sync::atomic::{AtomicBool, Ordering};

/// Holds the single-stream slot of a pipeline until dropped.
pub(crate) struct StreamGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> StreamGuard<'a> {
    /// Claim the slot, or `None` if another stream holds it.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
