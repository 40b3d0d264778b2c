//! Atomics pinned to a fixed memory order, so a call site cannot silently
//! weaken the ordering a publication protocol depends on.
//!
//! `SeqCstAtomic` is the SC-DRF building block used to publish freshly built
//! PDUs and key material to reader tasks: a release-store here happens
//! before any subsequent acquire-load observes the non-atomic state it
//! guards, on any thread.

use std::sync::atomic::{AtomicI64, Ordering};

/// Sequentially-consistent integral cell. All operations use
/// `Ordering::SeqCst`; there is no way to downgrade a single call.
#[derive(Debug, Default)]
pub struct SeqCstAtomic(AtomicI64);

impl SeqCstAtomic {
    pub const fn new(v: i64) -> Self {
        Self(AtomicI64::new(v))
    }

    pub fn load(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn store(&self, v: i64) {
        self.0.store(v, Ordering::SeqCst)
    }

    pub fn exchange(&self, v: i64) -> i64 {
        self.0.swap(v, Ordering::SeqCst)
    }

    pub fn fetch_add(&self, v: i64) -> i64 {
        self.0.fetch_add(v, Ordering::SeqCst)
    }

    pub fn compare_exchange(&self, current: i64, new: i64) -> bool {
        self.0
            .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Relaxed integral cell: atomic but gives no ordering guarantee between
/// threads beyond the single modification. Used for the lazily-cached
/// address hash, where staleness across threads just costs a recompute.
#[derive(Debug, Default)]
pub struct RelaxedAtomic(AtomicI64);

impl RelaxedAtomic {
    pub const fn new(v: i64) -> Self {
        Self(AtomicI64::new(v))
    }

    pub fn load(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn store(&self, v: i64) {
        self.0.store(v, Ordering::Relaxed)
    }

    pub fn compare_exchange(&self, current: i64, new: i64) -> bool {
        self.0
            .compare_exchange(current, new, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_cst_round_trips() {
        let a = SeqCstAtomic::new(0);
        a.store(42);
        assert_eq!(a.load(), 42);
        assert_eq!(a.exchange(7), 42);
        assert_eq!(a.load(), 7);
    }

    #[test]
    fn relaxed_compare_exchange() {
        let a = RelaxedAtomic::new(0);
        assert!(a.compare_exchange(0, 5));
        assert!(!a.compare_exchange(0, 9));
        assert_eq!(a.load(), 5);
    }
}
