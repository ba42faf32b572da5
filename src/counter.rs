//! The shared counter: an integer whose visibility tells us whether two contexts share memory.

#[cfg(test)]
use alloc_counter::no_alloc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use crate::libc_util;

/// A counter that parent and child both bump once per interval.
///
/// If the child was cloned with `CLONE_VM`, both sides operate on the same memory and each sees
/// the other's increments. Otherwise the child has its own copy and the two evolve independently.
///
/// Increments are deliberately *not* atomic read-modify-writes: [`SharedCounter::bump`] loads,
/// adds one, and publishes the result separately, so two contexts bumping at the same moment can
/// lose an update. Publishing goes through `fetch_max`, so a stale writer can lose an increment
/// but can never move the counter backwards.
#[derive(Debug, Default)]
pub struct SharedCounter {
    value: AtomicI32,
}

impl SharedCounter {
    pub const fn new() -> SharedCounter {
        SharedCounter {
            value: AtomicI32::new(0),
        }
    }

    pub fn get(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Read, add one, write back. Returns the value this context tried to publish.
    #[cfg_attr(test, no_alloc)]
    pub fn bump(&self) -> i32 {
        let next = self.value.load(Ordering::Relaxed).saturating_add(1);
        self.value.fetch_max(next, Ordering::Relaxed);
        next
    }

    /// While the counter is below `threshold`: call `observe` with the current value, bump it,
    /// then sleep for `interval`. Returns the last value observed (`>= threshold`).
    ///
    /// This never resets the counter; if another context already pushed it past the threshold,
    /// the loop exits without touching it.
    pub fn run_to_threshold(
        &self,
        threshold: i32,
        interval: Duration,
        mut observe: impl FnMut(i32),
    ) -> i32 {
        loop {
            let current = self.get();
            if current >= threshold {
                return current;
            }
            observe(current);
            self.bump();
            libc_util::sleep(interval);
        }
    }

    /// Like [`run_to_threshold`](Self::run_to_threshold), but never increments: only watches the
    /// counter until another context pushes it to `threshold`.
    pub fn watch_to_threshold(
        &self,
        threshold: i32,
        interval: Duration,
        mut observe: impl FnMut(i32),
    ) -> i32 {
        loop {
            let current = self.get();
            if current >= threshold {
                return current;
            }
            observe(current);
            libc_util::sleep(interval);
        }
    }
}
